use crate::core::error::Result;
use crate::pipeline::processor::{ResultProcessor, RpResult, SearchResult};

/// Discards the first `offset` rows and emits up to `limit`, then EOF.
/// The sorter above it holds offset+limit results; this stage just windows
/// them.
pub struct PagerProcessor {
    upstream: Box<dyn ResultProcessor>,
    offset: usize,
    limit: usize,
    count: usize,
}

impl PagerProcessor {
    pub fn new(upstream: Box<dyn ResultProcessor>, offset: usize, limit: usize) -> Self {
        PagerProcessor {
            upstream,
            offset,
            limit,
            count: 0,
        }
    }
}

impl ResultProcessor for PagerProcessor {
    fn name(&self) -> &'static str {
        "Pager/Limiter"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        while self.count < self.offset {
            match self.upstream.next(res)? {
                RpResult::Eof => return Ok(RpResult::Eof),
                RpResult::Ok => {}
            }
            self.count += 1;
            res.clear();
        }
        if self.count >= self.offset + self.limit {
            return Ok(RpResult::Eof);
        }
        self.count += 1;
        self.upstream.next(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;

    struct Feed(u64, u64);

    impl ResultProcessor for Feed {
        fn name(&self) -> &'static str {
            "Feed"
        }
        fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
            if self.0 >= self.1 {
                return Ok(RpResult::Eof);
            }
            self.0 += 1;
            res.clear();
            res.doc_id = DocId(self.0);
            Ok(RpResult::Ok)
        }
    }

    fn drain(p: &mut dyn ResultProcessor) -> Vec<u64> {
        let mut res = SearchResult::new();
        let mut out = Vec::new();
        while let Ok(RpResult::Ok) = p.next(&mut res) {
            out.push(res.doc_id.0);
        }
        out
    }

    #[test]
    fn test_offset_and_limit() {
        let mut pager = PagerProcessor::new(Box::new(Feed(0, 10)), 3, 4);
        assert_eq!(drain(&mut pager), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_offset_past_end() {
        let mut pager = PagerProcessor::new(Box::new(Feed(0, 2)), 5, 4);
        assert!(drain(&mut pager).is_empty());
    }
}
