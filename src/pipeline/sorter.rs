use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use crate::core::error::{Error, ErrorKind, Result};
use crate::pipeline::processor::{
    resolve_value, QueryProcessingCtx, ResultProcessor, RpResult, SearchResult,
};
use crate::util::minmax_heap::MinMaxHeap;
use crate::value::lookup::LookupKey;

/// Capacity of the per-position ascending/descending bitmap.
pub const SORTASCMAP_MAXFIELDS: usize = 8;

/// What the sorter orders by.
pub enum SortMode {
    /// Score descending, ties broken by ascending docId.
    Score,
    /// A list of sort keys plus a bitmap of per-key ascending bits.
    Fields {
        keys: Vec<Arc<LookupKey>>,
        ascending_map: u64,
    },
}

pub fn sortascmap_bit(map: u64, i: usize) -> bool {
    map & (1 << i) != 0
}

/// Comparator semantics: Greater means `a` ranks higher and is emitted
/// earlier. A comparison failure on mismatched value types is reported
/// through the query-error channel and falls back to docId order.
fn compare(
    mode: &SortMode,
    qctx: &QueryProcessingCtx,
    a: &SearchResult,
    b: &SearchResult,
) -> CmpOrdering {
    let doc_id_tiebreak = |a: &SearchResult, b: &SearchResult| b.doc_id.cmp(&a.doc_id);
    match mode {
        SortMode::Score => match a.score.partial_cmp(&b.score) {
            Some(CmpOrdering::Equal) | None => doc_id_tiebreak(a, b),
            Some(ord) => ord,
        },
        SortMode::Fields {
            keys,
            ascending_map,
        } => {
            for (i, key) in keys.iter().enumerate().take(SORTASCMAP_MAXFIELDS) {
                let ascending = sortascmap_bit(*ascending_map, i);
                let va = resolve_value(a, key);
                let vb = resolve_value(b, key);
                let ord = match (va, vb) {
                    (None, None) => continue,
                    // A missing value sorts as the smaller side.
                    (Some(_), None) => CmpOrdering::Greater,
                    (None, Some(_)) => CmpOrdering::Less,
                    (Some(va), Some(vb)) => match va.compare(&vb) {
                        Ok(ord) => ord,
                        Err(e) => {
                            let mut slot = qctx.err.lock();
                            if slot.is_none() {
                                *slot = Some(Error::new(ErrorKind::BadVal, e.context));
                            }
                            return doc_id_tiebreak(a, b);
                        }
                    },
                };
                let ord = if ascending { ord.reverse() } else { ord };
                if ord != CmpOrdering::Equal {
                    return ord;
                }
            }
            doc_id_tiebreak(a, b)
        }
    }
}

/// Bounded top-N accumulator over a min-max heap. Accumulates until the
/// upstream is exhausted, then yields from the top. The spare row is
/// recycled between iterations.
pub struct SorterProcessor {
    upstream: Box<dyn ResultProcessor>,
    heap: MinMaxHeap<SearchResult>,
    mode: Arc<SortMode>,
    /// Heap bound; 0 grows without limit.
    size: usize,
    pooled: Option<SearchResult>,
    yielding: bool,
    track_min_score: bool,
    qctx: Arc<QueryProcessingCtx>,
}

impl SorterProcessor {
    pub fn new(
        upstream: Box<dyn ResultProcessor>,
        mode: SortMode,
        size: usize,
        qctx: Arc<QueryProcessingCtx>,
    ) -> Self {
        let track_min_score = matches!(mode, SortMode::Score);
        let mode = Arc::new(mode);
        let cmp_mode = mode.clone();
        let cmp_qctx = qctx.clone();
        let heap = MinMaxHeap::with_capacity(
            size + 1,
            Box::new(move |a: &SearchResult, b: &SearchResult| {
                compare(&cmp_mode, &cmp_qctx, a, b)
            }),
        );
        SorterProcessor {
            upstream,
            heap,
            mode,
            size,
            pooled: None,
            yielding: false,
            track_min_score,
            qctx,
        }
    }

    fn accumulate(&mut self) -> Result<()> {
        loop {
            let mut h = self.pooled.take().unwrap_or_default();
            h.clear();
            match self.upstream.next(&mut h)? {
                RpResult::Eof => {
                    self.pooled = Some(h);
                    return Ok(());
                }
                RpResult::Ok => {}
            }

            if self.size == 0 || self.heap.len() < self.size {
                self.heap.push(h);
                // Once the heap is full the scorer can drop anything that
                // cannot beat the current floor.
                if self.track_min_score && self.size != 0 && self.heap.len() == self.size {
                    if let Some(min) = self.heap.peek_min() {
                        let mut ms = self.qctx.min_score.lock();
                        if min.score > *ms {
                            *ms = min.score;
                        }
                    }
                }
            } else {
                let replaces = self
                    .heap
                    .peek_min()
                    .is_some_and(|min| compare(&self.mode, &self.qctx, &h, min) == CmpOrdering::Greater);
                if replaces {
                    let evicted = self.heap.pop_min();
                    self.heap.push(h);
                    self.pooled = evicted;
                    if self.track_min_score {
                        if let Some(min) = self.heap.peek_min() {
                            let mut ms = self.qctx.min_score.lock();
                            if min.score > *ms {
                                *ms = min.score;
                            }
                        }
                    }
                } else {
                    self.pooled = Some(h);
                }
            }
        }
    }
}

impl ResultProcessor for SorterProcessor {
    fn name(&self) -> &'static str {
        "Sorter"
    }

    fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
        if !self.yielding {
            self.accumulate()?;
            self.yielding = true;
        }
        match self.heap.pop_max() {
            Some(top) => {
                *res = top;
                Ok(RpResult::Ok)
            }
            None => Ok(RpResult::Eof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;

    /// Upstream stub feeding fixed (docId, score) pairs.
    struct FeedProcessor {
        rows: Vec<(u64, f64)>,
        pos: usize,
    }

    impl ResultProcessor for FeedProcessor {
        fn name(&self) -> &'static str {
            "Feed"
        }
        fn next(&mut self, res: &mut SearchResult) -> Result<RpResult> {
            let Some(&(id, score)) = self.rows.get(self.pos) else {
                return Ok(RpResult::Eof);
            };
            self.pos += 1;
            res.clear();
            res.doc_id = DocId(id);
            res.score = score;
            Ok(RpResult::Ok)
        }
    }

    fn run_sorter(rows: Vec<(u64, f64)>, size: usize) -> Vec<(u64, f64)> {
        let qctx = QueryProcessingCtx::new();
        let feed = Box::new(FeedProcessor { rows, pos: 0 });
        let mut sorter = SorterProcessor::new(feed, SortMode::Score, size, qctx);
        let mut out = Vec::new();
        let mut res = SearchResult::new();
        while let Ok(RpResult::Ok) = sorter.next(&mut res) {
            out.push((res.doc_id.0, res.score));
        }
        out
    }

    #[test]
    fn test_emits_min_n_k_rows_best_first() {
        let rows = vec![(1, 0.5), (2, 0.9), (3, 0.1), (4, 0.7), (5, 0.3)];
        let out = run_sorter(rows.clone(), 3);
        assert_eq!(out.len(), 3);
        assert_eq!(
            out.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![2, 4, 1]
        );

        let out = run_sorter(rows, 10);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_ties_break_by_doc_id_ascending() {
        let out = run_sorter(vec![(3, 1.0), (1, 1.0), (2, 1.0)], 3);
        assert_eq!(
            out.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_min_score_rises_when_full() {
        let qctx = QueryProcessingCtx::new();
        let feed = Box::new(FeedProcessor {
            rows: vec![(1, 0.9), (2, 0.5), (3, 0.8), (4, 0.7)],
            pos: 0,
        });
        let mut sorter = SorterProcessor::new(feed, SortMode::Score, 2, qctx.clone());
        let mut res = SearchResult::new();
        let _ = sorter.next(&mut res);
        assert!(*qctx.min_score.lock() >= 0.5);
    }
}
