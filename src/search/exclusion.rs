use crate::core::types::DocId;
use crate::search::index_result::IndexResult;
use crate::search::iterator::{IndexIterator, SkipOutcome};

/// Complement iterator: walks 1..=max and yields the ids its child does not
/// match.
pub struct NotIterator {
    child: Option<Box<dyn IndexIterator>>,
    max_doc_id: u64,
    cursor: u64,
    child_last: u64,
    child_done: bool,
    at_eof: bool,
}

impl NotIterator {
    pub fn new(child: Option<Box<dyn IndexIterator>>, max_doc_id: u64) -> Self {
        NotIterator {
            child,
            max_doc_id,
            cursor: 0,
            child_last: 0,
            child_done: false,
            at_eof: false,
        }
    }

    fn child_matches(&mut self, id: u64) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        if self.child_done {
            return false;
        }
        if self.child_last >= id {
            return self.child_last == id;
        }
        match child.skip_to(DocId(id)) {
            SkipOutcome::Found(r) => {
                self.child_last = r.doc_id.0;
                true
            }
            SkipOutcome::NotFound(r) => {
                self.child_last = r.doc_id.0;
                false
            }
            SkipOutcome::Eof => {
                self.child_done = true;
                false
            }
        }
    }
}

impl IndexIterator for NotIterator {
    fn read(&mut self) -> Option<IndexResult> {
        loop {
            if self.cursor >= self.max_doc_id {
                self.at_eof = true;
                return None;
            }
            self.cursor += 1;
            let cur = self.cursor;
            if !self.child_matches(cur) {
                return Some(IndexResult::virt(DocId(cur)));
            }
        }
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        if doc_id.0 > self.max_doc_id {
            self.at_eof = true;
            return SkipOutcome::Eof;
        }
        self.cursor = doc_id.0 - 1;
        match self.read() {
            None => SkipOutcome::Eof,
            Some(r) if r.doc_id == doc_id => SkipOutcome::Found(r),
            Some(r) => SkipOutcome::NotFound(r),
        }
    }

    fn rewind(&mut self) {
        if let Some(c) = self.child.as_mut() {
            c.rewind();
        }
        self.cursor = 0;
        self.child_last = 0;
        self.child_done = false;
        self.at_eof = false;
    }

    fn has_next(&self) -> bool {
        !self.at_eof && self.cursor < self.max_doc_id
    }

    fn num_estimated(&self) -> usize {
        self.max_doc_id as usize
    }

    fn last_doc_id(&self) -> DocId {
        DocId(self.cursor)
    }
}

/// Yields every id up to max; ids the child produces carry the child's
/// result (and through it, its score contribution), the rest are virtual.
pub struct OptionalIterator {
    child: Option<Box<dyn IndexIterator>>,
    max_doc_id: u64,
    cursor: u64,
    pending: Option<IndexResult>,
    child_done: bool,
    at_eof: bool,
    pub weight: f64,
}

impl OptionalIterator {
    pub fn new(child: Option<Box<dyn IndexIterator>>, max_doc_id: u64, weight: f64) -> Self {
        OptionalIterator {
            child,
            max_doc_id,
            cursor: 0,
            pending: None,
            child_done: false,
            at_eof: false,
            weight,
        }
    }

    fn child_result_at(&mut self, id: u64) -> Option<IndexResult> {
        if let Some(p) = &self.pending {
            if p.doc_id.0 == id {
                return self.pending.take();
            }
            if p.doc_id.0 > id {
                return None;
            }
        }
        let child = self.child.as_mut()?;
        if self.child_done {
            return None;
        }
        match child.skip_to(DocId(id)) {
            SkipOutcome::Found(r) => Some(r),
            SkipOutcome::NotFound(r) => {
                self.pending = Some(r);
                None
            }
            SkipOutcome::Eof => {
                self.child_done = true;
                None
            }
        }
    }
}

impl IndexIterator for OptionalIterator {
    fn read(&mut self) -> Option<IndexResult> {
        if self.cursor >= self.max_doc_id {
            self.at_eof = true;
            return None;
        }
        self.cursor += 1;
        let cur = self.cursor;
        match self.child_result_at(cur) {
            Some(r) => Some(r),
            None => Some(IndexResult::virt(DocId(cur))),
        }
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        if doc_id.0 > self.max_doc_id {
            self.at_eof = true;
            return SkipOutcome::Eof;
        }
        self.cursor = doc_id.0 - 1;
        match self.read() {
            None => SkipOutcome::Eof,
            Some(r) => SkipOutcome::Found(r),
        }
    }

    fn rewind(&mut self) {
        if let Some(c) = self.child.as_mut() {
            c.rewind();
        }
        self.cursor = 0;
        self.pending = None;
        self.child_done = false;
        self.at_eof = false;
    }

    fn has_next(&self) -> bool {
        !self.at_eof && self.cursor < self.max_doc_id
    }

    fn num_estimated(&self) -> usize {
        self.max_doc_id as usize
    }

    fn last_doc_id(&self) -> DocId {
        DocId(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::iterator::IdListIterator;
    use crate::search::index_result::IndexResultData;

    fn ids(v: &[u64]) -> Box<dyn IndexIterator> {
        Box::new(IdListIterator::new(v.iter().map(|&i| DocId(i)).collect()))
    }

    #[test]
    fn test_not() {
        let mut it = NotIterator::new(Some(ids(&[2, 4])), 5);
        let got: Vec<u64> = std::iter::from_fn(|| it.read()).map(|r| r.doc_id.0).collect();
        assert_eq!(got, vec![1, 3, 5]);
    }

    #[test]
    fn test_not_without_child_is_wildcard() {
        let mut it = NotIterator::new(None, 3);
        let got: Vec<u64> = std::iter::from_fn(|| it.read()).map(|r| r.doc_id.0).collect();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn test_not_skip_to() {
        let mut it = NotIterator::new(Some(ids(&[2, 4])), 5);
        match it.skip_to(DocId(2)) {
            SkipOutcome::NotFound(r) => assert_eq!(r.doc_id, DocId(3)),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_optional_tags_child_results() {
        let mut it = OptionalIterator::new(Some(ids(&[2])), 3, 1.0);
        let r1 = it.read().unwrap();
        assert!(matches!(r1.data, IndexResultData::Virtual));
        let r2 = it.read().unwrap();
        assert_eq!(r2.doc_id, DocId(2));
        let r3 = it.read().unwrap();
        assert_eq!(r3.doc_id, DocId(3));
        assert!(it.read().is_none());
    }
}
