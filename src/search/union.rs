use std::cmp::Reverse;
use std::collections::BinaryHeap;
use crate::core::types::DocId;
use crate::search::index_result::IndexResult;
use crate::search::iterator::{IndexIterator, SkipOutcome};

/// OR over child iterators: a min-heap keyed by each child's current docId;
/// every read emits the minimum and advances all children sitting on it.
pub struct UnionIterator {
    children: Vec<Box<dyn IndexIterator>>,
    /// Peeked result per child, kept in lockstep with the heap.
    current: Vec<Option<IndexResult>>,
    heap: BinaryHeap<Reverse<(u64, usize)>>,
    last_id: DocId,
    at_eof: bool,
    num_estimated: usize,
    primed: bool,
}

impl UnionIterator {
    pub fn new(children: Vec<Box<dyn IndexIterator>>) -> Self {
        let num_estimated = children.iter().map(|c| c.num_estimated()).sum();
        UnionIterator {
            current: children.iter().map(|_| None).collect(),
            children,
            heap: BinaryHeap::new(),
            last_id: DocId(0),
            at_eof: false,
            num_estimated,
            primed: false,
        }
    }

    fn prime(&mut self) {
        self.heap.clear();
        for i in 0..self.children.len() {
            self.current[i] = self.children[i].read();
            if let Some(r) = &self.current[i] {
                self.heap.push(Reverse((r.doc_id.0, i)));
            }
        }
        self.primed = true;
    }

    fn advance_child(&mut self, i: usize) {
        self.current[i] = self.children[i].read();
        if let Some(r) = &self.current[i] {
            self.heap.push(Reverse((r.doc_id.0, i)));
        }
    }

    fn emit_min(&mut self) -> Option<IndexResult> {
        let Reverse((min_id, _)) = *self.heap.peek()?;
        let mut hits = Vec::new();
        while let Some(&Reverse((id, i))) = self.heap.peek() {
            if id != min_id {
                break;
            }
            self.heap.pop();
            if let Some(r) = self.current[i].take() {
                hits.push(r);
            }
            self.advance_child(i);
        }
        self.last_id = DocId(min_id);
        if hits.len() == 1 {
            hits.pop()
        } else {
            Some(IndexResult::aggregate(DocId(min_id), hits))
        }
    }
}

impl IndexIterator for UnionIterator {
    fn read(&mut self) -> Option<IndexResult> {
        if !self.primed {
            self.prime();
        }
        match self.emit_min() {
            Some(r) => Some(r),
            None => {
                self.at_eof = true;
                None
            }
        }
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        if !self.primed {
            self.prime();
        }
        // Move every lagging child to at least the target, then rebuild.
        for i in 0..self.children.len() {
            let behind = match &self.current[i] {
                Some(r) => r.doc_id < doc_id,
                None => false,
            };
            if !behind {
                continue;
            }
            self.current[i] = match self.children[i].skip_to(doc_id) {
                SkipOutcome::Found(r) | SkipOutcome::NotFound(r) => Some(r),
                SkipOutcome::Eof => None,
            };
        }
        self.heap.clear();
        for (i, cur) in self.current.iter().enumerate() {
            if let Some(r) = cur {
                self.heap.push(Reverse((r.doc_id.0, i)));
            }
        }
        match self.emit_min() {
            None => {
                self.at_eof = true;
                SkipOutcome::Eof
            }
            Some(r) if r.doc_id == doc_id => SkipOutcome::Found(r),
            Some(r) => SkipOutcome::NotFound(r),
        }
    }

    fn rewind(&mut self) {
        for c in &mut self.children {
            c.rewind();
        }
        for cur in &mut self.current {
            *cur = None;
        }
        self.heap.clear();
        self.primed = false;
        self.last_id = DocId(0);
        self.at_eof = false;
    }

    fn has_next(&self) -> bool {
        !self.at_eof
    }

    fn num_estimated(&self) -> usize {
        self.num_estimated
    }

    fn last_doc_id(&self) -> DocId {
        self.last_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::iterator::IdListIterator;

    fn ids(v: &[u64]) -> Box<dyn IndexIterator> {
        Box::new(IdListIterator::new(v.iter().map(|&i| DocId(i)).collect()))
    }

    #[test]
    fn test_union_merges_sorted() {
        let mut u = UnionIterator::new(vec![ids(&[1, 4, 9]), ids(&[2, 4, 10])]);
        let got: Vec<u64> = std::iter::from_fn(|| u.read()).map(|r| r.doc_id.0).collect();
        assert_eq!(got, vec![1, 2, 4, 9, 10]);
    }

    #[test]
    fn test_union_skip_to() {
        let mut u = UnionIterator::new(vec![ids(&[1, 4, 9]), ids(&[2, 4, 10])]);
        match u.skip_to(DocId(4)) {
            SkipOutcome::Found(r) => assert_eq!(r.doc_id, DocId(4)),
            other => panic!("{other:?}"),
        }
        match u.skip_to(DocId(5)) {
            SkipOutcome::NotFound(r) => assert_eq!(r.doc_id, DocId(9)),
            other => panic!("{other:?}"),
        }
    }
}
