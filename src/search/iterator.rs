use crate::core::types::DocId;
use crate::search::index_result::IndexResult;

/// Outcome of `skip_to`. NotFound still hands back the next record past the
/// target so callers can re-lead on it.
#[derive(Debug)]
pub enum SkipOutcome {
    Found(IndexResult),
    NotFound(IndexResult),
    Eof,
}

/// The shared iterator contract: strictly increasing docIds, idempotent
/// rewind, and a `skip_to` that may be as dumb as repeated reads but should
/// use block-level skipping when the concrete kind has it.
pub trait IndexIterator: Send {
    fn read(&mut self) -> Option<IndexResult>;
    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome;
    fn rewind(&mut self);
    fn has_next(&self) -> bool;
    fn num_estimated(&self) -> usize;
    fn len(&self) -> usize {
        self.num_estimated()
    }
    fn last_doc_id(&self) -> DocId;
}

/// Fallback skip implementation: read until reaching the target.
pub fn skip_by_reading(it: &mut dyn IndexIterator, doc_id: DocId) -> SkipOutcome {
    loop {
        match it.read() {
            None => return SkipOutcome::Eof,
            Some(r) if r.doc_id == doc_id => return SkipOutcome::Found(r),
            Some(r) if r.doc_id > doc_id => return SkipOutcome::NotFound(r),
            Some(_) => {}
        }
    }
}

/// The nothing iterator, used for unsatisfiable query nodes.
#[derive(Debug, Default)]
pub struct EmptyIterator;

impl IndexIterator for EmptyIterator {
    fn read(&mut self) -> Option<IndexResult> {
        None
    }

    fn skip_to(&mut self, _doc_id: DocId) -> SkipOutcome {
        SkipOutcome::Eof
    }

    fn rewind(&mut self) {}

    fn has_next(&self) -> bool {
        false
    }

    fn num_estimated(&self) -> usize {
        0
    }

    fn last_doc_id(&self) -> DocId {
        DocId(0)
    }
}

/// Yields every docId from 1 to the table's maximum.
#[derive(Debug)]
pub struct WildcardIterator {
    max_doc_id: u64,
    cursor: u64,
}

impl WildcardIterator {
    pub fn new(max_doc_id: u64) -> Self {
        WildcardIterator {
            max_doc_id,
            cursor: 0,
        }
    }
}

impl IndexIterator for WildcardIterator {
    fn read(&mut self) -> Option<IndexResult> {
        if self.cursor >= self.max_doc_id {
            return None;
        }
        self.cursor += 1;
        Some(IndexResult::virt(DocId(self.cursor)))
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        if doc_id.0 > self.max_doc_id {
            self.cursor = self.max_doc_id;
            return SkipOutcome::Eof;
        }
        self.cursor = doc_id.0;
        SkipOutcome::Found(IndexResult::virt(doc_id))
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn has_next(&self) -> bool {
        self.cursor < self.max_doc_id
    }

    fn num_estimated(&self) -> usize {
        self.max_doc_id as usize
    }

    fn last_doc_id(&self) -> DocId {
        DocId(self.cursor)
    }
}

/// Iterates an explicit, sorted id list.
#[derive(Debug)]
pub struct IdListIterator {
    ids: Vec<DocId>,
    pos: usize,
}

impl IdListIterator {
    pub fn new(mut ids: Vec<DocId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        IdListIterator { ids, pos: 0 }
    }
}

impl IndexIterator for IdListIterator {
    fn read(&mut self) -> Option<IndexResult> {
        let id = *self.ids.get(self.pos)?;
        self.pos += 1;
        Some(IndexResult::virt(id))
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        self.pos += self.ids[self.pos..].partition_point(|&id| id < doc_id);
        match self.read() {
            None => SkipOutcome::Eof,
            Some(r) if r.doc_id == doc_id => SkipOutcome::Found(r),
            Some(r) => SkipOutcome::NotFound(r),
        }
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }

    fn has_next(&self) -> bool {
        self.pos < self.ids.len()
    }

    fn num_estimated(&self) -> usize {
        self.ids.len()
    }

    fn last_doc_id(&self) -> DocId {
        if self.pos == 0 {
            DocId(0)
        } else {
            self.ids[self.pos - 1]
        }
    }
}

/// Range scan snapshot over a numeric tree: (docId, value) pairs already
/// filtered by the bounds.
#[derive(Debug)]
pub struct NumericFilterIterator {
    entries: Vec<(DocId, f64)>,
    pos: usize,
}

impl NumericFilterIterator {
    pub fn new(entries: Vec<(DocId, f64)>) -> Self {
        NumericFilterIterator { entries, pos: 0 }
    }
}

impl IndexIterator for NumericFilterIterator {
    fn read(&mut self) -> Option<IndexResult> {
        let (id, value) = *self.entries.get(self.pos)?;
        self.pos += 1;
        Some(IndexResult::numeric(id, value))
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        self.pos += self.entries[self.pos..].partition_point(|&(id, _)| id < doc_id);
        match self.read() {
            None => SkipOutcome::Eof,
            Some(r) if r.doc_id == doc_id => SkipOutcome::Found(r),
            Some(r) => SkipOutcome::NotFound(r),
        }
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }

    fn has_next(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn num_estimated(&self) -> usize {
        self.entries.len()
    }

    fn last_doc_id(&self) -> DocId {
        if self.pos == 0 {
            DocId(0)
        } else {
            self.entries[self.pos - 1].0
        }
    }
}

/// Geo hits carrying the distance from the query point, in docId order.
#[derive(Debug)]
pub struct GeoFilterIterator {
    inner: NumericFilterIterator,
}

impl GeoFilterIterator {
    pub fn new(hits: Vec<(DocId, f64)>) -> Self {
        GeoFilterIterator {
            inner: NumericFilterIterator::new(hits),
        }
    }
}

impl IndexIterator for GeoFilterIterator {
    fn read(&mut self) -> Option<IndexResult> {
        self.inner.read()
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        self.inner.skip_to(doc_id)
    }

    fn rewind(&mut self) {
        self.inner.rewind()
    }

    fn has_next(&self) -> bool {
        self.inner.has_next()
    }

    fn num_estimated(&self) -> usize {
        self.inner.num_estimated()
    }

    fn last_doc_id(&self) -> DocId {
        self.inner.last_doc_id()
    }
}
