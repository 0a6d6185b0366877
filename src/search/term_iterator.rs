use std::sync::Arc;
use uuid::Uuid;
use crate::core::spec::IndexSpec;
use crate::core::types::{DocId, FieldMask};
use crate::index::inverted::{InvertedIndex, PostingRecord};
use crate::search::index_result::{IndexResult, TermData};
use crate::search::iterator::{IndexIterator, SkipOutcome};

/// What posting list a reader is bound to. Readers re-resolve the key on
/// every block so they survive the lock being dropped between blocks.
#[derive(Debug, Clone)]
pub enum PostingKey {
    Term(Vec<u8>),
    Tag { field: String, value: Vec<u8> },
}

/// Re-openable handle to a posting list inside an index. Each access
/// validates the spec's uniqueId recorded at open time; after an index drop
/// the handle resolves to nothing and the reader sees EOF.
pub struct PostingSource {
    pub spec: Arc<IndexSpec>,
    pub expected_id: Uuid,
    pub key: PostingKey,
}

impl PostingSource {
    pub fn new(spec: Arc<IndexSpec>, key: PostingKey) -> Self {
        let expected_id = spec.unique_id;
        PostingSource {
            spec,
            expected_id,
            key,
        }
    }

    /// Run `f` against the posting list and doc table under one read guard.
    fn with_index<R>(&self, f: impl FnOnce(&InvertedIndex, &crate::index::DocTable) -> R) -> Option<R> {
        if self.spec.is_dropped() || self.spec.unique_id != self.expected_id {
            return None;
        }
        let inner = self.spec.inner.read();
        let idx = match &self.key {
            PostingKey::Term(term) => inner.text.get(term),
            PostingKey::Tag { field, value } => {
                inner.tags.get(field).and_then(|t| t.values.get(&value[..]))
            }
        }?;
        Some(f(idx, &inner.docs))
    }
}

/// Decoding reader over one posting list. Buffers a block at a time so the
/// index lock is only held for the duration of a block read.
pub struct TermIterator {
    source: PostingSource,
    term: Arc<TermData>,
    field_mask: FieldMask,
    /// Single-word fast path: the field-mask test is skipped entirely.
    fast_path: bool,
    block_idx: usize,
    consumed: usize,
    buf: Vec<PostingRecord>,
    buf_pos: usize,
    last_id: DocId,
    at_eof: bool,
    num_estimated: usize,
}

impl TermIterator {
    pub fn new(
        source: PostingSource,
        term: Arc<TermData>,
        field_mask: FieldMask,
        fast_path: bool,
    ) -> Self {
        let num_estimated = source
            .with_index(|idx, _| idx.num_docs as usize)
            .unwrap_or(0);
        TermIterator {
            source,
            term,
            field_mask,
            fast_path,
            block_idx: 0,
            consumed: 0,
            buf: Vec::new(),
            buf_pos: 0,
            last_id: DocId(0),
            at_eof: false,
            num_estimated,
        }
    }

    /// Pull the next unread span of the current block (the open block may
    /// have grown since we last saw it), already filtered for deleted docs.
    fn refill(&mut self) -> bool {
        loop {
            let consumed = self.consumed;
            let block_idx = self.block_idx;
            let next = self.source.with_index(|idx, docs| {
                if block_idx >= idx.num_blocks() {
                    return None;
                }
                let records = idx.decode_block(block_idx).ok()?;
                if records.len() <= consumed {
                    return Some(Vec::new());
                }
                Some(
                    records[consumed..]
                        .iter()
                        .filter(|r| !docs.is_deleted(r.doc_id))
                        .cloned()
                        .collect::<Vec<_>>(),
                )
            });
            match next {
                None | Some(None) => {
                    self.at_eof = true;
                    return false;
                }
                Some(Some(records)) if records.is_empty() => {
                    let advanced = self.source.with_index(|idx, _| {
                        idx.num_blocks() > block_idx + 1
                    });
                    match advanced {
                        Some(true) => {
                            self.block_idx += 1;
                            self.consumed = 0;
                        }
                        _ => {
                            self.at_eof = true;
                            return false;
                        }
                    }
                }
                Some(Some(records)) => {
                    // `consumed` counts raw records, before the deleted
                    // filter, so stale buffered copies never replay.
                    self.consumed += records.len();
                    self.buf = records;
                    self.buf_pos = 0;
                    return true;
                }
            }
        }
    }

    fn next_record(&mut self) -> Option<PostingRecord> {
        loop {
            if self.buf_pos < self.buf.len() {
                let rec = self.buf[self.buf_pos].clone();
                self.buf_pos += 1;
                if !self.fast_path && rec.field_mask & self.field_mask == 0 {
                    continue;
                }
                return Some(rec);
            }
            if !self.refill() {
                return None;
            }
        }
    }

    fn to_result(&self, rec: PostingRecord) -> IndexResult {
        IndexResult::term(
            rec.doc_id,
            rec.freq,
            rec.field_mask,
            rec.offsets,
            self.term.clone(),
        )
    }
}

impl IndexIterator for TermIterator {
    fn read(&mut self) -> Option<IndexResult> {
        let rec = self.next_record()?;
        self.last_id = rec.doc_id;
        Some(self.to_result(rec))
    }

    fn skip_to(&mut self, doc_id: DocId) -> SkipOutcome {
        // Block-level skip: binary search the block bounds, then scan.
        let target_block = self
            .source
            .with_index(|idx, _| idx.find_block(doc_id.0));
        match target_block {
            None => {
                self.at_eof = true;
                return SkipOutcome::Eof;
            }
            Some(b) if b != self.block_idx || self.buf_pos >= self.buf.len() => {
                self.block_idx = b;
                self.consumed = 0;
                self.buf.clear();
                self.buf_pos = 0;
            }
            Some(_) => {}
        }
        loop {
            match self.read() {
                None => return SkipOutcome::Eof,
                Some(r) if r.doc_id == doc_id => return SkipOutcome::Found(r),
                Some(r) if r.doc_id > doc_id => return SkipOutcome::NotFound(r),
                Some(_) => {}
            }
        }
    }

    fn rewind(&mut self) {
        self.block_idx = 0;
        self.consumed = 0;
        self.buf.clear();
        self.buf_pos = 0;
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
