use parking_lot::RwLock;
use roaring::RoaringTreemap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::index::offsets::ByteOffsets;
use crate::value::Value;

pub mod doc_flags {
    pub const DELETED: u32 = 1 << 0;
    pub const HAS_PAYLOAD: u32 = 1 << 1;
    pub const HAS_SORT_VECTOR: u32 = 1 << 2;
    pub const HAS_OFFSET_VECTOR: u32 = 1 << 3;
    /// The document owns per-field entries (geo) that must be purged
    /// eagerly when it is replaced.
    pub const HAS_ON_DEMAND_DELETABLE: u32 = 1 << 4;
}

/// Array of typed values indexed by sortable-field ordinal.
#[derive(Debug, Clone, Default)]
pub struct SortingVector {
    values: Vec<Value>,
}

impl SortingVector {
    pub fn new(len: usize) -> Self {
        SortingVector {
            values: vec![Value::Null; len],
        }
    }

    pub fn set(&mut self, ordinal: usize, value: Value) {
        if ordinal < self.values.len() {
            self.values[ordinal] = value;
        }
    }

    pub fn get(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }
}

/// Per-document metadata. Entries are shared out as `Arc` clones; the fields
/// that change after publication use interior mutability and are only
/// written under the owning index's write lock.
#[derive(Debug)]
pub struct DocumentMetadata {
    pub id: DocId,
    pub key: String,
    pub score: f32,
    pub payload: Option<Vec<u8>>,
    flags: AtomicU32,
    max_freq: AtomicU32,
    len: AtomicU32,
    sort_vector: RwLock<Option<Arc<SortingVector>>>,
    byte_offsets: RwLock<Option<Arc<ByteOffsets>>>,
}

impl DocumentMetadata {
    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn set_flag(&self, flag: u32) {
        self.flags.fetch_or(flag, Ordering::AcqRel);
    }

    pub fn is_deleted(&self) -> bool {
        self.flags() & doc_flags::DELETED != 0
    }

    pub fn max_freq(&self) -> u32 {
        self.max_freq.load(Ordering::Acquire)
    }

    pub fn set_max_freq(&self, v: u32) {
        self.max_freq.store(v, Ordering::Release);
    }

    /// Document length in tokens.
    pub fn len(&self) -> u32 {
        self.len.load(Ordering::Acquire)
    }

    pub fn set_len(&self, v: u32) {
        self.len.store(v, Ordering::Release);
    }

    pub fn sort_vector(&self) -> Option<Arc<SortingVector>> {
        self.sort_vector.read().clone()
    }

    pub fn byte_offsets(&self) -> Option<Arc<ByteOffsets>> {
        self.byte_offsets.read().clone()
    }
}

/// Maps external document keys to dense internal ids and owns the metadata
/// entries. Ids are assigned monotonically and never reused; deletion marks
/// the entry and keeps it reachable by id until `reclaim`.
#[derive(Debug, Default)]
pub struct DocTable {
    entries: HashMap<u64, Arc<DocumentMetadata>>,
    key_map: HashMap<String, DocId>,
    deleted: RoaringTreemap,
    pub max_doc_id: u64,
    pub count: usize,
}

impl DocTable {
    pub fn new() -> Self {
        DocTable::default()
    }

    pub fn put(
        &mut self,
        key: &str,
        score: f32,
        flags: u32,
        payload: Option<Vec<u8>>,
    ) -> Result<DocId> {
        if self.key_map.contains_key(key) {
            return Err(Error::new(
                ErrorKind::DocExists,
                format!("document `{key}` already exists"),
            ));
        }
        self.max_doc_id += 1;
        let id = DocId(self.max_doc_id);
        let mut flags = flags;
        if payload.is_some() {
            flags |= doc_flags::HAS_PAYLOAD;
        }
        let md = Arc::new(DocumentMetadata {
            id,
            key: key.to_string(),
            score,
            payload,
            flags: AtomicU32::new(flags),
            max_freq: AtomicU32::new(0),
            len: AtomicU32::new(0),
            sort_vector: RwLock::new(None),
            byte_offsets: RwLock::new(None),
        });
        self.entries.insert(id.0, md);
        self.key_map.insert(key.to_string(), id);
        self.count += 1;
        Ok(id)
    }

    /// Remove the key mapping and mark the entry deleted, returning it.
    /// The entry itself stays reachable by id until `reclaim`.
    pub fn pop_by_key(&mut self, key: &str) -> Option<Arc<DocumentMetadata>> {
        let id = self.key_map.remove(key)?;
        let md = self.entries.get(&id.0)?.clone();
        md.set_flag(doc_flags::DELETED);
        self.deleted.insert(id.0);
        self.count -= 1;
        Some(md)
    }

    pub fn get_by_id(&self, id: DocId) -> Option<Arc<DocumentMetadata>> {
        self.entries.get(&id.0).cloned()
    }

    pub fn get_by_key(&self, key: &str) -> Option<Arc<DocumentMetadata>> {
        let id = self.key_map.get(key)?;
        self.get_by_id(*id)
    }

    pub fn is_deleted(&self, id: DocId) -> bool {
        self.deleted.contains(id.0)
    }

    /// Deleted entries not yet reclaimed.
    pub fn num_deleted(&self) -> usize {
        self.deleted.len() as usize
    }

    pub fn set_sorting_vector(&self, id: DocId, sv: SortingVector) {
        if let Some(md) = self.entries.get(&id.0) {
            *md.sort_vector.write() = Some(Arc::new(sv));
            md.set_flag(doc_flags::HAS_SORT_VECTOR);
        }
    }

    pub fn set_byte_offsets(&self, id: DocId, bo: ByteOffsets) {
        if let Some(md) = self.entries.get(&id.0) {
            *md.byte_offsets.write() = Some(Arc::new(bo));
            md.set_flag(doc_flags::HAS_OFFSET_VECTOR);
        }
    }

    /// Drop deleted entries no longer referenced by any in-flight result.
    pub fn reclaim(&mut self) -> usize {
        let mut freed = Vec::new();
        for id in self.deleted.iter() {
            if let Some(md) = self.entries.get(&id) {
                if Arc::strong_count(md) == 1 {
                    freed.push(id);
                }
            }
        }
        for id in &freed {
            self.entries.remove(id);
            self.deleted.remove(*id);
        }
        freed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_monotonic_and_exists() {
        let mut table = DocTable::new();
        let d1 = table.put("a", 1.0, 0, None).unwrap();
        let d2 = table.put("b", 1.0, 0, None).unwrap();
        assert_eq!(d1, DocId(1));
        assert_eq!(d2, DocId(2));
        assert_eq!(
            table.put("a", 1.0, 0, None).unwrap_err().kind,
            ErrorKind::DocExists
        );
        assert_eq!(table.count, 2);
    }

    #[test]
    fn test_pop_marks_deleted_but_reachable() {
        let mut table = DocTable::new();
        let id = table.put("a", 1.0, 0, None).unwrap();
        let popped = table.pop_by_key("a").unwrap();
        assert!(popped.is_deleted());
        assert!(table.get_by_key("a").is_none());
        assert!(table.get_by_id(id).is_some());
        assert!(table.is_deleted(id));
        assert_eq!(table.count, 0);

        // Ids are not reused after deletion.
        let id2 = table.put("a", 1.0, 0, None).unwrap();
        assert_eq!(id2, DocId(2));
    }

    #[test]
    fn test_reclaim_respects_outstanding_refs() {
        let mut table = DocTable::new();
        let id = table.put("a", 1.0, 0, None).unwrap();
        let held = table.pop_by_key("a").unwrap();
        assert_eq!(table.reclaim(), 0);
        drop(held);
        assert_eq!(table.reclaim(), 1);
        assert!(table.get_by_id(id).is_none());
    }

    #[test]
    fn test_sorting_vector() {
        let mut table = DocTable::new();
        let id = table.put("a", 1.0, 0, None).unwrap();
        let mut sv = SortingVector::new(2);
        sv.set(1, Value::Number(10.0));
        table.set_sorting_vector(id, sv);
        let md = table.get_by_id(id).unwrap();
        let sv = md.sort_vector().unwrap();
        assert_eq!(sv.get(1), Some(&Value::Number(10.0)));
        assert!(md.flags() & doc_flags::HAS_SORT_VECTOR != 0);
    }
}
