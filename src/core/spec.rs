use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::IndexStats;
use crate::core::types::{DocId, Document};
use crate::index::doc_table::DocTable;
use crate::index::geo::GeoIndex;
use crate::index::inverted::{index_flags, IndexEncoder, InvertedIndex};
use crate::index::numeric::NumericRangeTree;
use crate::index::tag::TagIndex;
use crate::indexer::context::{add_options, AddDocumentCtx};
use crate::indexer::DocumentIndexer;
use crate::schema::Schema;
use crate::storage::blob::{decode_blob, encode_blob, BlobStore};
use crate::storage::doc_store::{DocumentStore, MemoryDocumentStore};
use crate::trie::Trie;

/// Everything mutated by the indexing worker, guarded by one lock. Readers
/// take short read guards - one per block read - so the worker can make
/// progress between them.
#[derive(Default)]
pub struct IndexInner {
    pub docs: DocTable,
    pub terms: Trie,
    pub text: HashMap<Vec<u8>, InvertedIndex>,
    pub numeric: HashMap<String, NumericRangeTree>,
    pub tags: HashMap<String, TagIndex>,
    pub geo: HashMap<String, GeoIndex>,
    pub stats: IndexStats,
}

impl IndexInner {
    pub fn text_index_mut(&mut self, term: &[u8], encoder: IndexEncoder) -> &mut InvertedIndex {
        self.text
            .entry(term.to_vec())
            .or_insert_with(|| InvertedIndex::new(encoder))
    }
}

/// The schema of one logical index plus its owned runtime state: metadata
/// table, per-field indexes, terms trie and the indexing worker.
pub struct IndexSpec {
    pub name: String,
    /// Regenerated whenever an index is (re)created under a name; iterators
    /// and resumable contexts compare it to detect a drop.
    pub unique_id: Uuid,
    pub schema: Schema,
    pub config: Arc<Config>,
    pub flags: u32,
    pub inner: Arc<RwLock<IndexInner>>,
    pub doc_store: Arc<dyn DocumentStore>,
    dropped: AtomicBool,
    indexer: Mutex<Option<Arc<DocumentIndexer>>>,
}

impl std::fmt::Debug for IndexSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSpec")
            .field("name", &self.name)
            .field("unique_id", &self.unique_id)
            .field("flags", &self.flags)
            .finish()
    }
}

impl IndexSpec {
    pub fn new(name: &str, schema: Schema, config: Config) -> Arc<IndexSpec> {
        Self::with_store(name, schema, config, Arc::new(MemoryDocumentStore::new()))
    }

    pub fn with_store(
        name: &str,
        schema: Schema,
        config: Config,
        doc_store: Arc<dyn DocumentStore>,
    ) -> Arc<IndexSpec> {
        Arc::new(IndexSpec {
            name: name.to_string(),
            unique_id: Uuid::new_v4(),
            schema,
            config: Arc::new(config),
            flags: index_flags::STORE_FREQS
                | index_flags::STORE_FIELD_MASK
                | index_flags::STORE_OFFSETS,
            inner: Arc::new(RwLock::new(IndexInner::default())),
            doc_store,
            dropped: AtomicBool::new(false),
            indexer: Mutex::new(None),
        })
    }

    pub fn encoder(&self) -> IndexEncoder {
        IndexEncoder::for_flags(self.flags)
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    /// Mark the index dropped and stop its worker. Readers holding the old
    /// spec observe the flag at their next resume point.
    pub fn drop_index(&self) {
        self.dropped.store(true, Ordering::Release);
        if let Some(indexer) = self.indexer.lock().as_ref() {
            indexer.stop();
        }
    }

    /// The index's dedicated worker, started on first use.
    pub fn indexer(self: &Arc<Self>) -> Arc<DocumentIndexer> {
        let mut guard = self.indexer.lock();
        if let Some(indexer) = guard.as_ref() {
            return indexer.clone();
        }
        let indexer = DocumentIndexer::new(self);
        *guard = Some(indexer.clone());
        indexer
    }

    /// Submit a document and block until its completion callback fires.
    pub fn add_document(self: &Arc<Self>, doc: Document, options: u32) -> Result<DocId> {
        let (ctx, done) = AddDocumentCtx::new(self, doc, options)?;
        self.indexer().add(ctx);
        done.recv()
            .map_err(|_| Error::new(ErrorKind::Generic, "indexer dropped completion channel"))?
    }

    pub fn add(self: &Arc<Self>, doc: Document) -> Result<DocId> {
        self.add_document(doc, 0)
    }

    pub fn replace(self: &Arc<Self>, doc: Document) -> Result<DocId> {
        self.add_document(doc, add_options::REPLACE)
    }

    /// Delete by external key. The metadata entry stays reachable by id
    /// until reclaimed.
    pub fn delete_document(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        let existed = inner.docs.pop_by_key(key).is_some();
        if existed {
            inner.stats.num_documents -= 1;
            self.doc_store.delete(key);
        }
        existed
    }

    pub fn num_docs(&self) -> usize {
        self.inner.read().docs.count
    }

    pub fn max_doc_id(&self) -> u64 {
        self.inner.read().docs.max_doc_id
    }

    pub fn stats(&self) -> IndexStats {
        self.inner.read().stats.clone()
    }

    /// Persist the schema (with config) through the host blob capability.
    pub fn save_schema(&self, store: &dyn BlobStore) -> Result<()> {
        let blob = encode_blob(&(&self.schema, self.config.as_ref()))?;
        store.put(&format!("idx:{}:schema", self.name), blob);
        Ok(())
    }

    pub fn load_schema(store: &dyn BlobStore, name: &str) -> Result<(Schema, Config)> {
        let raw = store
            .get(&format!("idx:{name}:schema"))
            .ok_or_else(|| Error::new(ErrorKind::NoSuchIndex, format!("no index `{name}`")))?;
        decode_blob(&raw)
    }
}

/// Process-wide name -> index mapping, built at start-up and read-mostly
/// afterwards.
#[derive(Default)]
pub struct IndexRegistry {
    indexes: RwLock<HashMap<String, Arc<IndexSpec>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        IndexRegistry::default()
    }

    pub fn create(&self, name: &str, schema: Schema, config: Config) -> Result<Arc<IndexSpec>> {
        let mut map = self.indexes.write();
        if map.contains_key(name) {
            return Err(Error::new(
                ErrorKind::AddArgs,
                format!("index `{name}` already exists"),
            ));
        }
        let spec = IndexSpec::new(name, schema, config);
        map.insert(name.to_string(), spec.clone());
        Ok(spec)
    }

    pub fn get(&self, name: &str) -> Result<Arc<IndexSpec>> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NoSuchIndex, format!("no index `{name}`")))
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        let spec = self
            .indexes
            .write()
            .remove(name)
            .ok_or_else(|| Error::new(ErrorKind::NoSuchIndex, format!("no index `{name}`")))?;
        spec.drop_index();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;
    use crate::storage::blob::MemoryBlobStore;

    fn schema() -> Schema {
        Schema::new()
            .add_text_field("title", false)
            .add_tag_field("tags", ',')
    }

    fn inline_config() -> Config {
        Config {
            concurrent_mode: false,
            ..Config::default()
        }
    }

    #[test]
    fn test_doc_count_tracks_adds_and_deletes() {
        let spec = IndexSpec::new("t", schema(), inline_config());
        for i in 0..10 {
            spec.add(Document::new(format!("doc{i}")).text("title", "some words here"))
                .unwrap();
        }
        spec.delete_document("doc3");
        spec.delete_document("doc7");
        assert_eq!(spec.num_docs(), 8);
        assert_eq!(spec.stats().num_documents, 8);
        assert_eq!(spec.max_doc_id(), 10);
    }

    #[test]
    fn test_every_term_posts_each_live_doc_once() {
        let spec = IndexSpec::new("t", schema(), inline_config());
        for i in 0..20 {
            spec.add(
                Document::new(format!("doc{i}"))
                    .text("title", "alpha beta gamma")
                    .tags("tags", "x,y"),
            )
            .unwrap();
        }
        let inner = spec.inner.read();
        for (term, idx) in &inner.text {
            let mut seen = Vec::new();
            for b in 0..idx.num_blocks() {
                for rec in idx.decode_block(b).unwrap() {
                    seen.push(rec.doc_id.0);
                }
            }
            let mut dedup = seen.clone();
            dedup.dedup();
            assert_eq!(seen, dedup, "term {:?} repeats a doc", term);
            assert_eq!(seen.len(), 20);
            // Strictly increasing across the whole index.
            for w in seen.windows(2) {
                assert!(w[0] < w[1]);
            }
            // Block bounds hold their contents.
            for b in &idx.blocks {
                assert!(b.first_id <= b.last_id);
            }
        }
        // Tag posting sets equal the documents carrying the tag.
        let tags = inner.tags.get("tags").unwrap();
        assert_eq!(tags.doc_ids("x").len(), 20);
        assert_eq!(tags.doc_ids("y").len(), 20);
    }

    #[test]
    fn test_threaded_worker_bulk_adds() {
        let spec = IndexSpec::new("t", schema(), Config::default());
        let mut handles = Vec::new();
        for t in 0..4 {
            let spec = spec.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    spec.add(
                        Document::new(format!("t{t}-doc{i}")).text("title", "hello threaded world"),
                    )
                    .unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(spec.num_docs(), 100);

        let inner = spec.inner.read();
        let idx = inner.text.get(b"hello".as_slice()).unwrap();
        assert_eq!(idx.num_docs, 100);
        spec.drop_index();
    }

    #[test]
    fn test_errored_doc_does_not_poison_bulk() {
        let spec = IndexSpec::new("t", schema(), inline_config());
        spec.add(Document::new("a").text("title", "one")).unwrap();
        // Same key without REPLACE fails with DocExists...
        let err = spec.add(Document::new("a").text("title", "two")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DocExists);
        // ...and later documents still index fine.
        spec.add(Document::new("b").text("title", "three")).unwrap();
        assert_eq!(spec.num_docs(), 2);
    }

    #[test]
    fn test_registry_lifecycle() {
        let registry = IndexRegistry::new();
        let spec = registry.create("idx", schema(), inline_config()).unwrap();
        assert!(registry.create("idx", schema(), inline_config()).is_err());
        assert!(registry.get("idx").is_ok());
        registry.drop_index("idx").unwrap();
        assert_eq!(
            registry.get("idx").unwrap_err().kind,
            ErrorKind::NoSuchIndex
        );
        assert!(spec.is_dropped());
        // Adds after the drop surface NoSuchIndex in the completion status.
        let err = spec
            .add(Document::new("x").text("title", "y"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoSuchIndex);
    }

    #[test]
    fn test_schema_blob_roundtrip() {
        let store = MemoryBlobStore::new();
        let spec = IndexSpec::new("t", schema(), inline_config());
        spec.save_schema(&store).unwrap();
        let (schema, config) = IndexSpec::load_schema(&store, "t").unwrap();
        assert!(schema.field("title").is_some());
        assert!(!config.concurrent_mode);
        assert_eq!(
            IndexSpec::load_schema(&store, "nope").unwrap_err().kind,
            ErrorKind::NoSuchIndex
        );
    }

    #[test]
    fn test_worker_reclaims_deleted_metadata() {
        let config = Config {
            concurrent_mode: false,
            gc_threshold: 1,
            ..Config::default()
        };
        let spec = IndexSpec::new("t", schema(), config);
        let old_id = spec.add(Document::new("a").text("title", "first body")).unwrap();
        spec.delete_document("a");
        assert_eq!(spec.inner.read().docs.num_deleted(), 1);

        // The next pass through the indexer runs the reclamation.
        spec.replace(Document::new("a").text("title", "second body")).unwrap();
        let inner = spec.inner.read();
        assert_eq!(inner.docs.num_deleted(), 0);
        assert!(inner.docs.get_by_id(old_id).is_none());
        assert!(inner.docs.get_by_key("a").is_some());
    }

    #[test]
    fn test_partial_merges_unlisted_fields() {
        let spec = IndexSpec::new("t", schema(), inline_config());
        spec.add(
            Document::new("a")
                .text("title", "original title")
                .tags("tags", "x,y"),
        )
        .unwrap();

        // Only the title is listed; tags carry over from the stored doc.
        spec.add_document(
            Document::new("a").text("title", "updated title"),
            add_options::PARTIAL,
        )
        .unwrap();

        let inner = spec.inner.read();
        let md = inner.docs.get_by_key("a").unwrap();
        let tags = inner.tags.get("tags").unwrap();
        assert!(tags.doc_ids("x").contains(&md.id));
        drop(inner);
        let stored = spec.doc_store.load("a").unwrap();
        assert!(stored.contains_key("tags"));
        assert_eq!(
            stored.get("title"),
            Some(&crate::core::types::FieldValue::Text("updated title".into()))
        );
    }

    #[test]
    fn test_nocreate_requires_existing_doc() {
        let spec = IndexSpec::new("t", schema(), inline_config());
        let err = spec
            .add_document(
                Document::new("ghost").text("title", "x"),
                add_options::REPLACE | add_options::NOCREATE,
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DocNotFound);

        // NOCREATE without REPLACE is an argument error.
        let err = spec
            .add_document(Document::new("ghost").text("title", "x"), add_options::NOCREATE)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AddArgs);

        spec.add(Document::new("real").text("title", "x")).unwrap();
        spec.add_document(
            Document::new("real").text("title", "y"),
            add_options::REPLACE | add_options::NOCREATE,
        )
        .unwrap();
    }

    #[test]
    fn test_nosave_indexes_without_storing() {
        let spec = IndexSpec::new("t", schema(), inline_config());
        spec.add_document(
            Document::new("a").text("title", "findable words"),
            add_options::NOSAVE,
        )
        .unwrap();
        assert_eq!(spec.num_docs(), 1);
        assert!(spec.doc_store.load("a").is_none());
    }

    #[test]
    fn test_ids_assigned_in_submission_order_inline() {
        let spec = IndexSpec::new("t", schema(), inline_config());
        let a = spec.add(Document::new("a").text("title", "x")).unwrap();
        let b = spec.add(Document::new("b").text("title", "x")).unwrap();
        assert_eq!(a, DocId(1));
        assert_eq!(b, DocId(2));
    }
}
