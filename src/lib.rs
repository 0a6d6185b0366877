pub mod core;
pub mod analysis;
pub mod schema;
pub mod compression;
pub mod trie;
pub mod index;
pub mod indexer;
pub mod search;
pub mod query;
pub mod concurrent;
pub mod scoring;
pub mod value;
pub mod util;
pub mod pipeline;
pub mod aggregate;
pub mod storage;

/*
┌──────────────────────────────────────────────────────────────────────────────┐
│                          TEXTDEX STRUCT ARCHITECTURE                          │
└──────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────── CORE ─────────────────────────────────────┐
│  struct IndexSpec                                                             │
│    schema: Schema                      // field specs, mask bits, ordinals    │
│    unique_id: Uuid                     // identity checked on query resume    │
│    inner: Arc<RwLock<IndexInner>>      // everything the worker mutates       │
│    indexer: DocumentIndexer            // one background worker per index     │
│    doc_store: Arc<dyn DocumentStore>   // external raw-field storage          │
│                                                                               │
│  struct IndexInner                                                            │
│    docs: DocTable                      // key <-> dense id, metadata          │
│    terms: Trie                         // COW terms trie for expansion        │
│    text: HashMap<term, InvertedIndex>  // blocked delta-coded postings        │
│    numeric: HashMap<field, NumericRangeTree>                                  │
│    tags: HashMap<field, TagIndex>      // trie map: value -> postings         │
│    geo: HashMap<field, GeoIndex>                                              │
└───────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── ADD PATH ──────────────────────────────────┐
│  Document ──tokenize──> AddDocumentCtx { ForwardIndex, SortingVector,         │
│                                          ByteOffsets, FieldIndexerData }      │
│      │ queue (mutex + condvar)                                                │
│      v                                                                        │
│  DocumentIndexer ──merge bulk──> merged term table ──assign ids──> DocTable   │
│      └──write──> InvertedIndex + NumericRangeTree + TagIndex + GeoIndex       │
└───────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────── QUERY PATH ─────────────────────────────────┐
│  query string ──QueryParser(nom)──> QueryNode tree                            │
│      │ expand (stemmer / phonetic), global filters, field masks               │
│      v                                                                        │
│  QueryEvalCtx ──> IndexIterator tree                                          │
│      term / union / intersect / not / optional / ids / wildcard /             │
│      numeric / geo / tag / prefix / fuzzy / lex-range                         │
│      v                                                                        │
│  RootProcessor -> Scorer -> Sorter (min-max heap) -> Pager -> Loader          │
│      -> Highlighter | Apply / Filter / Grouper+Reducers (aggregations)        │
│      v                                                                        │
│  QueryResponse rows (Reply values)                                            │
└───────────────────────────────────────────────────────────────────────────────┘
*/
