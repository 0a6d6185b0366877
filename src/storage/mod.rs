pub mod blob;
pub mod doc_store;

pub use blob::{BlobStore, MemoryBlobStore};
pub use doc_store::{DocumentStore, MemoryDocumentStore};
