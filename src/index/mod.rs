pub mod doc_table;
pub mod forward;
pub mod geo;
pub mod inverted;
pub mod numeric;
pub mod offsets;
pub mod tag;

pub use doc_table::{DocTable, DocumentMetadata, SortingVector};
pub use forward::{ForwardIndex, ForwardIndexEntry};
pub use inverted::{IndexEncoder, InvertedIndex, PostingRecord};
