pub mod index_result;
pub mod iterator;
pub mod term_iterator;
pub mod union;
pub mod intersect;
pub mod exclusion;

pub use index_result::{IndexResult, IndexResultData, TermData};
pub use iterator::{
    EmptyIterator, GeoFilterIterator, IdListIterator, IndexIterator, NumericFilterIterator,
    SkipOutcome, WildcardIterator,
};
pub use term_iterator::{PostingKey, PostingSource, TermIterator};
pub use union::UnionIterator;
pub use intersect::IntersectIterator;
pub use exclusion::{NotIterator, OptionalIterator};
