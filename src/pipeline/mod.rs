pub mod processor;
pub mod scorer;
pub mod sorter;
pub mod pager;
pub mod loader;
pub mod fragmenter;
pub mod highlighter;
pub mod reducer;
pub mod grouper;

pub use processor::{
    resolve_value, QueryProcessingCtx, ResultProcessor, RootProcessor, RpResult, SearchResult,
};
pub use sorter::{SorterProcessor, SortMode, SORTASCMAP_MAXFIELDS};
pub use pager::PagerProcessor;
pub use loader::LoaderProcessor;
pub use highlighter::HighlighterProcessor;
pub use grouper::GrouperProcessor;
