pub mod token;
pub mod tokenizer;
pub mod filter;
pub mod filters;
pub mod analyzer;

pub use analyzer::Analyzer;
pub use token::Token;
pub use tokenizer::{StandardTokenizer, Tokenizer};
