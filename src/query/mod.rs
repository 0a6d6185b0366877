pub mod ast;
pub mod parser;
pub mod eval;
pub mod expander;

pub use ast::{QueryAst, QueryNode, QueryNodeKind, QueryNodeOptions};
pub use parser::{DefaultOperator, QueryParser};
pub use eval::{QueryEvalCtx, SearchOptions};
