pub mod expr;
pub mod plan;
pub mod request;
pub mod cursor;

pub use plan::{AggregatePlan, PlanStep, ReducerSpec};
pub use request::{qexec_flags, Execution, QueryResponse, ResultRow, SearchRequest};
pub use cursor::CursorRegistry;
