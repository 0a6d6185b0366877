pub mod schema;

pub use schema::{FieldSpec, FieldType, Schema};
