pub mod value;
pub mod lookup;
pub mod reply;

pub use lookup::{Lookup, LookupKey, LookupRow};
pub use reply::Reply;
pub use value::Value;
