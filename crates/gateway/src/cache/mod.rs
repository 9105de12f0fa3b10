pub mod public;
pub mod schema;

pub use public::PublicIsnCache;
pub use schema::{SchemaCache, ValidateError};
