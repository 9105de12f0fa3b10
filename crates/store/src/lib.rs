//! Persistence gateway: typed queries over accounts, ISNs, signal types,
//! signals, batches, and credentials.
//!
//! One [`Store`] wraps a bounded `sqlx` SQLite pool. Every uniqueness
//! invariant the system depends on is declared in the schema (`db.rs`),
//! so concurrent writers are serialized by the database, not by in-process
//! locks.

mod accounts;
mod batches;
mod db;
mod error;
mod isns;
mod signal_types;
mod signals;
mod tokens;

pub use accounts::UserCredentials;
pub use db::Store;
pub use error::{Result, StoreError};
pub use isns::PublicSignalTypeRow;
pub use signal_types::SchemaEntry;
pub use signals::{NewSignalVersion, SearchParams, SearchRow, StoredVersion};
pub use tokens::RefreshTokenRow;
