//! GoPizza Storage Layer
//!
//! SQLite-backed key-value slots for state that must survive a restart,
//! such as the signed-in user snapshot.

mod database;
mod error;
mod kv;
mod migrations;

pub use database::Database;
pub use error::StorageError;
pub use kv::KeyValueStore;

pub type Result<T> = std::result::Result<T, StorageError>;
