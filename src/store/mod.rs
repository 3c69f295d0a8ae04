//! Persistence layer: libSQL-backed, idempotent email record storage.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::RecordStore;
