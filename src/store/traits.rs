//! `RecordStore` trait: the single async interface for record persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::pipeline::types::EmailRecord;

/// Durable, idempotent storage of email records keyed by message id.
///
/// Every operation is one short statement; none holds a lock across calls.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Whether a record with this message id exists (the dedup gate).
    async fn is_processed(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Insert the record unless its message id is already stored.
    ///
    /// Returns `false` when an existing record was kept unchanged.
    async fn insert_if_absent(&self, record: &EmailRecord) -> Result<bool, DatabaseError>;

    /// Attach the sink's page reference. Returns `false` for an unknown id.
    async fn set_external_reference(
        &self,
        message_id: &str,
        reference: &str,
    ) -> Result<bool, DatabaseError>;

    /// The stored sink reference, if any.
    async fn external_reference(&self, message_id: &str)
    -> Result<Option<String>, DatabaseError>;

    async fn get_record(&self, message_id: &str) -> Result<Option<EmailRecord>, DatabaseError>;

    /// Number of stored records.
    async fn count(&self) -> Result<u64, DatabaseError>;
}
