//! libSQL backend: async `RecordStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::extract::ActionItem;
use crate::pipeline::types::EmailRecord;
use crate::store::migrations;
use crate::store::traits::RecordStore;

/// libSQL record store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests and dry runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Legacy rows hold naive ISO timestamps (with or without fraction).
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Text column that may be NULL in legacy rows.
fn text_or_default(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

const RECORD_COLUMNS: &str = "message_id, subject, sender, date, summary, body, links, processed_at, external_reference, deadline, action_items, ner_summary";

fn row_to_record(row: &libsql::Row) -> Result<EmailRecord, DatabaseError> {
    let links = text_or_default(row, 6)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let action_items_json = text_or_default(row, 10);
    let action_items: Vec<ActionItem> = if action_items_json.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&action_items_json)
            .map_err(|e| DatabaseError::Serialization(format!("action_items: {e}")))?
    };

    let message_id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;

    Ok(EmailRecord {
        message_id,
        subject: text_or_default(row, 1),
        sender: text_or_default(row, 2),
        date: text_or_default(row, 3),
        summary: text_or_default(row, 4),
        body: text_or_default(row, 5),
        links,
        processed_at: parse_datetime(&text_or_default(row, 7)),
        external_reference: row.get::<String>(8).ok().filter(|s| !s.is_empty()),
        deadline: row
            .get::<String>(9)
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| parse_datetime(&s)),
        action_items,
        ner_summary: text_or_default(row, 11),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlStore {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn is_processed(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM emails WHERE message_id = ?1 LIMIT 1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_processed: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(format!("is_processed: {e}"))),
        }
    }

    async fn insert_if_absent(&self, record: &EmailRecord) -> Result<bool, DatabaseError> {
        let action_items = serde_json::to_string(&record.action_items)
            .map_err(|e| DatabaseError::Serialization(format!("action_items: {e}")))?;

        let inserted = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO emails ({RECORD_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    record.message_id.as_str(),
                    record.subject.as_str(),
                    record.sender.as_str(),
                    record.date.as_str(),
                    record.summary.as_str(),
                    record.body.as_str(),
                    record.links.join("\n"),
                    record.processed_at.to_rfc3339(),
                    opt_text_owned(record.external_reference.clone()),
                    opt_text_owned(record.deadline.map(|d| d.to_rfc3339())),
                    action_items,
                    record.ner_summary.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_if_absent: {e}")))?;

        if inserted == 0 {
            debug!(message_id = %record.message_id, "Record already stored, insert ignored");
        }
        Ok(inserted > 0)
    }

    async fn set_external_reference(
        &self,
        message_id: &str,
        reference: &str,
    ) -> Result<bool, DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE emails SET external_reference = ?1 WHERE message_id = ?2",
                params![reference, message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_external_reference: {e}")))?;
        Ok(updated > 0)
    }

    async fn external_reference(
        &self,
        message_id: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT external_reference FROM emails WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("external_reference: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok().filter(|s| !s.is_empty())),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("external_reference: {e}"))),
        }
    }

    async fn get_record(&self, message_id: &str) -> Result<Option<EmailRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM emails WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_record: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_record: {e}"))),
        }
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM emails", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count: {e}")))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count: {e}"))),
        }
    }
}
