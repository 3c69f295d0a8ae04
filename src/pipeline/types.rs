//! Shared types for the email processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::ActionItem;

// ── Raw message ─────────────────────────────────────────────────────

/// A message exactly as a mail source delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Source-supplied identity, if the source knows one.
    pub message_id: Option<String>,
    /// Full RFC 822 bytes, headers included.
    pub raw_bytes: Vec<u8>,
    /// IMAP flags (`\Seen`, ...) or empty.
    pub flags: Vec<String>,
    pub received_at: Option<DateTime<Utc>>,
}

impl RawMessage {
    pub fn new(raw_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: None,
            raw_bytes: raw_bytes.into(),
            flags: Vec::new(),
            received_at: None,
        }
    }

    pub fn with_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

// ── Email record ────────────────────────────────────────────────────

/// The persisted, deduplicated result of processing one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Dedup key.
    pub message_id: String,
    pub subject: String,
    /// `"Name <email>"`.
    pub sender: String,
    /// RFC 3339 when the header date parsed, else the raw header.
    pub date: String,
    pub body: String,
    pub links: Vec<String>,
    pub summary: String,
    /// Strictly in the future at extraction time.
    pub deadline: Option<DateTime<Utc>>,
    pub action_items: Vec<ActionItem>,
    pub ner_summary: String,
    /// Page id returned by the knowledge sink, attached after creation.
    pub external_reference: Option<String>,
    pub processed_at: DateTime<Utc>,
}

// ── Batch report ────────────────────────────────────────────────────

/// Counters for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub fetched: usize,
    pub skipped_duplicate: usize,
    pub processed: usize,
    pub sink_pages_created: usize,
    pub failed: usize,
    /// The batch stopped early because the store failed.
    #[serde(default)]
    pub aborted: bool,
}

impl BatchReport {
    /// Fold another run's counters into this one.
    pub fn absorb(&mut self, other: BatchReport) {
        self.fetched += other.fetched;
        self.skipped_duplicate += other.skipped_duplicate;
        self.processed += other.processed;
        self.sink_pages_created += other.sink_pages_created;
        self.failed += other.failed;
        self.aborted |= other.aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_message_builder() {
        let raw = RawMessage::new(b"Subject: x\r\n\r\nbody".to_vec()).with_id("<a@b>");
        assert_eq!(raw.message_id.as_deref(), Some("<a@b>"));
        assert!(raw.flags.is_empty());
    }

    #[test]
    fn reports_accumulate() {
        let mut total = BatchReport::default();
        total.absorb(BatchReport {
            fetched: 3,
            skipped_duplicate: 1,
            processed: 2,
            sink_pages_created: 2,
            failed: 0,
            aborted: false,
        });
        total.absorb(BatchReport {
            fetched: 1,
            failed: 1,
            aborted: true,
            ..Default::default()
        });
        assert_eq!(total.fetched, 4);
        assert_eq!(total.processed, 2);
        assert_eq!(total.failed, 1);
        assert!(total.aborted);
    }
}
