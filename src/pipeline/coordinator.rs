//! Pipeline coordinator: one message end-to-end, then the next.
//!
//! Flow per message:
//! 1. Resolve identity (supplied id → `Message-ID` header → content hash)
//! 2. Skip if already persisted
//! 3. Normalize → extract → summarize → assemble [`EmailRecord`]
//! 4. Persist (insert-if-absent)
//! 5. Optionally render a sink page, send it with bounded retry and write
//!    the returned reference back
//!
//! A failure in one message is logged with its identity and counted; the
//! batch always continues.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::{self, DatabaseError, PipelineError};
use crate::extract::{extract_entities, primary_deadline};
use crate::normalize::{header_date_iso, header_message_id, normalize};
use crate::pipeline::types::{BatchReport, EmailRecord, RawMessage};
use crate::sink::{KnowledgeSink, PageRequest, RetryPolicy, create_page_with_retry};
use crate::source::{FetchCriteria, MailSource};
use crate::store::RecordStore;
use crate::summarize::{DEFAULT_SUMMARY_MAX_LEN, Summarizer};

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Duplicate,
    Processed { page_created: bool },
}

/// Resolve the dedup key for a raw message.
///
/// Order: the source-supplied id, the `Message-ID` header, then
/// `sha256:<hex>` of the raw bytes. Empty bytes with no id have no identity.
pub fn resolve_identity(message: &RawMessage) -> Result<String, PipelineError> {
    if let Some(id) = message.message_id.as_deref().map(str::trim)
        && !id.is_empty()
    {
        return Ok(id.to_string());
    }
    if let Some(id) = header_message_id(&message.raw_bytes) {
        return Ok(id);
    }
    if message.raw_bytes.is_empty() {
        return Err(PipelineError::MissingIdentity);
    }
    Ok(format!("sha256:{}", hex::encode(Sha256::digest(&message.raw_bytes))))
}

/// Batch processor over a store, a summarizer and an optional sink.
pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    summarizer: Summarizer,
    sink: Option<Arc<dyn KnowledgeSink>>,
    dry_run: bool,
    summary_max_len: usize,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(store: Arc<dyn RecordStore>, summarizer: Summarizer) -> Self {
        Self {
            store,
            summarizer,
            sink: None,
            dry_run: false,
            summary_max_len: DEFAULT_SUMMARY_MAX_LEN,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn KnowledgeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Render sink payloads and log them instead of persisting or sending.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_summary_max_len(mut self, max_len: usize) -> Self {
        self.summary_max_len = max_len;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch from `source`, then process what came back.
    ///
    /// Only a failed fetch is an error; everything after it is reported in
    /// the [`BatchReport`].
    pub async fn run_once(
        &self,
        source: &dyn MailSource,
        criteria: &FetchCriteria,
        now: DateTime<Utc>,
    ) -> error::Result<BatchReport> {
        info!(
            source = source.name(),
            limit = criteria.limit,
            query = criteria.query.as_deref().unwrap_or("(unread)"),
            "Fetching messages"
        );
        let messages = source.fetch(criteria).await.map_err(PipelineError::from)?;
        Ok(self.process_batch(messages, now).await)
    }

    /// Process messages in order.
    ///
    /// Per-message failures are counted and skipped. A store failure stops
    /// the batch: the remaining messages are left untouched and the report
    /// is marked [`BatchReport::aborted`].
    pub async fn process_batch(&self, messages: Vec<RawMessage>, now: DateTime<Utc>) -> BatchReport {
        let mut report = BatchReport {
            fetched: messages.len(),
            ..Default::default()
        };
        info!(count = report.fetched, dry_run = self.dry_run, "Processing message batch");

        for (index, message) in messages.iter().enumerate() {
            let message_id = match resolve_identity(message) {
                Ok(id) => id,
                Err(e) => {
                    error!(index, error = %e, "Skipping message without identity");
                    report.failed += 1;
                    continue;
                }
            };

            match self.process_one(&message_id, message, now).await {
                Ok(Outcome::Duplicate) => report.skipped_duplicate += 1,
                Ok(Outcome::Processed { page_created }) => {
                    report.processed += 1;
                    if page_created {
                        report.sink_pages_created += 1;
                    }
                }
                Err(e @ PipelineError::Store { .. }) => {
                    error!(
                        message_id = %message_id,
                        error = %e,
                        remaining = report.fetched - index - 1,
                        "Store unavailable, aborting batch"
                    );
                    report.failed += 1;
                    report.aborted = true;
                    break;
                }
                Err(e) => {
                    error!(message_id = %message_id, error = %e, "Failed to process message");
                    report.failed += 1;
                }
            }
        }

        info!(
            fetched = report.fetched,
            processed = report.processed,
            duplicates = report.skipped_duplicate,
            pages = report.sink_pages_created,
            failed = report.failed,
            aborted = report.aborted,
            "Batch processing complete"
        );
        report
    }

    async fn process_one(
        &self,
        message_id: &str,
        message: &RawMessage,
        now: DateTime<Utc>,
    ) -> Result<Outcome, PipelineError> {
        let store_err = |source: DatabaseError| PipelineError::Store {
            message_id: message_id.to_string(),
            source,
        };

        if self.store.is_processed(message_id).await.map_err(store_err)? {
            debug!(message_id = %message_id, "Already processed, skipping");
            return Ok(Outcome::Duplicate);
        }

        let normalized = normalize(&message.raw_bytes);
        info!(
            message_id = %message_id,
            subject = %normalized.subject,
            sender = %normalized.sender,
            "Processing email"
        );

        let entities = extract_entities(&normalized.body_text, now);
        let deadline = primary_deadline(&entities.dates, now);
        let summary = self
            .summarizer
            .summarize(&normalized.body_text, self.summary_max_len)
            .await;

        let record = EmailRecord {
            message_id: message_id.to_string(),
            date: header_date_iso(&normalized.header_date)
                .unwrap_or_else(|| normalized.header_date.clone()),
            subject: normalized.subject,
            sender: normalized.sender,
            body: normalized.body_text,
            links: normalized.links,
            summary,
            deadline,
            action_items: entities.action_items,
            ner_summary: entities.summary,
            external_reference: None,
            processed_at: now,
        };
        debug!(
            message_id = %message_id,
            deadline = ?record.deadline,
            actions = record.action_items.len(),
            ner = %record.ner_summary,
            "Entities extracted"
        );

        if self.dry_run {
            self.log_dry_run(&record).await;
            return Ok(Outcome::Processed { page_created: false });
        }

        if !self.store.insert_if_absent(&record).await.map_err(store_err)? {
            debug!(message_id = %message_id, "Record appeared concurrently, skipping");
            return Ok(Outcome::Duplicate);
        }

        let Some(sink) = &self.sink else {
            return Ok(Outcome::Processed { page_created: false });
        };

        let title = self.summarizer.title(&record.subject, &record.body).await;
        let page = PageRequest::from_record(&record, title);
        let reference = match create_page_with_retry(sink.as_ref(), &page, &self.retry).await {
            Ok(reference) => reference,
            Err(source) => {
                let err = PipelineError::Sink {
                    message_id: message_id.to_string(),
                    source,
                };
                warn!(error = %err, "Record saved without a sink page");
                return Ok(Outcome::Processed { page_created: false });
            }
        };

        info!(message_id = %message_id, sink = sink.name(), reference = %reference, "Sink page created");
        match self.store.set_external_reference(message_id, &reference).await {
            Ok(true) => {}
            Ok(false) => warn!(message_id = %message_id, "No record to attach the sink reference to"),
            Err(e) => warn!(message_id = %message_id, error = %e, "Failed to save sink reference"),
        }
        Ok(Outcome::Processed { page_created: true })
    }

    async fn log_dry_run(&self, record: &EmailRecord) {
        let Some(sink) = &self.sink else {
            info!(
                message_id = %record.message_id,
                summary = %record.summary,
                "Dry run: record not saved"
            );
            return;
        };

        let title = self.summarizer.title(&record.subject, &record.body).await;
        let page = PageRequest::from_record(record, title);
        let payload = sink.render_payload(&page);
        let rendered = serde_json::to_string_pretty(&payload).unwrap_or_default();
        info!(
            message_id = %record.message_id,
            sink = sink.name(),
            title = %page.title,
            sender = %page.sender,
            payload_bytes = rendered.len(),
            "Dry run: page not sent"
        );
        debug!(message_id = %record.message_id, payload = %rendered, "Dry run payload");
    }
}
