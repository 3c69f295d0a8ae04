//! Knowledge-base sinks: one rendered page per processed email.
//!
//! The sink call is the only retried boundary. Rate-limit responses are
//! retried with exponential backoff; every other failure propagates on the
//! first attempt.

pub mod notion;
pub mod page;

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::error::SinkError;

pub use notion::{NotionConfig, NotionSink};
pub use page::PageRequest;

/// External page-creation capability.
#[async_trait]
pub trait KnowledgeSink: Send + Sync {
    /// Short sink name for logs and errors.
    fn name(&self) -> &str;

    /// Create a page and return the sink's opaque page id.
    async fn create_page(&self, page: &PageRequest) -> Result<String, SinkError>;

    /// The request body `create_page` would send, for dry runs.
    fn render_payload(&self, page: &PageRequest) -> serde_json::Value {
        serde_json::to_value(page).unwrap_or_default()
    }
}

/// Bounded backoff for rate-limited sink calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Create a page, retrying only [`SinkError::RateLimited`] failures.
pub async fn create_page_with_retry(
    sink: &dyn KnowledgeSink,
    page: &PageRequest,
    policy: &RetryPolicy,
) -> Result<String, SinkError> {
    (|| sink.create_page(page))
        .retry(policy.backoff())
        .when(SinkError::is_rate_limited)
        .notify(|err, delay| {
            warn!(
                sink = sink.name(),
                message_id = %page.message_id,
                error = %err,
                "Sink rate limited, retrying in {delay:?}"
            );
        })
        .await
}
