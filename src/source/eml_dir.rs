//! A directory of `.eml` files as a mail source.
//!
//! File names are taken as delivery order, so `Recent` reads from the end of
//! the sorted listing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{FetchCriteria, FetchOrder, MailSource};
use crate::error::SourceError;
use crate::pipeline::types::RawMessage;

pub struct EmlDirSource {
    dir: PathBuf,
}

impl EmlDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn list(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_eml(&path) && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }
}

fn is_eml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("eml"))
}

#[async_trait]
impl MailSource for EmlDirSource {
    fn name(&self) -> &str {
        "eml-dir"
    }

    async fn fetch(&self, criteria: &FetchCriteria) -> Result<Vec<RawMessage>, SourceError> {
        if criteria.query.is_some() {
            warn!(dir = %self.dir.display(), "Queries are not supported for .eml directories, ignoring");
        }

        let paths = self.list().await?;
        let selected: Vec<PathBuf> = match criteria.order {
            FetchOrder::Recent => paths.into_iter().rev().take(criteria.limit).collect(),
            FetchOrder::Oldest => paths.into_iter().take(criteria.limit).collect(),
        };

        let mut messages = Vec::with_capacity(selected.len());
        for path in selected {
            let raw_bytes = tokio::fs::read(&path).await?;
            let received_at = tokio::fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            debug!(path = %path.display(), bytes = raw_bytes.len(), "Read .eml file");
            messages.push(RawMessage {
                message_id: None,
                raw_bytes,
                flags: Vec::new(),
                received_at,
            });
        }
        Ok(messages)
    }
}
