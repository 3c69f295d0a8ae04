//! Mail sources: where raw RFC 822 messages come from.

pub mod eml_dir;
pub mod imap;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use crate::error::{ConfigError, SourceError};
use crate::pipeline::types::RawMessage;

pub use eml_dir::EmlDirSource;
pub use imap::{ImapConfig, ImapSource};

/// Which end of the matching set to take when a limit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchOrder {
    /// Newest messages first.
    #[default]
    Recent,
    Oldest,
}

impl FromStr for FetchOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recent" | "newest" => Ok(Self::Recent),
            "oldest" => Ok(Self::Oldest),
            other => Err(ConfigError::InvalidValue {
                key: "MAILBRIEF_ORDER".into(),
                message: format!("expected `recent` or `oldest`, got `{other}`"),
            }),
        }
    }
}

/// What to fetch in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCriteria {
    pub limit: usize,
    /// Gmail-style query (`after:2024/01/15 from:@example.com`); `None` means unread.
    pub query: Option<String>,
    pub order: FetchOrder,
}

impl Default for FetchCriteria {
    fn default() -> Self {
        Self {
            limit: 10,
            query: None,
            order: FetchOrder::Recent,
        }
    }
}

/// A producer of raw messages.
#[async_trait]
pub trait MailSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch up to `criteria.limit` messages, in delivery order.
    async fn fetch(&self, criteria: &FetchCriteria) -> Result<Vec<RawMessage>, SourceError>;
}

/// Translate a Gmail-style query into IMAP SEARCH keys.
///
/// Supported terms: `after:YYYY/MM/DD`, `before:YYYY/MM/DD`, `from:X`,
/// `subject:X` and `is:unread`. Unknown terms are ignored. An empty result
/// falls back to `UNSEEN`.
pub fn translate_query(query: Option<&str>) -> String {
    let mut keys: Vec<String> = Vec::new();

    for term in query.unwrap_or_default().split_whitespace() {
        let Some((field, value)) = term.split_once(':') else {
            warn!(term, "Ignoring free-text query term");
            continue;
        };
        let value = value.trim_matches('"');
        match field.to_ascii_lowercase().as_str() {
            "after" | "before" => match imap_date(value) {
                Some(date) => {
                    let key = if field.eq_ignore_ascii_case("after") {
                        "SINCE"
                    } else {
                        "BEFORE"
                    };
                    keys.push(format!("{key} {date}"));
                }
                None => warn!(term, "Invalid date in query"),
            },
            "from" if !value.is_empty() => {
                keys.push(format!("FROM \"{}\"", value.trim_start_matches('@')));
            }
            "subject" if !value.is_empty() => keys.push(format!("SUBJECT \"{value}\"")),
            "is" if value.eq_ignore_ascii_case("unread") => keys.push("UNSEEN".into()),
            _ => warn!(term, "Ignoring unsupported query term"),
        }
    }

    if keys.is_empty() {
        "UNSEEN".to_string()
    } else {
        keys.join(" ")
    }
}

/// `2024/01/05` → `05-Jan-2024`.
fn imap_date(value: &str) -> Option<String> {
    NaiveDate::parse_from_str(value, "%Y/%m/%d")
        .ok()
        .map(|d| d.format("%d-%b-%Y").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_query_means_unseen() {
        assert_eq!(translate_query(None), "UNSEEN");
        assert_eq!(translate_query(Some("   ")), "UNSEEN");
    }

    #[test]
    fn after_becomes_since() {
        assert_eq!(translate_query(Some("after:2024/1/5")), "SINCE 05-Jan-2024");
    }

    #[test]
    fn combined_terms() {
        assert_eq!(
            translate_query(Some("after:2024/03/10 from:@example.com is:unread")),
            "SINCE 10-Mar-2024 FROM \"example.com\" UNSEEN"
        );
    }

    #[test]
    fn invalid_terms_fall_back() {
        assert_eq!(translate_query(Some("after:yesterday hello")), "UNSEEN");
    }

    #[test]
    fn order_parses() {
        assert_eq!("Oldest".parse::<FetchOrder>().unwrap(), FetchOrder::Oldest);
        assert_eq!("recent".parse::<FetchOrder>().unwrap(), FetchOrder::Recent);
        assert!("sideways".parse::<FetchOrder>().is_err());
    }
}
