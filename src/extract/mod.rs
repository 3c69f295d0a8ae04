//! Heuristic entity extraction: ranked date candidates and action items.
//!
//! Extraction is rule-based with fixed confidences per rule. Every operation
//! takes the reference instant explicitly and never fails; a candidate that
//! cannot be resolved is simply dropped.

pub mod actions;
pub mod dates;
pub mod grammar;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use actions::{MAX_ACTION_ITEMS, extract_action_items};
pub use dates::{MAX_DATES, extract_dates};

/// Which pass produced a date candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateMethod {
    FullText,
    PatternMatch,
    KeywordContext,
}

impl DateMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullText => "full_text",
            Self::PatternMatch => "pattern_match",
            Self::KeywordContext => "keyword_context",
        }
    }
}

/// Which heuristic produced an action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMethod {
    VerbStart,
    BulletVerb,
    Imperative,
    PleaseVerb,
}

impl ActionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerbStart => "verb_start",
            Self::BulletVerb => "bullet_verb",
            Self::Imperative => "imperative",
            Self::PleaseVerb => "please_verb",
        }
    }
}

/// A date-like phrase and the instant it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDate {
    pub source_text: String,
    pub parsed_instant: DateTime<Utc>,
    pub confidence: f64,
    pub method: DateMethod,
}

/// A line that reads like something the recipient has to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub source_text: String,
    pub verb: String,
    pub confidence: f64,
    /// 1-based line within the body text.
    pub line_number: usize,
    pub method: ActionMethod,
}

/// Combined extraction result for one body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    pub dates: Vec<ExtractedDate>,
    pub action_items: Vec<ActionItem>,
    /// Human-readable count summary.
    pub summary: String,
}

/// Run both extractors over `text`.
pub fn extract_entities(text: &str, now: DateTime<Utc>) -> EntityReport {
    if text.trim().is_empty() {
        return EntityReport {
            summary: "No text provided".into(),
            ..Default::default()
        };
    }

    let dates = extract_dates(text, now);
    let action_items = extract_action_items(text);

    let mut parts = Vec::new();
    if !dates.is_empty() {
        parts.push(format!("Found {} date(s)", dates.len()));
    }
    if !action_items.is_empty() {
        parts.push(format!("Found {} action item(s)", action_items.len()));
    }
    let summary = if parts.is_empty() {
        "No dates or action items found".to_string()
    } else {
        parts.join("; ")
    };

    EntityReport {
        dates,
        action_items,
        summary,
    }
}

/// The most confident strictly-future date; ties go to the earliest listed.
pub fn primary_deadline(dates: &[ExtractedDate], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut best: Option<&ExtractedDate> = None;
    for date in dates.iter().filter(|d| d.parsed_instant > now) {
        if best.is_none_or(|b| date.confidence > b.confidence) {
            best = Some(date);
        }
    }
    best.map(|d| d.parsed_instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 17, 10, 30, 0).unwrap()
    }

    fn date(instant: DateTime<Utc>, confidence: f64) -> ExtractedDate {
        ExtractedDate {
            source_text: instant.to_rfc3339(),
            parsed_instant: instant,
            confidence,
            method: DateMethod::PatternMatch,
        }
    }

    #[test]
    fn past_dates_never_win() {
        let yesterday = now().checked_sub_days(Days::new(1)).unwrap();
        let next_week = now().checked_add_days(Days::new(7)).unwrap();
        let dates = vec![date(yesterday, 0.95), date(next_week, 0.6)];
        assert_eq!(primary_deadline(&dates, now()), Some(next_week));
    }

    #[test]
    fn now_itself_is_not_future() {
        assert_eq!(primary_deadline(&[date(now(), 0.9)], now()), None);
        assert_eq!(primary_deadline(&[], now()), None);
    }

    #[test]
    fn confidence_ties_keep_first() {
        let a = now().checked_add_days(Days::new(3)).unwrap();
        let b = now().checked_add_days(Days::new(1)).unwrap();
        let dates = vec![date(a, 0.9), date(b, 0.9), date(b, 0.7)];
        assert_eq!(primary_deadline(&dates, now()), Some(a));
    }

    #[test]
    fn report_summary_counts() {
        let report = extract_entities("Please submit the report by next Monday.", now());
        assert_eq!(report.summary, "Found 3 date(s); Found 1 action item(s)");
    }

    #[test]
    fn empty_and_plain_text() {
        assert_eq!(extract_entities("", now()).summary, "No text provided");
        let report = extract_entities("Thanks for lunch", now());
        assert!(report.dates.is_empty());
        assert_eq!(report.summary, "No dates or action items found");
    }

    #[test]
    fn scenario_message() {
        let text = "Please submit the report by next Monday. Visit https://x.co/report.";
        let report = extract_entities(text, now());

        let action = &report.action_items[0];
        assert_eq!(action.method, ActionMethod::PleaseVerb);
        assert_eq!(action.confidence, 0.8);
        assert!(report.dates.iter().any(|d| d.source_text.contains("next Monday")));

        let monday = Utc.with_ymd_and_hms(2024, 1, 22, 10, 30, 0).unwrap();
        assert_eq!(primary_deadline(&report.dates, now()), Some(monday));
    }

    #[test]
    fn methods_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ActionMethod::PleaseVerb).unwrap(),
            "\"please_verb\""
        );
        assert_eq!(DateMethod::KeywordContext.as_str(), "keyword_context");
    }
}
