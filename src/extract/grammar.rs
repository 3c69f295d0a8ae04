//! Date phrase resolution against a reference instant.
//!
//! Relative forms ("next Monday", "tomorrow", "last month") keep the time of
//! day of `now`; absolute forms ("March 5", "2024-03-05", "03/05/24") resolve
//! to midnight UTC. A missing year means the year of `now`.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeDelta, Utc, Weekday};
use regex::{Captures, Regex};

const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";

// Full names first so the alternation never stops at an abbreviation.
const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

const MONTH_PREFIXES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

fn date_expression() -> String {
    [
        r"(?P<iso_y>\d{4})-(?P<iso_m>\d{1,2})-(?P<iso_d>\d{1,2})".to_string(),
        r"(?P<dash_a>\d{1,2})-(?P<dash_b>\d{1,2})-(?P<dash_y>\d{4}|\d{2})".to_string(),
        r"(?P<my_m>\d{1,2})/(?P<my_y>\d{4})".to_string(),
        r"(?P<slash_a>\d{1,2})/(?P<slash_b>\d{1,2})(?:/(?P<slash_y>\d{4}|\d{2}))?".to_string(),
        format!(
            r"(?P<dm_day>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<dm_month>{MONTHS})\.?(?:,?\s+(?P<dm_year>\d{{4}}))?"
        ),
        format!(
            r"(?P<md_month>{MONTHS})\.?\s+(?P<md_day>\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(?P<md_year>\d{{4}}))?"
        ),
        format!(r"(?P<modifier>next|this|last)\s+(?P<unit>{WEEKDAYS}|week|month|year)"),
        r"(?P<relative>today|tonight|tomorrow|yesterday)".to_string(),
        format!(r"(?P<weekday>{WEEKDAYS})"),
    ]
    .join("|")
}

static EXACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^(?:{})$", date_expression())).expect("valid exact date regex")
});

static SCAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", date_expression())).expect("valid scan date regex")
});

static SIGNAL_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:by|before|after|on|at|due|deadline|until)\b[\s:]*")
        .expect("valid signal regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Next,
    This,
    Last,
}

impl Modifier {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "next" => Some(Self::Next),
            "this" => Some(Self::This),
            "last" => Some(Self::Last),
            _ => None,
        }
    }
}

/// Resolve a phrase that must be a date expression in its entirety.
///
/// Leading signal words ("by", "due", "deadline:", ...) and trailing
/// punctuation are ignored.
pub fn parse_exact(phrase: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let core = core_phrase(phrase);
    if core.is_empty() {
        return None;
    }
    let caps = EXACT_RE.captures(core)?;
    resolve(&caps, now)
}

/// Resolve the first date expression found anywhere in `text`.
pub fn parse_scan(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    SCAN_RE
        .captures_iter(text)
        .find_map(|caps| resolve(&caps, now))
}

fn core_phrase(phrase: &str) -> &str {
    let mut core = phrase.trim();
    while let Some(m) = SIGNAL_PREFIX_RE.find(core) {
        core = &core[m.end()..];
    }
    core.trim_end_matches(|c: char| {
        c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')')
    })
}

fn resolve(caps: &Captures<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let this_year = now.year();

    if caps.name("iso_y").is_some() {
        return midnight(
            year(caps, "iso_y", this_year)?,
            number(caps, "iso_m")?,
            number(caps, "iso_d")?,
        );
    }
    if caps.name("dash_a").is_some() {
        return numeric(
            number(caps, "dash_a")?,
            number(caps, "dash_b")?,
            year(caps, "dash_y", this_year)?,
        );
    }
    if caps.name("my_m").is_some() {
        return midnight(year(caps, "my_y", this_year)?, number(caps, "my_m")?, 1);
    }
    if caps.name("slash_a").is_some() {
        return numeric(
            number(caps, "slash_a")?,
            number(caps, "slash_b")?,
            year(caps, "slash_y", this_year)?,
        );
    }
    if let Some(month) = caps.name("dm_month") {
        return midnight(
            year(caps, "dm_year", this_year)?,
            month_number(month.as_str())?,
            number(caps, "dm_day")?,
        );
    }
    if let Some(month) = caps.name("md_month") {
        return midnight(
            year(caps, "md_year", this_year)?,
            month_number(month.as_str())?,
            number(caps, "md_day")?,
        );
    }
    if let Some(modifier) = caps.name("modifier") {
        let modifier = Modifier::parse(modifier.as_str())?;
        let unit = caps.name("unit")?.as_str().to_ascii_lowercase();
        return match unit.as_str() {
            "week" => match modifier {
                Modifier::Next => now.checked_add_days(Days::new(7)),
                Modifier::This => Some(now),
                Modifier::Last => now.checked_sub_days(Days::new(7)),
            },
            "month" => match modifier {
                Modifier::Next => now.checked_add_months(Months::new(1)),
                Modifier::This => Some(now),
                Modifier::Last => now.checked_sub_months(Months::new(1)),
            },
            "year" => match modifier {
                Modifier::Next => now.checked_add_months(Months::new(12)),
                Modifier::This => Some(now),
                Modifier::Last => now.checked_sub_months(Months::new(12)),
            },
            weekday => shift_to_weekday(now, weekday.parse().ok()?, modifier),
        };
    }
    if let Some(relative) = caps.name("relative") {
        return match relative.as_str().to_ascii_lowercase().as_str() {
            "today" | "tonight" => Some(now),
            "tomorrow" => now.checked_add_days(Days::new(1)),
            "yesterday" => now.checked_sub_days(Days::new(1)),
            _ => None,
        };
    }
    if let Some(weekday) = caps.name("weekday") {
        let weekday: Weekday = weekday.as_str().parse().ok()?;
        return shift_to_weekday(now, weekday, Modifier::Next);
    }
    None
}

/// `next`: strictly after today. `this`: within the current Monday-based
/// week. `last`: strictly before today.
fn shift_to_weekday(
    now: DateTime<Utc>,
    target: Weekday,
    modifier: Modifier,
) -> Option<DateTime<Utc>> {
    let today = i64::from(now.weekday().num_days_from_monday());
    let target = i64::from(target.num_days_from_monday());
    let offset = match modifier {
        Modifier::Next => match (target - today).rem_euclid(7) {
            0 => 7,
            d => d,
        },
        Modifier::This => target - today,
        Modifier::Last => match (today - target).rem_euclid(7) {
            0 => -7,
            d => -d,
        },
    };
    now.checked_add_signed(TimeDelta::days(offset))
}

/// Month-first unless the first field cannot be a month.
fn numeric(first: u32, second: u32, year: i32) -> Option<DateTime<Utc>> {
    if first > 12 {
        midnight(year, second, first)
    } else {
        midnight(year, first, second)
    }
}

fn midnight(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

fn number(caps: &Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name)?.as_str().parse().ok()
}

fn year(caps: &Captures<'_>, name: &str, default: i32) -> Option<i32> {
    match caps.name(name) {
        None => Some(default),
        Some(m) => {
            let value: i32 = m.as_str().parse().ok()?;
            Some(if m.as_str().len() == 2 { 2000 + value } else { value })
        }
    }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    MONTH_PREFIXES
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Wednesday.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 17, 10, 30, 0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn relative_weekdays() {
        assert_eq!(parse_exact("next Monday", now()), Some(at(2024, 1, 22, 10, 30)));
        assert_eq!(parse_exact("monday", now()), Some(at(2024, 1, 22, 10, 30)));
        assert_eq!(parse_exact("next Wednesday", now()), Some(at(2024, 1, 24, 10, 30)));
        assert_eq!(parse_exact("this Friday", now()), Some(at(2024, 1, 19, 10, 30)));
        assert_eq!(parse_exact("this Monday", now()), Some(at(2024, 1, 15, 10, 30)));
        assert_eq!(parse_exact("last Friday", now()), Some(at(2024, 1, 12, 10, 30)));
        assert_eq!(parse_exact("last Wednesday", now()), Some(at(2024, 1, 10, 10, 30)));
    }

    #[test]
    fn relative_days_and_units() {
        assert_eq!(parse_exact("tomorrow", now()), Some(at(2024, 1, 18, 10, 30)));
        assert_eq!(parse_exact("Yesterday", now()), Some(at(2024, 1, 16, 10, 30)));
        assert_eq!(parse_exact("today", now()), Some(now()));
        assert_eq!(parse_exact("next week", now()), Some(at(2024, 1, 24, 10, 30)));
        assert_eq!(parse_exact("next month", now()), Some(at(2024, 2, 17, 10, 30)));
        assert_eq!(parse_exact("last year", now()), Some(at(2023, 1, 17, 10, 30)));
    }

    #[test]
    fn month_names() {
        assert_eq!(parse_exact("March 5th", now()), Some(at(2024, 3, 5, 0, 0)));
        assert_eq!(parse_exact("Mar. 5, 2025", now()), Some(at(2025, 3, 5, 0, 0)));
        assert_eq!(parse_exact("5 March", now()), Some(at(2024, 3, 5, 0, 0)));
        assert_eq!(parse_exact("21st of sept 2024", now()), Some(at(2024, 9, 21, 0, 0)));
    }

    #[test]
    fn numeric_forms() {
        assert_eq!(parse_exact("2024-02-29", now()), Some(at(2024, 2, 29, 0, 0)));
        assert_eq!(parse_exact("2023-02-29", now()), None);
        assert_eq!(parse_exact("01/15/24", now()), Some(at(2024, 1, 15, 0, 0)));
        assert_eq!(parse_exact("25/12/2024", now()), Some(at(2024, 12, 25, 0, 0)));
        assert_eq!(parse_exact("3/4", now()), Some(at(2024, 3, 4, 0, 0)));
        assert_eq!(parse_exact("12/2024", now()), Some(at(2024, 12, 1, 0, 0)));
        assert_eq!(parse_exact("06-30-2024", now()), Some(at(2024, 6, 30, 0, 0)));
    }

    #[test]
    fn signal_words_and_punctuation_ignored() {
        assert_eq!(parse_exact("by next Monday", now()), Some(at(2024, 1, 22, 10, 30)));
        assert_eq!(parse_exact("due by: Friday.", now()), Some(at(2024, 1, 19, 10, 30)));
        assert_eq!(parse_exact("Deadline: 2024-03-01", now()), Some(at(2024, 3, 1, 0, 0)));
    }

    #[test]
    fn exact_rejects_surrounding_prose() {
        assert_eq!(parse_exact("Please submit the report by next Monday", now()), None);
        assert_eq!(parse_exact("on", now()), None);
        assert_eq!(parse_exact("", now()), None);
    }

    #[test]
    fn scan_finds_first_valid_expression() {
        assert_eq!(
            parse_scan("Please submit the report by next Monday", now()),
            Some(at(2024, 1, 22, 10, 30))
        );
        assert_eq!(
            parse_scan("Invoice 02/30 was wrong, pay by March 1", now()),
            Some(at(2024, 3, 1, 0, 0))
        );
        assert_eq!(parse_scan("No dates here at all", now()), None);
    }

    #[test]
    fn weekday_needs_whole_word() {
        assert_eq!(parse_scan("Mondays are slow", now()), None);
    }
}
