//! Action item extraction from line-level heuristics.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::{ActionItem, ActionMethod};

/// Maximum number of action items kept.
pub const MAX_ACTION_ITEMS: usize = 10;

/// Lines shorter than this (in characters, after trimming) are ignored.
const MIN_LINE_CHARS: usize = 10;

/// Action verbs in priority order; when several occur in a line the earliest
/// listed one names the item.
const ACTION_VERBS: &[&str] = &[
    "submit", "register", "attend", "complete", "finish", "send", "reply", "respond",
    "schedule", "book", "reserve", "confirm", "cancel", "update", "review", "approve",
    "reject", "sign", "upload", "download", "install", "configure", "setup", "test",
    "verify", "check", "validate", "create", "delete", "modify", "change", "fix",
    "resolve", "implement", "develop", "build", "deploy", "publish", "share", "forward",
    "copy", "paste", "print", "save", "backup", "restore", "migrate", "upgrade",
    "downgrade", "rollback", "merge", "split", "combine", "separate", "organize", "sort",
    "filter", "search", "find", "locate", "identify", "analyze", "evaluate", "assess",
    "measure", "calculate", "compute", "process", "handle", "manage", "administer",
    "supervise", "monitor", "track", "follow", "trace", "investigate", "research", "study",
    "learn", "understand", "comprehend", "explain", "describe", "document", "record", "log",
    "note", "mention", "refer", "cite", "quote", "reference", "link", "connect",
    "associate", "relate", "correlate", "compare", "contrast", "differentiate",
    "distinguish", "categorize", "classify", "group", "cluster", "segment", "partition",
    "divide", "break", "isolate", "extract", "remove", "eliminate", "exclude", "include",
    "add", "insert", "append", "prepend", "attach", "detach", "unlink", "disconnect",
    "join", "leave", "enter", "exit", "start", "stop", "begin", "end", "pause", "resume",
    "continue", "proceed", "advance", "progress", "move", "shift", "transfer", "relocate",
    "reposition", "rearrange", "reorganize", "restructure", "reformat", "redesign",
    "rebuild", "reconstruct", "recreate", "reproduce", "replicate", "duplicate", "clone",
];

const BULLET_GLYPHS: &[char] = &['•', '-', '*', '–'];

const PRONOUNS: &[&str] = &["i", "we", "you", "they", "he", "she", "it"];

/// Verb → priority rank (lower wins).
static VERB_RANK: LazyLock<HashMap<&'static str, usize>> = LazyLock::new(|| {
    let mut ranks = HashMap::with_capacity(ACTION_VERBS.len());
    for (rank, verb) in ACTION_VERBS.iter().enumerate() {
        ranks.entry(*verb).or_insert(rank);
    }
    ranks
});

static PRONOUN_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| PRONOUNS.iter().copied().collect());

static NUMBERED_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]").expect("valid numbered marker regex"));

/// Extract up to [`MAX_ACTION_ITEMS`] action items from `text`.
///
/// Each line can yield one candidate per heuristic; candidates are ordered
/// by descending confidence (stable) and deduplicated by line text, so the
/// strongest heuristic for a line wins.
pub fn extract_action_items(text: &str) -> Vec<ActionItem> {
    let mut items = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.chars().count() < MIN_LINE_CHARS {
            continue;
        }
        let lower = line.to_lowercase();
        let line_number = index + 1;
        let first = first_word(&lower);
        let best_verb = best_verb(&lower);

        let mut push = |verb: &str, confidence: f64, method: ActionMethod| {
            items.push(ActionItem {
                source_text: line.to_string(),
                verb: verb.to_string(),
                confidence,
                line_number,
                method,
            });
        };

        if VERB_RANK.contains_key(first)
            && matches!(lower[first.len()..].chars().next(), Some(' ' | ':'))
        {
            push(first, 0.9, ActionMethod::VerbStart);
        }

        let Some(verb) = best_verb else {
            continue;
        };

        if line.starts_with(BULLET_GLYPHS) || NUMBERED_MARKER_RE.is_match(line) {
            push(verb, 0.8, ActionMethod::BulletVerb);
        }

        if line.ends_with(['.', '!', '?']) && !PRONOUN_SET.contains(first) {
            push(verb, 0.7, ActionMethod::Imperative);
        }

        if first == "please" {
            push(verb, 0.8, ActionMethod::PleaseVerb);
        }
    }

    items.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.source_text.clone()));
    items.truncate(MAX_ACTION_ITEMS);
    items
}

/// Leading run of alphabetic characters.
fn first_word(lower: &str) -> &str {
    let end = lower
        .find(|c: char| !c.is_alphabetic())
        .unwrap_or(lower.len());
    &lower[..end]
}

/// Highest-priority vocabulary verb appearing as a whole word.
///
/// Matching is word-exact rather than substring: inflected forms such as
/// "submitted" or "reviewing" do not count, and neither do verbs buried
/// inside longer words ("address" does not yield "add").
fn best_verb(lower: &str) -> Option<&'static str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter_map(|word| VERB_RANK.get_key_value(word))
        .min_by_key(|(_, rank)| **rank)
        .map(|(verb, _)| *verb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_start_line() {
        let items = extract_action_items("Review the quarterly budget");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].method, ActionMethod::VerbStart);
        assert_eq!(items[0].verb, "review");
        assert_eq!(items[0].confidence, 0.9);
        assert_eq!(items[0].line_number, 1);
    }

    #[test]
    fn verb_start_with_colon() {
        let items = extract_action_items("Confirm: attendance for Friday");
        assert_eq!(items[0].method, ActionMethod::VerbStart);
        assert_eq!(items[0].verb, "confirm");
    }

    #[test]
    fn please_beats_imperative() {
        let items = extract_action_items(
            "Please submit the report by next Monday. Visit https://x.co/report.",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].method, ActionMethod::PleaseVerb);
        assert_eq!(items[0].verb, "submit");
        assert_eq!(items[0].confidence, 0.8);
    }

    #[test]
    fn bullets_and_numbered_markers() {
        let text = "Agenda:\n- the team will review slides\n2) budget we need to approve\n• nothing to do here";
        let items = extract_action_items(text);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.method == ActionMethod::BulletVerb));
        assert_eq!(items[0].line_number, 2);
        assert_eq!(items[1].verb, "approve");
        assert_eq!(items[1].line_number, 3);
    }

    #[test]
    fn pronoun_lines_are_not_imperative() {
        assert!(extract_action_items("We will review it tomorrow.").is_empty());
        // "Items" starts with "It" but is not the pronoun.
        let items = extract_action_items("Items to review before launch.");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].method, ActionMethod::Imperative);
    }

    #[test]
    fn verbs_match_whole_words_only() {
        // "testing" and "address" contain vocabulary verbs only as substrings.
        assert!(extract_action_items("Our testing address changed.").is_empty());
    }

    #[test]
    fn inflected_verbs_do_not_match() {
        assert!(extract_action_items("Please submitted forms go to the office.").is_empty());
        assert!(extract_action_items("Reviewing the draft took all week.").is_empty());
    }

    #[test]
    fn earliest_ranked_verb_wins() {
        let items = extract_action_items("The form: update and submit it today!");
        assert_eq!(items[0].verb, "submit");
    }

    #[test]
    fn short_lines_ignored() {
        assert!(extract_action_items("Send it.").is_empty());
        assert!(extract_action_items("").is_empty());
    }

    #[test]
    fn capped_at_ten_verb_start_items() {
        let text: String = (1..=15)
            .map(|n| format!("Review section {n} of the plan\n"))
            .collect();
        let items = extract_action_items(&text);
        assert_eq!(items.len(), MAX_ACTION_ITEMS);
        assert!(items.iter().all(|i| i.method == ActionMethod::VerbStart));
        assert!(items.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert_eq!(items[0].line_number, 1);
    }

    #[test]
    fn vocabulary_has_no_duplicates() {
        let unique: HashSet<_> = ACTION_VERBS.iter().collect();
        assert_eq!(unique.len(), ACTION_VERBS.len());
    }
}
