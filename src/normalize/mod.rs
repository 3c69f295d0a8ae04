//! MIME normalizer: raw RFC 822 bytes into a text-only projection.
//!
//! Never fails: unparseable input degrades to empty strings and the
//! sentinel sender.
//!
//! Content selection walks the part tree in document order:
//! 1. first `text/plain` part, decoded with its declared charset
//! 2. else first `text/html` part, converted to text
//! 3. else an empty body
//!
//! A part that fails to decode is skipped in favour of the next candidate.

pub mod html;

use std::sync::LazyLock;

use chrono::DateTime;
use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use html::html_to_text;

/// Sender used when the `From` header yields no address at all.
pub const UNKNOWN_SENDER: &str = "Unknown <unknown@example.com>";

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("valid link regex"));

static BRACKETED_EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]+@[^>]+)>").expect("valid email regex"));

static DISPLAY_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^<]+)<").expect("valid name regex"));

static TRAILING_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("valid comment regex"));

/// Decoded, text-only projection of a raw message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub subject: String,
    /// Always `"Name <email>"` shaped.
    pub sender: String,
    /// The `Date` header as written by the sender.
    pub header_date: String,
    pub body_text: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Plain,
    Html,
}

/// Normalize raw RFC 822 bytes.
pub fn normalize(raw: &[u8]) -> NormalizedMessage {
    let parsed = MessageParser::default().parse(raw);
    if parsed.is_none() {
        debug!(bytes = raw.len(), "MIME parse failed, falling back to raw headers");
    }

    let subject = parsed
        .as_ref()
        .and_then(|m| m.subject())
        .map(str::to_string)
        .or_else(|| raw_header(raw, "Subject"))
        .unwrap_or_default();

    let sender = normalize_sender(&sender_header(parsed.as_ref(), raw));
    let header_date = raw_header(raw, "Date").unwrap_or_default();
    let body_text = parsed.as_ref().map(select_body).unwrap_or_default();
    let links = extract_links(&body_text);

    NormalizedMessage {
        subject,
        sender,
        header_date,
        body_text,
        links,
    }
}

/// All `http`/`https` tokens in `text`, in order, duplicates kept.
///
/// A URL runs until the next whitespace, so trailing sentence punctuation
/// is part of the match.
pub fn extract_links(text: &str) -> Vec<String> {
    LINK_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Normalize a `From` header into `"Display Name <email>"`.
///
/// - `"Name <email>"` keeps both parts (quotes around the name stripped)
/// - a bare single-token address becomes `"Unknown <email>"`
/// - anything else becomes [`UNKNOWN_SENDER`]
pub fn normalize_sender(header: &str) -> String {
    let header = header.trim();
    if header.is_empty() {
        return UNKNOWN_SENDER.to_string();
    }

    let email = if let Some(caps) = BRACKETED_EMAIL_RE.captures(header) {
        caps[1].trim().to_string()
    } else if header.contains('@') && !header.contains(char::is_whitespace) {
        header.to_string()
    } else {
        return UNKNOWN_SENDER.to_string();
    };

    if let Some(caps) = DISPLAY_NAME_RE.captures(header) {
        let name = caps[1].trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if !name.is_empty() && name != email {
            return format!("{name} <{email}>");
        }
    }

    format!("Unknown <{email}>")
}

/// Convert an RFC 2822 `Date` header to RFC 3339.
pub fn header_date_iso(header_date: &str) -> Option<String> {
    let trimmed = header_date.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc2822(&TRAILING_COMMENT_RE.replace(trimmed, "")))
        .ok()
        .map(|dt| dt.to_rfc3339())
}

/// The `Message-ID` header, verbatim (angle brackets kept).
pub fn header_message_id(raw: &[u8]) -> Option<String> {
    raw_header(raw, "Message-ID").filter(|id| !id.is_empty())
}

/// Build the header string fed to [`normalize_sender`].
///
/// Prefers the parser's decoded address (RFC 2047 names resolved) and falls
/// back to the raw header text.
fn sender_header(parsed: Option<&Message<'_>>, raw: &[u8]) -> String {
    if let Some(addr) = parsed.and_then(|m| m.from()).and_then(|a| a.first()) {
        match (addr.name(), addr.address()) {
            (Some(name), Some(email)) => return format!("{name} <{email}>"),
            (None, Some(email)) => return email.to_string(),
            _ => {}
        }
    }
    raw_header(raw, "From").unwrap_or_default()
}

fn select_body(parsed: &Message<'_>) -> String {
    for wanted in [TextKind::Plain, TextKind::Html] {
        for (index, part) in parsed.parts.iter().enumerate() {
            if text_kind(part) != Some(wanted) {
                continue;
            }
            match decode_part(part) {
                Some(text) if wanted == TextKind::Html => return html_to_text(&text),
                Some(text) => return text,
                None => {
                    debug!(part = index, kind = ?wanted, "Undecodable text part, trying next candidate");
                }
            }
        }
    }
    String::new()
}

fn text_kind(part: &MessagePart<'_>) -> Option<TextKind> {
    match MimeHeaders::content_type(part) {
        Some(ct) if ct.ctype().eq_ignore_ascii_case("text") => match ct.subtype() {
            Some(sub) if sub.eq_ignore_ascii_case("plain") => Some(TextKind::Plain),
            Some(sub) if sub.eq_ignore_ascii_case("html") => Some(TextKind::Html),
            None => Some(TextKind::Plain),
            _ => None,
        },
        Some(_) => None,
        // No Content-Type defaults to text/plain.
        None => match part.body {
            PartType::Text(_) => Some(TextKind::Plain),
            PartType::Html(_) => Some(TextKind::Html),
            _ => None,
        },
    }
}

fn decode_part(part: &MessagePart<'_>) -> Option<String> {
    if part.is_encoding_problem {
        return None;
    }
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => Some(text.to_string()),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        _ => None,
    }
}

/// Read one top-level header from the raw bytes, unfolding continuations.
fn raw_header(raw: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let mut value: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(v) = value.as_mut() {
                v.push(' ');
                v.push_str(line.trim());
            }
            continue;
        }
        if value.is_some() {
            break;
        }
        if let Some((key, rest)) = line.split_once(':')
            && key.trim().eq_ignore_ascii_case(name)
        {
            value = Some(rest.trim().to_string());
        }
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: \"Jane Roe\" <jane@example.com>\r
To: team@example.com\r
Subject: Multipart Email\r
Date: Mon, 15 Jan 2024 14:30:00 +0000\r
Message-ID: <multi-1@example.com>\r
MIME-Version: 1.0\r
Content-Type: multipart/alternative; boundary=\"boundary123\"\r
\r
--boundary123\r
Content-Type: text/html; charset=utf-8\r
\r
<html><body><p>This is the HTML version.</p></body></html>\r
--boundary123\r
Content-Type: text/plain; charset=utf-8\r
\r
This is the plain text version.\r
Visit https://example.com for more info.\r
--boundary123--\r
";

    #[test]
    fn multipart_prefers_plain_text() {
        let msg = normalize(MULTIPART.as_bytes());
        assert!(msg.body_text.contains("This is the plain text version"));
        assert!(!msg.body_text.contains("HTML version"));
        assert_eq!(msg.links, vec!["https://example.com"]);
        assert_eq!(msg.subject, "Multipart Email");
        assert_eq!(msg.sender, "Jane Roe <jane@example.com>");
        assert_eq!(msg.header_date, "Mon, 15 Jan 2024 14:30:00 +0000");
    }

    #[test]
    fn html_only_is_converted() {
        let raw = "From: test@example.com\r
Subject: HTML Email Test\r
Content-Type: text/html; charset=utf-8\r
\r
<html><body><h1>Important Meeting</h1><p>Please attend the meeting on <strong>Monday</strong>.</p></body></html>\r
";
        let msg = normalize(raw.as_bytes());
        assert!(msg.body_text.contains("Important Meeting"));
        assert!(msg.body_text.contains("Please attend the meeting on Monday"));
        assert!(!msg.body_text.contains('<'));
        assert_eq!(msg.sender, "Unknown <test@example.com>");
    }

    #[test]
    fn undecodable_plain_part_falls_back_to_html() {
        let raw = "From: a@b.com\r
Subject: broken\r
MIME-Version: 1.0\r
Content-Type: multipart/alternative; boundary=\"XYZ\"\r
\r
--XYZ\r
Content-Type: text/plain; charset=utf-8\r
Content-Transfer-Encoding: base64\r
\r
!!!not*base64@@@\r
--XYZ\r
Content-Type: text/html; charset=utf-8\r
\r
<p>HTML fallback</p>\r
--XYZ--\r
";
        let msg = normalize(raw.as_bytes());
        assert_eq!(msg.body_text, "HTML fallback");
    }

    #[test]
    fn declared_charset_is_honoured() {
        let mut raw = b"From: a@b.com\r\nSubject: latin\r\nContent-Type: text/plain; charset=iso-8859-1\r\n\r\nCaf".to_vec();
        raw.push(0xE9);
        raw.extend_from_slice(b" ouvert\r\n");
        let msg = normalize(&raw);
        assert!(msg.body_text.contains("Café ouvert"));
    }

    #[test]
    fn no_textual_part_gives_empty_body() {
        let raw = "From: a@b.com\r
Subject: image only\r
Content-Type: image/png\r
Content-Transfer-Encoding: base64\r
\r
iVBORw0KGgo=\r
";
        let msg = normalize(raw.as_bytes());
        assert_eq!(msg.body_text, "");
        assert!(msg.links.is_empty());
    }

    #[test]
    fn garbage_input_degrades() {
        let msg = normalize(&[0xff, 0xfe, 0x00]);
        assert_eq!(msg.sender, UNKNOWN_SENDER);
        assert_eq!(msg.header_date, "");
    }

    #[test]
    fn links_keep_order_duplicates_and_punctuation() {
        let text = "See https://a.com/x and http://b.org, then https://a.com/x again.\nHTTPS://C.IO/path";
        assert_eq!(
            extract_links(text),
            vec!["https://a.com/x", "http://b.org,", "https://a.com/x", "HTTPS://C.IO/path"]
        );
    }

    #[test]
    fn links_ignore_plain_addresses() {
        let text = "Visit our website: https://example.com\nDocumentation: http://docs.example.com\nContact support@example.com";
        assert_eq!(extract_links(text).len(), 2);
    }

    #[test]
    fn sender_bracketed() {
        assert_eq!(normalize_sender("John Doe <john@x.com>"), "John Doe <john@x.com>");
        assert_eq!(normalize_sender("\"John Doe\" <john@x.com>"), "John Doe <john@x.com>");
    }

    #[test]
    fn sender_bare_address() {
        assert_eq!(normalize_sender("john@x.com"), "Unknown <john@x.com>");
        assert_eq!(normalize_sender("<john@x.com>"), "Unknown <john@x.com>");
        assert_eq!(normalize_sender("john@x.com <john@x.com>"), "Unknown <john@x.com>");
    }

    #[test]
    fn sender_unparseable() {
        assert_eq!(normalize_sender("John Doe"), UNKNOWN_SENDER);
        assert_eq!(normalize_sender("john at x dot com"), UNKNOWN_SENDER);
        assert_eq!(normalize_sender(""), UNKNOWN_SENDER);
    }

    #[test]
    fn header_date_to_iso() {
        assert_eq!(
            header_date_iso("Mon, 15 Jan 2024 14:30:00 +0000").as_deref(),
            Some("2024-01-15T14:30:00+00:00")
        );
        assert_eq!(
            header_date_iso("Tue, 16 Jan 2024 09:00:00 -0500 (EST)").as_deref(),
            Some("2024-01-16T09:00:00-05:00")
        );
        assert_eq!(header_date_iso("sometime last week"), None);
        assert_eq!(header_date_iso(""), None);
    }

    #[test]
    fn message_id_from_headers() {
        assert_eq!(
            header_message_id(MULTIPART.as_bytes()).as_deref(),
            Some("<multi-1@example.com>")
        );
        assert_eq!(header_message_id(b"Subject: none\r\n\r\nbody"), None);
    }

    #[test]
    fn folded_headers_are_unfolded() {
        let raw = b"Subject: a very\r\n long subject\r\nFrom: x@y.z\r\n\r\nbody";
        assert_eq!(raw_header(raw, "subject").as_deref(), Some("a very long subject"));
    }

    #[test]
    fn headers_stop_at_blank_line() {
        let raw = b"From: x@y.z\r\n\r\nDate: not a header\r\n";
        assert_eq!(raw_header(raw, "Date"), None);
    }
}
