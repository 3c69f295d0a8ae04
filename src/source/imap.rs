//! IMAP over TLS, spoken directly on a rustls stream.
//!
//! Blocking I/O; [`ImapSource::fetch`] runs the session on the blocking pool.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use super::{FetchCriteria, FetchOrder, MailSource, translate_query};
use crate::config::{env_value, parse_value};
use crate::error::{ConfigError, SourceError};
use crate::normalize::header_message_id;
use crate::pipeline::types::RawMessage;

static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\d+)\}\r\n$").unwrap());
static UID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bUID (\d+)").unwrap());
static FLAGS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bFLAGS \(([^)]*)\)").unwrap());
static INTERNALDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bINTERNALDATE "([^"]+)""#).unwrap());

// ── Configuration ───────────────────────────────────────────────────

/// IMAP mailbox settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub folder: String,
    pub username: String,
    pub password: SecretString,
    /// Empty means every sender is accepted.
    pub allowed_senders: Vec<String>,
    pub read_timeout: Duration,
}

impl ImapConfig {
    /// Returns `Ok(None)` if `IMAP_HOST` is not set (source disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(host) = env_value("IMAP_HOST") else {
            return Ok(None);
        };

        let port = parse_value("IMAP_PORT", env_value("IMAP_PORT"))?.unwrap_or(993);
        let username = env_value("IMAP_USERNAME")
            .ok_or_else(|| ConfigError::MissingEnvVar("IMAP_USERNAME".into()))?;
        let password = env_value("IMAP_PASSWORD")
            .ok_or_else(|| ConfigError::MissingEnvVar("IMAP_PASSWORD".into()))?;

        let allowed_senders = env_value("IMAP_ALLOWED_SENDERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Some(Self {
            host,
            port,
            folder: env_value("IMAP_FOLDER").unwrap_or_else(|| "INBOX".into()),
            username,
            password: SecretString::from(password),
            allowed_senders,
            read_timeout: Duration::from_secs(30),
        }))
    }
}

// ── Source ──────────────────────────────────────────────────────────

pub struct ImapSource {
    config: ImapConfig,
}

impl ImapSource {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailSource for ImapSource {
    fn name(&self) -> &str {
        "imap"
    }

    async fn fetch(&self, criteria: &FetchCriteria) -> Result<Vec<RawMessage>, SourceError> {
        let config = self.config.clone();
        let criteria = criteria.clone();
        tokio::task::spawn_blocking(move || {
            let stream = connect(&config)?;
            Session::new(stream).fetch(&config, &criteria)
        })
        .await
        .map_err(|e| SourceError::Protocol(format!("IMAP task failed: {e}")))?
    }
}

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

fn connect(config: &ImapConfig) -> Result<TlsStream, SourceError> {
    let connect_err = |reason: String| SourceError::Connect {
        host: config.host.clone(),
        reason,
    };

    let tcp = TcpStream::connect((&*config.host, config.port))
        .map_err(|e| connect_err(e.to_string()))?;
    tcp.set_read_timeout(Some(config.read_timeout))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls::pki_types::ServerName::try_from(config.host.clone())
        .map_err(|e| connect_err(e.to_string()))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| connect_err(e.to_string()))?;

    Ok(rustls::StreamOwned::new(conn, tcp))
}

// ── Protocol ────────────────────────────────────────────────────────

/// One untagged response, with any literals it carried.
#[derive(Debug, Default)]
struct Untagged {
    text: String,
    literals: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Response {
    untagged: Vec<Untagged>,
    ok: bool,
    status: String,
}

struct Session<S> {
    stream: S,
    tag: u32,
}

impl<S: Read + Write> Session<S> {
    fn new(stream: S) -> Self {
        Self { stream, tag: 0 }
    }

    fn read_line(&mut self) -> Result<String, SourceError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if self.stream.read(&mut byte)? == 0 {
                return Err(SourceError::Protocol("IMAP connection closed".into()));
            }
            buf.push(byte[0]);
            if buf.ends_with(b"\r\n") {
                return Ok(String::from_utf8_lossy(&buf).into_owned());
            }
        }
    }

    fn command(&mut self, cmd: &str) -> Result<Response, SourceError> {
        self.tag += 1;
        let tag = format!("A{} ", self.tag);
        self.stream.write_all(format!("{tag}{cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let mut response = Response::default();
        loop {
            let mut line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&tag) {
                response.ok = status.starts_with("OK");
                response.status = status.trim_end().to_string();
                return Ok(response);
            }

            let mut entry = Untagged::default();
            loop {
                let literal_len = LITERAL_RE
                    .captures(&line)
                    .and_then(|c| c[1].parse::<usize>().ok());
                entry.text.push_str(&line);
                let Some(len) = literal_len else { break };
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                entry.literals.push(literal);
                line = self.read_line()?;
            }
            response.untagged.push(entry);
        }
    }

    fn fetch(
        &mut self,
        config: &ImapConfig,
        criteria: &FetchCriteria,
    ) -> Result<Vec<RawMessage>, SourceError> {
        let greeting = self.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(SourceError::Connect {
                host: config.host.clone(),
                reason: greeting.trim_end().to_string(),
            });
        }

        let login = self.command(&format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        ))?;
        if !login.ok {
            return Err(SourceError::AuthFailed {
                user: config.username.clone(),
            });
        }

        let select = self.command(&format!("SELECT {}", quote(&config.folder)))?;
        if !select.ok {
            return Err(SourceError::Protocol(format!(
                "SELECT {} failed: {}",
                config.folder, select.status
            )));
        }

        let search_keys = translate_query(criteria.query.as_deref());
        let search = self.command(&format!("UID SEARCH {search_keys}"))?;
        if !search.ok {
            return Err(SourceError::Protocol(format!(
                "SEARCH failed: {}",
                search.status
            )));
        }

        let uids = select_uids(search_uids(&search), criteria);
        info!(
            host = %config.host,
            folder = %config.folder,
            search = %search_keys,
            selected = uids.len(),
            "IMAP search complete"
        );

        let mut messages = Vec::new();
        if !uids.is_empty() {
            let set = uids
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let fetched = self.command(&format!(
                "UID FETCH {set} (UID FLAGS INTERNALDATE BODY.PEEK[])"
            ))?;
            if !fetched.ok {
                return Err(SourceError::Protocol(format!(
                    "FETCH failed: {}",
                    fetched.status
                )));
            }

            let mut by_uid: HashMap<u32, RawMessage> = fetched
                .untagged
                .into_iter()
                .filter_map(parse_fetch)
                .collect();

            for uid in uids {
                let Some(message) = by_uid.remove(&uid) else {
                    warn!(uid, "Server returned no body for UID");
                    continue;
                };
                if !config.allowed_senders.is_empty() {
                    let sender = sender_address(&message.raw_bytes);
                    if !is_sender_allowed(&config.allowed_senders, &sender) {
                        debug!(uid, sender = %sender, "Skipping email from sender not in allow-list");
                        continue;
                    }
                }
                messages.push(message);
            }
        }

        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout failed");
        }

        Ok(messages)
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn search_uids(response: &Response) -> Vec<u32> {
    let mut uids: Vec<u32> = response
        .untagged
        .iter()
        .filter_map(|u| u.text.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().filter_map(|t| t.parse().ok()))
        .collect();
    uids.sort_unstable();
    uids.dedup();
    uids
}

/// Newest-first for [`FetchOrder::Recent`], oldest-first otherwise.
fn select_uids(uids: Vec<u32>, criteria: &FetchCriteria) -> Vec<u32> {
    match criteria.order {
        FetchOrder::Recent => uids.into_iter().rev().take(criteria.limit).collect(),
        FetchOrder::Oldest => uids.into_iter().take(criteria.limit).collect(),
    }
}

fn parse_fetch(entry: Untagged) -> Option<(u32, RawMessage)> {
    if !entry.text.contains(" FETCH (") {
        return None;
    }
    let uid: u32 = UID_RE.captures(&entry.text)?[1].parse().ok()?;
    let raw_bytes = entry.literals.into_iter().next()?;

    let flags = FLAGS_RE
        .captures(&entry.text)
        .map(|c| c[1].split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let received_at = INTERNALDATE_RE.captures(&entry.text).and_then(|c| {
        DateTime::parse_from_str(c[1].trim(), "%d-%b-%Y %H:%M:%S %z")
            .ok()
            .map(|d| d.with_timezone(&Utc))
    });

    let message_id = header_message_id(&raw_bytes).unwrap_or_else(|| format!("imap-uid:{uid}"));

    Some((
        uid,
        RawMessage {
            message_id: Some(message_id),
            raw_bytes,
            flags,
            received_at,
        },
    ))
}

fn sender_address(raw: &[u8]) -> String {
    MessageParser::default()
        .parse(raw)
        .and_then(|parsed| {
            parsed
                .from()
                .and_then(|addr| addr.first())
                .and_then(|a| a.address())
                .map(|s| s.to_string())
        })
        .unwrap_or_default()
}

/// Check a sender address against an allow-list.
///
/// - Empty list → deny all
/// - `*` in list → allow all
/// - `@domain.com` or `domain.com` → domain match
/// - `user@domain.com` → exact email match
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.to_lowercase();
    allowed.iter().any(|a| {
        if a.starts_with('@') {
            email_lower.ends_with(&a.to_lowercase())
        } else if a.contains('@') {
            a.eq_ignore_ascii_case(email)
        } else {
            email_lower.ends_with(&format!("@{}", a.to_lowercase()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Replays canned server output and records what the client wrote.
    struct ScriptedServer {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl ScriptedServer {
        fn new(script: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(script),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedServer {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedServer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn config(allowed: &[&str]) -> ImapConfig {
        ImapConfig {
            host: "imap.test.com".into(),
            port: 993,
            folder: "INBOX".into(),
            username: "user@test.com".into(),
            password: SecretString::from("pa\"ss"),
            allowed_senders: allowed.iter().map(|s| s.to_string()).collect(),
            read_timeout: Duration::from_secs(1),
        }
    }

    fn fetch_item(uid: u32, body: &str) -> String {
        format!(
            "* {uid} FETCH (UID {uid} FLAGS (\\Seen) INTERNALDATE \" 7-Jan-2024 09:15:00 +0100\" BODY[] {{{}}}\r\n{body})\r\n",
            body.len()
        )
    }

    fn script(search: &str, items: &[String]) -> Vec<u8> {
        let mut s = String::from("* OK IMAP4rev1 ready\r\n");
        s.push_str("A1 OK LOGIN completed\r\n");
        s.push_str("* 3 EXISTS\r\nA2 OK [READ-WRITE] SELECT completed\r\n");
        s.push_str(&format!("* SEARCH {search}\r\nA3 OK SEARCH completed\r\n"));
        if !items.is_empty() {
            for item in items {
                s.push_str(item);
            }
            s.push_str("A4 OK FETCH completed\r\n");
            s.push_str("* BYE\r\nA5 OK LOGOUT completed\r\n");
        } else {
            s.push_str("* BYE\r\nA4 OK LOGOUT completed\r\n");
        }
        s.into_bytes()
    }

    const WITH_ID: &str = "Message-ID: <one@test.com>\r\nFrom: Alice <alice@trusted.org>\r\nSubject: Hi\r\n\r\nBody one\r\n";
    const WITHOUT_ID: &str = "From: Mallory <m@evil.com>\r\nSubject: Hey\r\n\r\nBody two\r\n";

    #[test]
    fn fetches_with_literal_framing() {
        let items = vec![fetch_item(7, WITHOUT_ID), fetch_item(5, WITH_ID)];
        let mut session = Session::new(ScriptedServer::new(script("5 7", &items)));
        let messages = session
            .fetch(&config(&[]), &FetchCriteria::default())
            .unwrap();

        assert_eq!(messages.len(), 2);
        // Newest first.
        assert_eq!(messages[0].message_id.as_deref(), Some("imap-uid:7"));
        assert_eq!(messages[0].raw_bytes, WITHOUT_ID.as_bytes());
        assert_eq!(messages[1].message_id.as_deref(), Some("<one@test.com>"));
        assert_eq!(messages[1].flags, vec!["\\Seen".to_string()]);
        assert_eq!(
            messages[1].received_at.map(|d| d.to_rfc3339()).as_deref(),
            Some("2024-01-07T08:15:00+00:00")
        );

        let written = String::from_utf8(session.stream.written).unwrap();
        assert!(written.contains("A1 LOGIN \"user@test.com\" \"pa\\\"ss\"\r\n"));
        assert!(written.contains("A3 UID SEARCH UNSEEN\r\n"));
        assert!(written.contains("A4 UID FETCH 7,5 (UID FLAGS INTERNALDATE BODY.PEEK[])\r\n"));
    }

    #[test]
    fn allow_list_filters_senders() {
        let items = vec![fetch_item(5, WITH_ID), fetch_item(7, WITHOUT_ID)];
        let mut session = Session::new(ScriptedServer::new(script("5 7", &items)));
        let messages = session
            .fetch(&config(&["trusted.org"]), &FetchCriteria::default())
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id.as_deref(), Some("<one@test.com>"));
    }

    #[test]
    fn empty_search_skips_fetch() {
        let mut session = Session::new(ScriptedServer::new(script("", &[])));
        let messages = session
            .fetch(&config(&[]), &FetchCriteria::default())
            .unwrap();
        assert!(messages.is_empty());
        let written = String::from_utf8(session.stream.written).unwrap();
        assert!(!written.contains("FETCH"));
    }

    #[test]
    fn rejected_login_is_auth_failure() {
        let script = b"* OK ready\r\nA1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n".to_vec();
        let mut session = Session::new(ScriptedServer::new(script));
        let err = session
            .fetch(&config(&[]), &FetchCriteria::default())
            .unwrap_err();
        assert!(matches!(err, SourceError::AuthFailed { .. }));
    }

    #[test]
    fn closed_connection_is_protocol_error() {
        let mut session = Session::new(ScriptedServer::new(b"* OK ready\r\n".to_vec()));
        let err = session
            .fetch(&config(&[]), &FetchCriteria::default())
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn uid_selection_respects_order_and_limit() {
        let oldest = FetchCriteria {
            limit: 2,
            query: None,
            order: FetchOrder::Oldest,
        };
        let recent = FetchCriteria {
            order: FetchOrder::Recent,
            ..oldest.clone()
        };
        assert_eq!(select_uids(vec![1, 2, 3], &oldest), vec![1, 2]);
        assert_eq!(select_uids(vec![1, 2, 3], &recent), vec![3, 2]);
    }

    // ── Sender allowlist ────────────────────────────────────────────

    #[test]
    fn allowlist_empty_denies_all() {
        assert!(!is_sender_allowed(&[], "anyone@example.com"));
    }

    #[test]
    fn allowlist_wildcard_allows_all() {
        let allowed = vec!["*".to_string()];
        assert!(is_sender_allowed(&allowed, "anyone@example.com"));
    }

    #[test]
    fn allowlist_mixed_entries() {
        let allowed = vec![
            "admin@company.com".to_string(),
            "@trusted.org".to_string(),
            "partner.io".to_string(),
        ];
        assert!(is_sender_allowed(&allowed, "Admin@Company.com"));
        assert!(is_sender_allowed(&allowed, "anyone@trusted.org"));
        assert!(is_sender_allowed(&allowed, "ceo@partner.io"));
        assert!(!is_sender_allowed(&allowed, "random@evil.com"));
        assert!(!is_sender_allowed(&allowed, "x@notpartner.io"));
    }
}
