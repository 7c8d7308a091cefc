//! IMAP mailbox over implicit TLS.
//!
//! A deliberately small client: LOGIN, SELECT, SEARCH UNSEEN, FETCH BODY.PEEK[],
//! LOGOUT. Blocking I/O, run on `spawn_blocking`. No STORE is ever issued,
//! so fetched messages stay unseen.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::ImapConfig;
use crate::credentials::MailCredential;
use crate::error::MailboxError;
use crate::mail::mailbox::{MailSession, Mailbox, RawMessage};

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// IMAP-backed [`Mailbox`].
#[derive(Debug, Clone)]
pub struct ImapMailbox {
    config: ImapConfig,
}

impl ImapMailbox {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn open(
        &self,
        credential: &MailCredential,
    ) -> Result<Box<dyn MailSession>, MailboxError> {
        let config = self.config.clone();
        let credential = credential.clone();
        let session = tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::connect(&config)?;
            session.login(&credential)?;
            info!(login = %credential.login, host = %config.host, "IMAP login OK");
            session.select_inbox()?;
            Ok::<_, MailboxError>(session)
        })
        .await
        .map_err(|e| task_failed("LOGIN", e))??;

        Ok(Box::new(ImapMailSession {
            session: Some(session),
        }))
    }
}

/// [`MailSession`] over a blocking [`ImapSession`].
///
/// Each operation moves the session onto the blocking pool and back. A
/// panicked operation leaves the session closed.
struct ImapMailSession {
    session: Option<ImapSession>,
}

impl ImapMailSession {
    async fn run<T, F>(&mut self, command: &'static str, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailboxError> + Send + 'static,
    {
        let mut session = self.session.take().ok_or_else(|| MailboxError::Protocol {
            command: command.into(),
            reason: "session is closed".into(),
        })?;
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await
        .map_err(|e| task_failed(command, e))?;
        self.session = Some(session);
        result
    }
}

#[async_trait]
impl MailSession for ImapMailSession {
    async fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        let ids = self.run("SEARCH", ImapSession::search_unseen).await?;
        if ids.is_empty() {
            info!("No unseen messages");
        } else {
            info!(count = ids.len(), "Unseen messages found");
        }
        Ok(ids)
    }

    async fn fetch(&mut self, id: &str) -> Result<RawMessage, MailboxError> {
        let id = id.to_string();
        self.run("FETCH", move |session| {
            let bytes = session.fetch(&id)?;
            Ok(RawMessage { id, bytes })
        })
        .await
    }

    async fn close(&mut self) {
        if self.session.is_none() {
            return;
        }
        if let Err(e) = self.run("LOGOUT", ImapSession::logout).await {
            debug!(error = %e, "IMAP logout failed");
        }
        self.session = None;
    }
}

fn task_failed(command: &str, e: tokio::task::JoinError) -> MailboxError {
    MailboxError::Protocol {
        command: command.into(),
        reason: format!("mailbox task panicked: {e}"),
    }
}

/// One authenticated IMAP conversation.
struct ImapSession {
    stream: BufReader<TlsStream>,
    next_tag: u32,
}

/// Tagged completion plus untagged lines and any literals received.
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
    status: String,
}

impl ImapSession {
    fn connect(config: &ImapConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
            MailboxError::Connect {
                host: format!("{}:{}", config.host, config.port),
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(config.read_timeout))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| MailboxError::Tls(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;

        let mut session = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailboxError::Protocol {
                command: "greeting".into(),
                reason: greeting.trim_end().to_string(),
            });
        }
        Ok(session)
    }

    fn login(&mut self, credential: &MailCredential) -> Result<(), MailboxError> {
        let command = format!(
            "LOGIN {} {}",
            quote(&credential.login),
            quote(credential.password.expose_secret())
        );
        let response = self.command(&command)?;
        if !is_ok(&response.status) {
            return Err(MailboxError::Auth {
                login: credential.login.clone(),
            });
        }
        Ok(())
    }

    fn select_inbox(&mut self) -> Result<(), MailboxError> {
        self.expect_ok("SELECT \"INBOX\"").map(|_| ())
    }

    /// Sequence ids of unseen messages, ascending.
    fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        let response = self.expect_ok("SEARCH UNSEEN")?;
        let mut ids: Vec<u32> = response
            .lines
            .iter()
            .flat_map(|line| parse_search_line(line))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    /// Full RFC 822 bytes of one message. `BODY.PEEK[]` leaves `\Seen` unset.
    fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MailboxError> {
        let response = self.expect_ok(&format!("FETCH {id} BODY.PEEK[]"))?;
        response
            .literals
            .into_iter()
            .next()
            .ok_or_else(|| MailboxError::Protocol {
                command: format!("FETCH {id}"),
                reason: "response carried no message literal".into(),
            })
    }

    fn logout(&mut self) -> Result<(), MailboxError> {
        self.command("LOGOUT").map(|_| ())
    }

    fn expect_ok(&mut self, command: &str) -> Result<Response, MailboxError> {
        let response = self.command(command)?;
        if is_ok(&response.status) {
            Ok(response)
        } else {
            Err(MailboxError::Protocol {
                command: command.split_whitespace().next().unwrap_or(command).into(),
                reason: response.status.trim_end().to_string(),
            })
        }
    }

    fn command(&mut self, command: &str) -> Result<Response, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;

        let mut lines = Vec::new();
        let mut literals = Vec::new();
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                literals.push(literal);
            }
            if line.starts_with(&format!("{tag} ")) {
                let status = line[tag.len() + 1..].to_string();
                return Ok(Response {
                    lines,
                    literals,
                    status,
                });
            }
            lines.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        let read = self.stream.read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Err(MailboxError::Protocol {
                command: "read".into(),
                reason: "IMAP connection closed".into(),
            });
        }
        Ok(String::from_utf8_lossy(&buf).to_string())
    }
}

fn is_ok(status: &str) -> bool {
    status.starts_with("OK")
}

/// Quote an IMAP string argument.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Ids from an untagged `* SEARCH 1 2 3` line.
fn parse_search_line(line: &str) -> Vec<u32> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("*") || !parts.next().is_some_and(|w| w.eq_ignore_ascii_case("SEARCH"))
    {
        return Vec::new();
    }
    parts.filter_map(|p| p.parse().ok()).collect()
}

/// Byte count of a `{n}` literal announced at the end of a line.
fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let open = trimmed.rfind('{')?;
    let inner = trimmed[open + 1..].strip_suffix('}')?;
    inner.trim_end_matches('+').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_line_parsed() {
        assert_eq!(parse_search_line("* SEARCH 4 12 7\r\n"), vec![4, 12, 7]);
        assert_eq!(parse_search_line("* search 1\r\n"), vec![1]);
    }

    #[test]
    fn empty_search_line() {
        assert!(parse_search_line("* SEARCH\r\n").is_empty());
    }

    #[test]
    fn non_search_lines_ignored() {
        assert!(parse_search_line("* 3 EXISTS\r\n").is_empty());
        assert!(parse_search_line("A3 OK SEARCH completed\r\n").is_empty());
    }

    #[test]
    fn literal_length_detected() {
        assert_eq!(literal_len("* 3 FETCH (BODY[] {1234}\r\n"), Some(1234));
        assert_eq!(literal_len("* 3 FETCH (BODY[] {5+}\r\n"), Some(5));
        assert_eq!(literal_len("A4 OK FETCH completed\r\n"), None);
        assert_eq!(literal_len("* OK {not a number}\r\n"), None);
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote("user@gmail.com"), "\"user@gmail.com\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn ok_status() {
        assert!(is_ok("OK LOGIN completed\r\n"));
        assert!(!is_ok("NO [AUTHENTICATIONFAILED] Invalid credentials\r\n"));
        assert!(!is_ok("BAD syntax\r\n"));
    }
}
