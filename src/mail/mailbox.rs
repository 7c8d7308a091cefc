//! Mailbox seam between the pipeline and the mail transport.

use async_trait::async_trait;

use crate::credentials::MailCredential;
use crate::error::MailboxError;

/// A message fetched from the mailbox, still in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Mailbox-assigned sequence id, as reported by the unseen search.
    pub id: String,
    /// Full RFC 822 message bytes.
    pub bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.into(),
        }
    }
}

/// Source of unread messages. One [`MailSession`] is opened per cycle.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Connect, authenticate and select the inbox.
    async fn open(&self, credential: &MailCredential)
    -> Result<Box<dyn MailSession>, MailboxError>;
}

/// An authenticated mailbox conversation.
///
/// Implementations must not flag messages as seen.
#[async_trait]
pub trait MailSession: Send {
    /// Ids of unseen messages, ascending.
    async fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError>;

    /// Full bytes of one message.
    async fn fetch(&mut self, id: &str) -> Result<RawMessage, MailboxError>;

    /// End the conversation. Failures are logged, never returned.
    async fn close(&mut self);
}
