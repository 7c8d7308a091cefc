//! Mail access and parsing.
//!
//! Only the two mailbox operations the pipeline needs are implemented:
//! search for unseen messages and fetch one by id. Messages are never
//! marked seen, so every cycle reprocesses whatever is still unread.

pub mod allowlist;
pub mod imap;
pub mod mailbox;
pub mod parser;

pub use allowlist::{SenderAllowlist, SenderRule};
pub use imap::ImapMailbox;
pub use mailbox::{MailSession, Mailbox, RawMessage};
pub use parser::{BodyKind, ParsedMessage, parse_message, strip_html};
