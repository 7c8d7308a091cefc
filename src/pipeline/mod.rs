//! Receipt processing pipeline.
//!
//! Each unseen id is fetched, then flows through:
//! 1. `parse_message()`: headers and primary body
//! 2. Allowlist gate and app get-or-create
//! 3. `PaymentClassifier::classify()` and `extract_value_text()`: pure heuristics
//! 4. Payment-method get-or-create
//! 5. `RecordSubmitter::submit()`: one ledger POST, no retry
//!
//! Messages are never acknowledged on the mailbox, so reprocessing across
//! cycles is expected.

pub mod classifier;
pub mod orchestrator;
pub mod senders;
pub mod types;
pub mod value;

pub use classifier::{PaymentClassifier, Surface};
pub use orchestrator::PipelineOrchestrator;
pub use senders::KnownSender;
pub use types::{CycleReport, Outcome, PaymentInference, SkipReason};
pub use value::{extract_amount, extract_value_text, parse_amount};
