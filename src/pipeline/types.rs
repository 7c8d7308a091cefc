//! Shared types for the receipt pipeline.

use std::fmt;

use serde::Serialize;

/// Payment-method label and card digits inferred from a receipt body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInference {
    pub label: String,
    pub card_last4: String,
}

/// Why a message was passed over without contacting the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SenderNotAllowed,
    EmptyBody,
    MissingAmount,
    MissingDate,
}

impl SkipReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::SenderNotAllowed => "sender not allowed",
            Self::EmptyBody => "empty body",
            Self::MissingAmount => "missing amount",
            Self::MissingDate => "missing date",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of processing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Submitted,
    Skipped(SkipReason),
}

/// Counters for one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Ids returned by the unseen search.
    pub seen: usize,
    pub submitted: usize,
    pub skipped: usize,
    /// Messages that could not be fetched or hit a catalog or ledger error.
    pub failed: usize,
}

impl CycleReport {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Submitted => self.submitted += 1,
            Outcome::Skipped(_) => self.skipped += 1,
        }
    }
}
