//! Receipt Sync: turns ride-hailing receipt emails into ledger records.

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod error;
pub mod mail;
pub mod pipeline;
