//! Remote catalog (apps, payment methods), ledger and credential endpoints.

pub mod client;
pub mod entities;
pub mod resolver;
pub mod submitter;

pub use client::{CatalogClient, Reply};
pub use entities::{
    App, AppLookup, CatalogEntity, EntityId, ExpenseRecord, NewApp, NewPaymentMethod,
    PaymentMethod, PaymentMethodLookup,
};
pub use resolver::EntityResolver;
pub use submitter::RecordSubmitter;
