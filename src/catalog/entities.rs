//! Request/response shapes for each catalog endpoint.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Opaque identifier assigned by the catalog (number or string on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(serde_json::Value);

impl EntityId {
    /// Accept a JSON scalar as an id; `null`, objects and arrays are not ids.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(_) => Some(Self(value.clone())),
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(Self(value.clone())),
            _ => None,
        }
    }

    /// Id from configuration text: numeric text becomes a JSON number.
    pub fn from_config(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) => Self(serde_json::Value::from(n)),
            Err(_) => Self(serde_json::Value::from(raw)),
        }
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(serde_json::Value::from(value))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            serde_json::Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// A catalog collection that supports lookup-by-natural-key and creation.
pub trait CatalogEntity {
    /// Name used in logs and errors.
    const NAME: &'static str;
    /// Field carrying the id in lookup and creation responses.
    const ID_FIELD: &'static str;
    /// Query parameters for the GET lookup.
    type Lookup: Serialize + fmt::Debug + Send + Sync;
    /// JSON body for the POST creation.
    type Create: Serialize + fmt::Debug + Send + Sync;
}

/// Pull the id field out of a catalog response body.
///
/// Objects are read directly; arrays use their first element.
pub fn extract_id(body: &serde_json::Value, field: &str) -> Option<EntityId> {
    let item = match body {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    item.as_object()?.get(field).and_then(EntityId::from_json)
}

// ── Apps ────────────────────────────────────────────────────────────

/// Originating app, keyed by sender address.
#[derive(Debug, Clone, Copy)]
pub struct App;

#[derive(Debug, Clone, Serialize)]
pub struct AppLookup {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewApp {
    pub email: String,
    #[serde(rename = "nome_apps")]
    pub name: String,
}

impl NewApp {
    /// Default app name derived from the sender's local part.
    pub fn for_sender(sender: &str) -> Self {
        let local = sender.split('@').next().unwrap_or(sender);
        Self {
            email: sender.to_string(),
            name: format!("App_{local}"),
        }
    }
}

impl CatalogEntity for App {
    const NAME: &'static str = "app";
    const ID_FIELD: &'static str = "id_apps";
    type Lookup = AppLookup;
    type Create = NewApp;
}

// ── Payment methods ─────────────────────────────────────────────────

/// Payment method, keyed by its description label.
#[derive(Debug, Clone, Copy)]
pub struct PaymentMethod;

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodLookup {
    #[serde(rename = "descricao")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPaymentMethod {
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "bandeira")]
    pub brand: String,
    #[serde(rename = "ativo")]
    pub active: bool,
}

impl NewPaymentMethod {
    pub fn for_label(label: &str) -> Self {
        Self {
            description: label.to_string(),
            brand: label.to_string(),
            active: true,
        }
    }
}

impl CatalogEntity for PaymentMethod {
    const NAME: &'static str = "payment method";
    const ID_FIELD: &'static str = "id_forma_pagamento";
    type Lookup = PaymentMethodLookup;
    type Create = NewPaymentMethod;
}

// ── Ledger record ───────────────────────────────────────────────────

/// Fully formed expense record, serialized with the ledger's wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    #[serde(rename = "data")]
    pub date: NaiveDate,
    #[serde(rename = "valor", with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "cartao")]
    pub card_last4: String,
    #[serde(rename = "id_forma_pagamento")]
    pub payment_method_id: EntityId,
    #[serde(rename = "id_apps")]
    pub app_id: EntityId,
    #[serde(rename = "id_usuario")]
    pub user_id: EntityId,
}

// ── Credentials ─────────────────────────────────────────────────────

/// Response of the per-user IMAP credential endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredMailCredential {
    #[serde(default)]
    pub email_login: Option<String>,
    #[serde(default)]
    pub encrypted_password_with_iv: Option<String>,
}

/// Decode a JSON body into `T`, reporting the error as text.
pub(crate) fn decode<T: DeserializeOwned>(body: &serde_json::Value) -> Result<T, String> {
    T::deserialize(body).map_err(|e| e.to_string())
}
