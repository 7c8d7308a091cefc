//! HTTP plumbing shared by the catalog resolver, the ledger submitter and
//! the credential fetch.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::catalog::entities::{StoredMailCredential, decode};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, CredentialError};

/// Longest response excerpt carried in errors and logs.
const BODY_EXCERPT_CHARS: usize = 200;

/// Status and decoded body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct Reply {
    pub url: String,
    pub status: u16,
    pub text: String,
    /// `None` when a non-blank body failed to parse as JSON.
    body: Option<serde_json::Value>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decoded JSON body. A blank body reads as `Null`.
    pub fn json(&self) -> Result<&serde_json::Value, CatalogError> {
        self.body
            .as_ref()
            .ok_or_else(|| CatalogError::InvalidResponse {
                url: self.url.clone(),
                reason: format!("status {} body is not JSON: {}", self.status, self.excerpt()),
            })
    }

    pub fn excerpt(&self) -> String {
        excerpt(&self.text)
    }
}

/// REST client carrying the shared-secret header and a fixed timeout.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
}

impl CatalogClient {
    pub fn new(api_key: &SecretString, timeout: Duration) -> Result<Self, CatalogError> {
        let mut key = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| CatalogError::Client(format!("invalid API key header: {e}")))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Client(e.to_string()))?;
        Ok(Self { http })
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        Self::new(&config.api_key, config.timeout)
    }

    /// GET with optional query parameters.
    pub async fn get<Q>(&self, url: &str, query: Option<&Q>) -> Result<Reply, CatalogError>
    where
        Q: Serialize + ?Sized,
    {
        let mut request = self.http.get(url);
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await.map_err(|e| CatalogError::Transport {
            method: "GET",
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        read_reply("GET", url, response).await
    }

    /// POST a JSON body.
    pub async fn post<B>(&self, url: &str, body: &B) -> Result<Reply, CatalogError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CatalogError::Transport {
                method: "POST",
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        read_reply("POST", url, response).await
    }

    /// Fetch the encrypted IMAP credential stored for `user_id`.
    ///
    /// `{id_usuario}` (or `{user_id}`) in the template is replaced with the id.
    /// Returns `(login, hex(iv):hex(ciphertext))`.
    pub async fn fetch_stored_credential(
        &self,
        url_template: &str,
        user_id: &str,
    ) -> Result<(String, String), CredentialError> {
        let url = credential_url(url_template, user_id);
        debug!(url = %url, "Fetching stored IMAP credential");

        let reply = self
            .get::<()>(&url, None)
            .await
            .map_err(|e| CredentialError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if !reply.is_success() {
            return Err(CredentialError::Fetch {
                url,
                reason: format!("status {}: {}", reply.status, reply.excerpt()),
            });
        }

        let body = reply.json().map_err(|e| CredentialError::Fetch {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let stored: StoredMailCredential = decode(body).map_err(|reason| CredentialError::Fetch {
            url: url.clone(),
            reason,
        })?;
        let login = stored
            .email_login
            .filter(|v| !v.trim().is_empty())
            .ok_or(CredentialError::MissingField("email_login"))?;
        let encrypted = stored
            .encrypted_password_with_iv
            .filter(|v| !v.trim().is_empty())
            .ok_or(CredentialError::MissingField("encrypted_password_with_iv"))?;
        Ok((login, encrypted))
    }
}

pub fn credential_url(template: &str, user_id: &str) -> String {
    template
        .replace("{id_usuario}", user_id)
        .replace("{user_id}", user_id)
}

async fn read_reply(
    method: &'static str,
    url: &str,
    response: reqwest::Response,
) -> Result<Reply, CatalogError> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(|e| CatalogError::Transport {
        method,
        url: url.to_string(),
        reason: format!("reading body: {e}"),
    })?;
    let body = if text.trim().is_empty() {
        Some(serde_json::Value::Null)
    } else {
        serde_json::from_str(&text).ok()
    };
    debug!(method, url, status, "Catalog reply");
    Ok(Reply {
        url: url.to_string(),
        status,
        text,
        body,
    })
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(BODY_EXCERPT_CHARS).collect();
    if text.chars().count() > BODY_EXCERPT_CHARS {
        out.push('…');
    }
    out
}
