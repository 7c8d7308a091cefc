//! In-process mock of the catalog, ledger and credential endpoints.
//!
//! Each test starts its own Axum server on a random port and inspects the
//! shared state afterwards.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const API_KEY: &str = "test-api-key";

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-api-key").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "missing api key"}))).into_response()
}

// ── Catalog collection ──────────────────────────────────────────────

/// One get-or-create collection keyed by a natural key.
pub struct Collection {
    key_field: &'static str,
    id_field: &'static str,
    /// Lookups answer `200 [..]` instead of a bare object / 404.
    array_lookup: bool,
    items: Mutex<Vec<(String, i64)>>,
    next_id: AtomicI64,
    pub gets: AtomicUsize,
    pub posts: AtomicUsize,
    /// Next create stores the item as if another writer won, then answers 409.
    pub race_next_create: AtomicBool,
    /// Every create answers 409 without storing anything.
    pub always_conflict: AtomicBool,
    /// Creates succeed but omit the id field.
    pub omit_id_on_create: AtomicBool,
    /// Lookups for this key answer 500.
    pub failing_key: Mutex<Option<String>>,
    /// Lookups answer `200` with an HTML maintenance page.
    pub html_lookup: AtomicBool,
}

impl Collection {
    pub fn new(key_field: &'static str, id_field: &'static str, array_lookup: bool) -> Arc<Self> {
        Arc::new(Self {
            key_field,
            id_field,
            array_lookup,
            items: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            gets: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
            race_next_create: AtomicBool::new(false),
            always_conflict: AtomicBool::new(false),
            omit_id_on_create: AtomicBool::new(false),
            failing_key: Mutex::new(None),
            html_lookup: AtomicBool::new(false),
        })
    }

    /// Store an item directly, returning its id.
    pub fn seed(&self, key: &str) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.items.lock().unwrap().push((key.to_string(), id));
        id
    }

    pub fn id_of(&self, key: &str) -> Option<i64> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, id)| *id)
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    fn item(&self, key: &str, id: Option<i64>) -> Value {
        let mut item = serde_json::Map::new();
        if let Some(id) = id {
            item.insert(self.id_field.to_string(), json!(id));
        }
        item.insert(self.key_field.to_string(), json!(key));
        Value::Object(item)
    }
}

async fn lookup(
    State(c): State<Arc<Collection>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    c.gets.fetch_add(1, Ordering::SeqCst);
    let key = query.get(c.key_field).cloned().unwrap_or_default();

    if c.failing_key.lock().unwrap().as_deref() == Some(key.as_str()) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    if c.html_lookup.load(Ordering::SeqCst) {
        return (StatusCode::OK, "<html>down for maintenance</html>").into_response();
    }

    match (c.id_of(&key), c.array_lookup) {
        (Some(id), true) => Json(json!([c.item(&key, Some(id))])).into_response(),
        (Some(id), false) => Json(c.item(&key, Some(id))).into_response(),
        (None, true) => Json(json!([])).into_response(),
        (None, false) => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response(),
    }
}

async fn create(
    State(c): State<Arc<Collection>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    c.posts.fetch_add(1, Ordering::SeqCst);
    let key = body[c.key_field].as_str().unwrap_or_default().to_string();
    let conflict = (StatusCode::CONFLICT, Json(json!({"error": "exists"}))).into_response();

    if c.always_conflict.load(Ordering::SeqCst) {
        return conflict;
    }
    if c.race_next_create.swap(false, Ordering::SeqCst) {
        c.seed(&key);
        return conflict;
    }
    if c.id_of(&key).is_some() {
        return conflict;
    }

    let id = c.seed(&key);
    let id = (!c.omit_id_on_create.load(Ordering::SeqCst)).then_some(id);
    (StatusCode::CREATED, Json(c.item(&key, id))).into_response()
}

// ── Ledger ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Ledger {
    pub records: Mutex<Vec<Value>>,
    /// Answer 422 instead of storing.
    pub reject: AtomicBool,
}

impl Ledger {
    pub fn records(&self) -> Vec<Value> {
        self.records.lock().unwrap().clone()
    }
}

async fn submit_record(
    State(ledger): State<Arc<Ledger>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if ledger.reject.load(Ordering::SeqCst) {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "invalid record"})))
            .into_response();
    }
    ledger.records.lock().unwrap().push(body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

// ── Credentials ─────────────────────────────────────────────────────

pub struct CredentialStore {
    pub reply: Mutex<(StatusCode, Value)>,
    pub requested_users: Mutex<Vec<String>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self {
            reply: Mutex::new((StatusCode::NOT_FOUND, json!({"error": "no credential"}))),
            requested_users: Mutex::new(Vec::new()),
        }
    }
}

impl CredentialStore {
    pub fn respond(&self, status: StatusCode, body: Value) {
        *self.reply.lock().unwrap() = (status, body);
    }
}

async fn fetch_credential(
    State(store): State<Arc<CredentialStore>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    store.requested_users.lock().unwrap().push(user_id);
    let (status, body) = store.reply.lock().unwrap().clone();
    (status, Json(body)).into_response()
}

// ── Server ──────────────────────────────────────────────────────────

pub struct MockCatalog {
    pub base: String,
    pub apps: Arc<Collection>,
    pub payment_methods: Arc<Collection>,
    pub ledger: Arc<Ledger>,
    pub credentials: Arc<CredentialStore>,
}

impl MockCatalog {
    /// Start an Axum server on a random port.
    pub async fn start() -> Self {
        let apps = Collection::new("email", "id_apps", false);
        let payment_methods = Collection::new("descricao", "id_forma_pagamento", true);
        let ledger = Arc::new(Ledger::default());
        let credentials = Arc::new(CredentialStore::default());

        let app = Router::new()
            .route("/apps", get(lookup).post(create).with_state(Arc::clone(&apps)))
            .route(
                "/payment-methods",
                get(lookup).post(create).with_state(Arc::clone(&payment_methods)),
            )
            .route("/records", post(submit_record).with_state(Arc::clone(&ledger)))
            .route(
                "/users/{id}/imap-credentials",
                get(fetch_credential).with_state(Arc::clone(&credentials)),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting connections.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base: format!("http://127.0.0.1:{port}"),
            apps,
            payment_methods,
            ledger,
            credentials,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn apps_url(&self) -> String {
        self.url("/apps")
    }

    pub fn payment_methods_url(&self) -> String {
        self.url("/payment-methods")
    }

    pub fn records_url(&self) -> String {
        self.url("/records")
    }

    pub fn credentials_template(&self) -> String {
        self.url("/users/{id_usuario}/imap-credentials")
    }
}

/// A port nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/apps")
}
