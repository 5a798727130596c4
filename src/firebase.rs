//! Firebase Realtime Database REST client.
//!
//! Collections are addressed as `<database_url>/<collection>.json`. Appends
//! use `POST`, which makes the database generate a chronologically ordered
//! push key; reads use `GET` on the whole collection.

use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Default timeout for database requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used specifically for the lightweight connectivity test.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the database URL:
/// - ensure a scheme is present (https, or http for localhost emulators)
/// - strip trailing slashes
/// - strip a trailing `.json` left over from a copied REST URL
pub fn normalize_database_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with(".json") {
        url.truncate(url.len() - 5);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message. The request URL
/// carries the secret in its query, so it is stripped from the error and only
/// the base URL is shown.
fn friendly_error(url: &str, err: reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach database at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid database URL: {url}");
    }
    format!(
        "Network error communicating with {url}: {}",
        err.without_url()
    )
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Database secret is invalid or expired".to_string(),
        403 => "Permission denied by database rules".to_string(),
        404 => "Database not found".to_string(),
        423 => "Database is locked".to_string(),
        s if s >= 500 => format!("Database server error (HTTP {s})"),
        s => format!("Unexpected response from database (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Extract the generated key from a push response (`{"name": "-N..."}`).
fn parse_push_response(body: &Value) -> Result<String, String> {
    body.get("name")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Push response did not include a key: {body}"))
}

/// Turn a collection body into `(key, payload)` pairs ordered by key.
///
/// An absent collection comes back as `null` and yields no pairs.
fn parse_collection(body: Value) -> Result<Vec<(String, Value)>, String> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => {
            let mut pairs: Vec<(String, Value)> = map.into_iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(pairs)
        }
        other => Err(format!(
            "Expected an object for collection, got {}",
            match other {
                Value::Array(_) => "an array",
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                _ => "a boolean",
            }
        )),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Result of a connectivity test.
#[derive(serde::Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct FirebaseClient {
    base: String,
    secret: Option<Zeroizing<String>>,
    http: Client,
}

impl FirebaseClient {
    pub fn new(database_url: &str, secret: Option<Zeroizing<String>>) -> Result<Self, String> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            base: normalize_database_url(database_url),
            secret,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// REST URL of `collection`. Query parameters are added by the caller.
    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}.json", self.base, collection.trim_matches('/'))
    }

    fn auth_query(&self) -> Vec<(&'static str, &str)> {
        self.secret
            .as_ref()
            .map(|s| vec![("auth", s.as_str())])
            .unwrap_or_default()
    }

    async fn read_body(&self, resp: reqwest::Response) -> Result<Value, String> {
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| format!("Failed to read database response: {}", e.without_url()))?;
        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&body_text)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));
            return Err(match detail {
                Some(d) => format!("{} (HTTP {}): {d}", status_error(status), status.as_u16()),
                None => format!("{} (HTTP {})", status_error(status), status.as_u16()),
            });
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| format!("Invalid JSON from database: {e}"))
    }

    /// Append `payload` to `collection` and return the generated key.
    pub async fn push(&self, collection: &str, payload: &Map<String, Value>) -> Result<String, String> {
        let url = self.collection_url(collection);
        debug!(collection, "POST record");
        let resp = self
            .http
            .post(&url)
            .query(&self.auth_query())
            .json(payload)
            .send()
            .await
            .map_err(|e| friendly_error(&self.base, e))?;
        let body = self.read_body(resp).await?;
        parse_push_response(&body)
    }

    /// Read every `(key, payload)` pair of `collection`.
    pub async fn fetch(&self, collection: &str) -> Result<Vec<(String, Value)>, String> {
        let url = self.collection_url(collection);
        debug!(collection, "GET collection");
        let resp = self
            .http
            .get(&url)
            .query(&self.auth_query())
            .send()
            .await
            .map_err(|e| friendly_error(&self.base, e))?;
        let body = self.read_body(resp).await?;
        parse_collection(body)
    }

    /// Shallow read of the database root, used to verify URL and secret.
    pub async fn test_connectivity(&self) -> ConnectivityResult {
        let url = format!("{}/.json", self.base);
        let mut query = self.auth_query();
        query.push(("shallow", "true"));
        let start = Instant::now();

        let resp = match self
            .http
            .get(&url)
            .query(&query)
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return ConnectivityResult {
                    success: false,
                    latency_ms: None,
                    error: Some(friendly_error(&self.base, e)),
                };
            }
        };

        let latency = start.elapsed().as_millis() as u64;
        let status = resp.status();
        if status.is_success() {
            info!(latency_ms = latency, "connectivity test passed");
            ConnectivityResult {
                success: true,
                latency_ms: Some(latency),
                error: None,
            }
        } else {
            ConnectivityResult {
                success: false,
                latency_ms: Some(latency),
                error: Some(status_error(status)),
            }
        }
    }
}
