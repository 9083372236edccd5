//! Blocking HTTP client for the fleet-management (SDS) REST API.
//!
//! - Uses `ureq` (no async) and the models in `crate::models::sds`.
//! - Covers the GET endpoints the sync jobs need: customers, devices (with
//!   extended fields), monitors, meters and consumables.
//!
//! Authentication
//! - `POST /login` with the encoded key as Basic credentials returns a bearer
//!   token. The token is reused until the API answers 401, then renewed once.
//!
//! Retries
//! - Transport errors, 429 and 5xx responses are retried with exponential
//!   backoff plus jitter, up to `max_retries` extra attempts.

use crate::models::sds::*;
use chrono::NaiveDate;
use http::StatusCode;
use log::{debug, warn};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::thread;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_MS: u64 = 30_000;
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug)]
pub enum SdsClientError {
    Transport(String),
    Http { status: u16, message: String },
    Json(serde_path_to_error::Error<serde_json::Error>),
    Auth(String),
}

impl core::fmt::Display for SdsClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SdsClientError::Transport(s) => write!(f, "transport error: {}", s),
            SdsClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            SdsClientError::Json(e) => write!(f, "json error at {}: {}", e.path(), e.inner()),
            SdsClientError::Auth(e) => write!(f, "auth error: {}", e),
        }
    }
}

impl std::error::Error for SdsClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SdsClientError::Json(e) => Some(e.inner()),
            _ => None,
        }
    }
}

impl From<serde_path_to_error::Error<serde_json::Error>> for SdsClientError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        SdsClientError::Json(value)
    }
}

type RawResponse = Result<http::Response<ureq::Body>, ureq::Error>;

pub struct SdsClient {
    agent: ureq::Agent,
    base_url: String,
    encoded_key: String,
    max_retries: u32,
    bearer: RefCell<Option<String>>,
}

impl SdsClient {
    /// Build the client and log in immediately so bad credentials fail fast.
    pub fn new(
        base_url: impl Into<String>,
        encoded_key: impl Into<String>,
        max_retries: u32,
    ) -> Result<Self, SdsClientError> {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();

        let client = SdsClient {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            encoded_key: encoded_key.into(),
            max_retries,
            bearer: RefCell::new(None),
        };
        client.bearer()?;
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn login(&self) -> Result<String, SdsClientError> {
        let url = self.url("/login");
        let basic = format!("Basic {}", self.encoded_key);
        let (status, body) = self.with_retries("/login", || {
            self.agent
                .post(&url)
                .header("Authorization", basic.as_str())
                .header("Content-Type", "application/json")
                .send_empty()
        })?;
        if !status.is_success() {
            return Err(SdsClientError::Auth(format!(
                "http {}: {}",
                status.as_u16(),
                truncate_body(&body)
            )));
        }
        debug!("Obtained API bearer token");
        parse_token(&body)
    }

    fn bearer(&self) -> Result<String, SdsClientError> {
        if let Some(token) = self.bearer.borrow().as_ref() {
            return Ok(token.clone());
        }
        let token = self.login()?;
        *self.bearer.borrow_mut() = Some(token.clone());
        Ok(token)
    }

    /// Send with retries. Returns the final status and body; only transport
    /// failures that outlast the retries are errors here.
    fn with_retries(
        &self,
        what: &str,
        send: impl Fn() -> RawResponse,
    ) -> Result<(StatusCode, String), SdsClientError> {
        let mut attempt = 0u32;
        loop {
            let outcome = match send() {
                Ok(mut resp) => {
                    let status = resp.status();
                    resp.body_mut()
                        .read_to_string()
                        .map(|body| (status, body))
                        .map_err(|e| SdsClientError::Transport(e.to_string()))
                }
                Err(e) => Err(SdsClientError::Transport(e.to_string())),
            };

            let retryable = match &outcome {
                Ok((status, _)) => is_retryable_status(*status),
                Err(SdsClientError::Transport(_)) => true,
                Err(_) => false,
            };
            if !retryable || attempt >= self.max_retries {
                return outcome;
            }

            attempt += 1;
            let jitter = rand::rng().random_range(0..=RETRY_BASE_DELAY_MS);
            let delay = backoff_delay(attempt, jitter);
            match &outcome {
                Ok((status, _)) => warn!(
                    "{} answered {}; retry {}/{} in {}ms",
                    what,
                    status.as_u16(),
                    attempt,
                    self.max_retries,
                    delay.as_millis()
                ),
                Err(e) => warn!(
                    "{} failed ({}); retry {}/{} in {}ms",
                    what,
                    e,
                    attempt,
                    self.max_retries,
                    delay.as_millis()
                ),
            }
            thread::sleep(delay);
        }
    }

    fn get_body(&self, path: &str, query: &[(&str, String)]) -> Result<String, SdsClientError> {
        let url = self.url(path);
        let mut renewed = false;
        loop {
            let auth = format!("Bearer {}", self.bearer()?);
            let (status, body) = self.with_retries(path, || {
                let mut req = self
                    .agent
                    .get(&url)
                    .header("Authorization", auth.as_str())
                    .header("Accept", "application/json");
                for (k, v) in query {
                    req = req.query(*k, v);
                }
                req.call()
            })?;

            if status == StatusCode::UNAUTHORIZED && !renewed {
                debug!("{} answered 401; renewing bearer token", path);
                self.bearer.replace(None);
                renewed = true;
                continue;
            }
            if !status.is_success() {
                return Err(SdsClientError::Http {
                    status: status.as_u16(),
                    message: truncate_body(&body),
                });
            }
            return Ok(body);
        }
    }

    fn get_list<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<T>, SdsClientError> {
        let body = self.get_body(path, query)?;
        parse_list(&body)
    }

    pub fn get_customers(&self) -> Result<Vec<Customer>, SdsClientError> {
        self.get_list("/api/customers", &[])
    }

    pub fn get_devices(&self, customer_id: &CustomerId) -> Result<Vec<Device>, SdsClientError> {
        self.get_list(
            "/api/devices",
            &[
                ("customerId", customer_id.0.clone()),
                ("includeExtendedFields", "true".to_string()),
            ],
        )
    }

    pub fn get_monitors(&self, customer_id: &CustomerId) -> Result<Vec<Monitor>, SdsClientError> {
        self.get_list("/api/monitors", &[("customerId", customer_id.0.clone())])
    }

    pub fn get_meters(
        &self,
        customer_id: &CustomerId,
        billing_date: Option<NaiveDate>,
    ) -> Result<Vec<MeterReading>, SdsClientError> {
        let mut q = Vec::new();
        if let Some(d) = billing_date {
            q.push(("billingDate", d.format("%Y-%m-%d").to_string()));
        }
        self.get_list(&format!("/api/devices/meters/{}", customer_id.0), &q)
    }

    pub fn get_consumables(&self, customer_id: &CustomerId) -> Result<Vec<Consumable>, SdsClientError> {
        self.get_list("/api/consumables", &[("customerId", customer_id.0.clone())])
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Exponential backoff for the given retry number (1-based), capped, plus jitter.
fn backoff_delay(attempt: u32, jitter_ms: u64) -> Duration {
    let exp = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    Duration::from_millis(exp.min(RETRY_MAX_DELAY_MS) + jitter_ms)
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<no body>".to_string();
    }
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

fn parse_token(body: &str) -> Result<String, SdsClientError> {
    let resp: LoginResponse = serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_str(body))?;
    resp.access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SdsClientError::Auth("login response without access_token".to_string()))
}

/// Decode a list endpoint body. The API sometimes answers a lone object
/// instead of an array; records that do not fit the model are skipped.
fn parse_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, SdsClientError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_str(body))?;
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        single => vec![single],
    };

    let total = items.len();
    let parsed: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_path_to_error::deserialize::<_, T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed record #{} at {}: {}", index, e.path(), e.inner());
                None
            }
        })
        .collect();
    if parsed.len() < total {
        debug!("Parsed {} of {} record(s)", parsed.len(), total);
    }
    Ok(parsed)
}
