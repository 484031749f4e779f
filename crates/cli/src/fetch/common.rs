//! Shared infrastructure for the remote adapters.
//!
//! Each adapter (company lookup, folder store, sheets) reuses:
//! - `FetchClient`: HTTP client with retry / backoff / error classification
//! - `FetchError`: classified failure, convertible to a resolver error
//!   (for the passes) or a `CliError` (for publication)
//! - `resolve_token`: flag > env > error
//!
//! # Classification
//!
//! | HTTP            | Kind          | Retried per request | Exit |
//! |-----------------|---------------|---------------------|------|
//! | 401, 403        | `Auth`        | no                  | 51   |
//! | 400             | `Rejected`    | no                  | 52   |
//! | other 4xx       | `Upstream`    | no                  | 54   |
//! | 429             | `RateLimited` | yes, honors `Retry-After` | 53 |
//! | 5xx, network    | `Unavailable` | yes                 | 54   |
//!
//! `RateLimited` and `Unavailable` that survive the per-request retries
//! become transient resolver errors, so the pass can retry its whole batch.
//! The lookup and listing adapters treat `Upstream` (including an
//! undecodable body) as "no data" for that one record.

use std::fmt;
use std::time::Duration;

use iprtrack_recon::{CancelToken, RetryDecision, RetryError, RetryPolicy, ResolveError};
use serde_json::Value;

use crate::exit_codes;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub(super) const USER_AGENT: &str = concat!("iprtrack/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(30);

// ── FetchError ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Auth,
    Rejected,
    Upstream,
    RateLimited,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// From a `Retry-After` header on 429.
    pub retry_after: Option<Duration>,
}

impl FetchError {
    fn new(kind: FetchErrorKind, message: String) -> Self {
        Self { kind, message, retry_after: None }
    }

    fn retry_decision(&self) -> RetryDecision {
        match (self.kind, self.retry_after) {
            (FetchErrorKind::RateLimited, Some(wait)) => RetryDecision::RetryAfter(wait),
            (FetchErrorKind::RateLimited, None) | (FetchErrorKind::Unavailable, _) => {
                RetryDecision::Retry
            }
            _ => RetryDecision::Stop,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FetchError {}

impl From<FetchError> for ResolveError {
    fn from(err: FetchError) -> Self {
        match err.kind {
            FetchErrorKind::Auth => ResolveError::auth(err.message),
            FetchErrorKind::Rejected => ResolveError::rejected(err.message),
            FetchErrorKind::Upstream => ResolveError::fatal(err.message),
            FetchErrorKind::RateLimited | FetchErrorKind::Unavailable => {
                ResolveError::Transient { message: err.message, retry_after: err.retry_after }
            }
        }
    }
}

impl From<FetchError> for CliError {
    fn from(err: FetchError) -> Self {
        let code = match err.kind {
            FetchErrorKind::Auth => exit_codes::EXIT_FETCH_AUTH,
            FetchErrorKind::Rejected => exit_codes::EXIT_FETCH_VALIDATION,
            FetchErrorKind::RateLimited => exit_codes::EXIT_FETCH_RATE_LIMIT,
            FetchErrorKind::Upstream | FetchErrorKind::Unavailable => {
                exit_codes::EXIT_FETCH_UPSTREAM
            }
        };
        CliError::new(code, err.message)
    }
}

// ── FetchClient ─────────────────────────────────────────────────────

/// Shared HTTP client that handles retry, backoff, and error classification.
///
/// Adapters own their token, base URL, and auth header. They pass a
/// request-building closure to [`FetchClient::request_json`], which handles
/// the retry loop and classifies HTTP status codes.
pub(super) struct FetchClient {
    pub(super) http: reqwest::blocking::Client,
    source_name: String,
    error_extractor: fn(&Value, u16) -> String,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl FetchClient {
    pub(super) fn new(
        source_name: &str,
        error_extractor: fn(&Value, u16) -> String,
        retry: RetryPolicy,
        cancel: CancelToken,
    ) -> Result<Self, CliError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError::new(exit_codes::EXIT_ERROR, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            source_name: source_name.to_string(),
            error_extractor,
            retry,
            cancel,
        })
    }

    /// Send with retry + exponential backoff and parse the JSON body.
    ///
    /// `build_request` is called once per attempt. It receives the
    /// underlying `reqwest::blocking::Client` and must return a fully
    /// configured `RequestBuilder` (URL, auth, headers, query, body).
    pub(super) fn request_json(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<Value, FetchError> {
        self.request_json_passing(&[], build_request)
    }

    /// Like `request_json`, but error statuses listed in `passthrough`
    /// return their JSON body instead of failing. The folder store answers
    /// a missing path with 404 and an `{error: …}` body.
    pub(super) fn request_json_passing(
        &self,
        passthrough: &[u16],
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<Value, FetchError> {
        let label = format!("{} request", self.source_name);
        self.retry
            .run(
                &label,
                &self.cancel,
                |_| self.attempt(passthrough, &build_request),
                FetchError::retry_decision,
            )
            .map_err(|e| match e {
                RetryError::Stopped(err) => err,
                RetryError::GaveUp { attempts, last } => {
                    let what = match last.kind {
                        FetchErrorKind::RateLimited => "rate limited",
                        _ => "upstream error",
                    };
                    FetchError {
                        message: format!(
                            "{} {} after {} attempts ({})",
                            self.source_name, what, attempts, last.message,
                        ),
                        ..last
                    }
                }
                RetryError::Cancelled => FetchError::new(
                    FetchErrorKind::Unavailable,
                    format!("{} request cancelled", self.source_name),
                ),
            })
    }

    fn attempt(
        &self,
        passthrough: &[u16],
        build_request: &impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<Value, FetchError> {
        let resp = build_request(&self.http).send().map_err(|e| {
            FetchError::new(
                FetchErrorKind::Unavailable,
                format!("{} request failed: {}", self.source_name, e),
            )
        })?;
        let status = resp.status().as_u16();

        if status >= 400 && !passthrough.contains(&status) {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body: Value = resp.json().unwrap_or(Value::Null);
            let detail = (self.error_extractor)(&body, status);
            let (kind, message) = match status {
                401 | 403 => (
                    FetchErrorKind::Auth,
                    format!("{} auth failed ({}): {}", self.source_name, status, detail),
                ),
                400 => (
                    FetchErrorKind::Rejected,
                    format!("{} request rejected ({}): {}", self.source_name, status, detail),
                ),
                429 => (
                    FetchErrorKind::RateLimited,
                    format!("{} rate limited ({}): {}", self.source_name, status, detail),
                ),
                s if s >= 500 => (
                    FetchErrorKind::Unavailable,
                    format!("{} upstream error ({}): {}", self.source_name, status, detail),
                ),
                _ => (
                    FetchErrorKind::Upstream,
                    format!("{} error ({}): {}", self.source_name, status, detail),
                ),
            };
            return Err(FetchError { kind, message, retry_after });
        }

        // Read as text first: some services prefix a BOM, some answer with
        // an empty body.
        let text = resp.text().map_err(|e| {
            FetchError::new(
                FetchErrorKind::Unavailable,
                format!("failed to read {} response body: {}", self.source_name, e),
            )
        })?;
        let trimmed = text.trim_start_matches('\u{feff}').trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(trimmed).map_err(|e| {
            FetchError::new(
                FetchErrorKind::Upstream,
                format!(
                    "failed to parse {} JSON response: {} (body: {})",
                    self.source_name,
                    e,
                    trimmed.chars().take(200).collect::<String>(),
                ),
            )
        })
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Resolve a token: flag value > environment variable > error.
pub fn resolve_token(
    flag: Option<&str>,
    source_name: &str,
    flag_name: &str,
    env_var: &str,
) -> Result<String, CliError> {
    let missing = || {
        CliError::new(
            exit_codes::EXIT_FETCH_NOT_AUTH,
            format!("missing {} token (use {} or set {})", source_name, flag_name, env_var),
        )
    };

    if let Some(token) = flag {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(missing());
        }
        return Ok(trimmed.to_string());
    }

    if let Ok(token) = std::env::var(env_var) {
        let trimmed = token.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    Err(missing())
}

/// Message from a `{message: …}` / `{error: {message: …}}` /
/// `{description: …}` body, else the status.
pub(super) fn extract_message(body: &Value, status: u16) -> String {
    body["message"]
        .as_str()
        .or_else(|| body["error"]["message"].as_str())
        .or_else(|| body["description"].as_str())
        .or_else(|| body["error"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

#[cfg(test)]
pub(super) fn test_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: 0.0,
    }
}
