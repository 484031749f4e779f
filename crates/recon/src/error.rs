use std::fmt;
use std::time::Duration;

use crate::retry::{RetryDecision, RetryError};

/// Failure of a single remote lookup (status or folder listing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Network error, 5xx, or rate limit. Worth retrying the batch.
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },
    /// Retrying won't help.
    Fatal { kind: FatalKind, message: String },
}

/// Why a lookup failed for good. Lets the caller pick an exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// Credentials missing or refused.
    Auth,
    /// The request itself was rejected.
    Rejected,
    /// Anything else: other 4xx, undecodable body.
    Upstream,
}

impl ResolveError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            kind: FatalKind::Upstream,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Fatal {
            kind: FatalKind::Auth,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Fatal {
            kind: FatalKind::Rejected,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            Self::Transient {
                retry_after: Some(wait),
                ..
            } => RetryDecision::RetryAfter(*wait),
            Self::Transient { .. } => RetryDecision::Retry,
            Self::Fatal { .. } => RetryDecision::Stop,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient { message, .. } => write!(f, "transient: {message}"),
            Self::Fatal { message, .. } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ResolveError {}

#[derive(Debug)]
pub enum ReconError {
    /// Two registry rows share a tax id.
    DuplicateTaxId { tax_id: String },
    /// Two registry rows share a sequence number.
    DuplicateSequence { sequence_number: u32 },
    /// A pass failed with a non-retryable resolver error.
    Resolver { pass: &'static str, source: ResolveError },
    /// A pass kept failing until the retry policy gave up.
    GaveUp {
        pass: &'static str,
        attempts: u32,
        last: ResolveError,
    },
    /// A pass was cancelled between attempts.
    Cancelled { pass: &'static str },
}

impl ReconError {
    /// Map the terminal state of a batch retry into a pass failure.
    pub fn from_retry(pass: &'static str, err: RetryError<ResolveError>) -> Self {
        match err {
            RetryError::Stopped(source) => Self::Resolver { pass, source },
            RetryError::GaveUp { attempts, last } => Self::GaveUp {
                pass,
                attempts,
                last,
            },
            RetryError::Cancelled => Self::Cancelled { pass },
        }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateTaxId { tax_id } => {
                write!(f, "duplicate tax id in registry: {tax_id}")
            }
            Self::DuplicateSequence { sequence_number } => {
                write!(f, "duplicate sequence number in registry: {sequence_number}")
            }
            Self::Resolver { pass, source } => write!(f, "{pass} pass failed: {source}"),
            Self::GaveUp {
                pass,
                attempts,
                last,
            } => write!(f, "{pass} pass gave up after {attempts} attempt(s): {last}"),
            Self::Cancelled { pass } => write!(f, "{pass} pass cancelled"),
        }
    }
}

impl std::error::Error for ReconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resolver { source, .. } => Some(source),
            Self::GaveUp { last, .. } => Some(last),
            _ => None,
        }
    }
}
