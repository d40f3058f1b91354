//! Error and retry-policy types for the notification domain.
//!
//! [`ValidationError`] covers malformed inbound events; they are logged and
//! dropped, never retried. [`DeliveryError`] is what the chat backend port
//! surfaces once it has given up on a message.
//!
//! [`RetryPolicy`] is the cross-cutting piece: infrastructure error types
//! produce one so the retry loop can decide whether another attempt is safe.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable` errors: network timeouts, 5xx responses, rate limits.
/// - `NonRetryable` errors: bad credentials, malformed payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from a `Retry-After` response header).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Inbound validation
// ---------------------------------------------------------------------------

/// A raw event payload could not be turned into a typed [`crate::Event`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The event-kind tag is not one of `deploy`, `pr_opened`, `pr_merged`.
    #[error("unknown event kind '{tag}'")]
    UnknownKind {
        /// The tag as received.
        tag: String,
    },

    /// The payload body is not valid JSON.
    #[error("payload is not valid JSON: {message}")]
    MalformedJson {
        /// Parser diagnostic.
        message: String,
    },

    /// The payload is valid JSON but not an object.
    #[error("payload must be a JSON object")]
    NotAnObject,

    /// A required field is absent, null, or empty.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Field name as it appears in the payload.
        field: &'static str,
    },

    /// A field is present but its value is unusable.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name as it appears in the payload.
        field: &'static str,
        /// What is wrong with the value.
        reason: String,
    },
}

impl ValidationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Why a message could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    /// The backend rejected the credential. Not retryable.
    Auth,
    /// The backend rejected the payload or destination. Not retryable.
    BadRequest,
    /// Transient failures persisted until the attempt budget ran out.
    Unavailable,
}

impl DeliveryErrorKind {
    /// Returns the wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryErrorKind::Auth => "auth",
            DeliveryErrorKind::BadRequest => "bad_request",
            DeliveryErrorKind::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal delivery failure reported by a [`crate::ChatBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery failed ({kind}): {detail}")]
pub struct DeliveryError {
    /// Failure category.
    pub kind: DeliveryErrorKind,
    /// Backend-specific detail (HTTP status, API error code, transport error).
    pub detail: String,
}

impl DeliveryError {
    /// Builds an [`DeliveryErrorKind::Auth`] error.
    pub fn auth(detail: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::Auth,
            detail: detail.into(),
        }
    }

    /// Builds a [`DeliveryErrorKind::BadRequest`] error.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::BadRequest,
            detail: detail.into(),
        }
    }

    /// Builds a [`DeliveryErrorKind::Unavailable`] error.
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::Unavailable,
            detail: detail.into(),
        }
    }
}
