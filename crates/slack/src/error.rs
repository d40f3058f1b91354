//! Per-attempt Slack errors and their retry classification.

use std::time::Duration;

use notifier::{DeliveryError, RetryPolicy};
use thiserror::Error;

/// Slack API error codes that mean the credential is unusable.
const AUTH_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "no_permission",
    "missing_scope",
    "not_allowed_token_type",
];

/// Slack API error codes worth retrying.
const TRANSIENT_ERRORS: &[&str] = &[
    "internal_error",
    "fatal_error",
    "service_unavailable",
    "request_timeout",
];

/// Failure of a single Slack Web API call.
#[derive(Debug, Error)]
pub enum SlackError {
    /// The HTTP exchange itself failed.
    ///
    /// `ambiguous` is set when the request may have reached Slack before the
    /// failure (a timeout), so the message might already be posted.
    #[error("transport error: {source}")]
    Transport {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
        /// Whether Slack may have processed the request.
        ambiguous: bool,
    },

    /// HTTP 429 or API error `ratelimited`.
    #[error("rate limited")]
    RateLimited {
        /// Delay requested by the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx.
    #[error("server error: HTTP {status}")]
    Server {
        /// Response status code.
        status: u16,
    },

    /// Slack answered `ok: false` with a transient error code.
    #[error("transient API error: {code}")]
    ApiTransient {
        /// Slack error code.
        code: String,
    },

    /// The credential was rejected.
    #[error("authentication rejected: {detail}")]
    Auth {
        /// HTTP status or Slack error code.
        detail: String,
    },

    /// The request was rejected (bad channel, invalid blocks, …).
    #[error("request rejected: {detail}")]
    Rejected {
        /// HTTP status or Slack error code.
        detail: String,
    },

    /// A 2xx response whose body could not be understood.
    #[error("unreadable response: {detail}")]
    MalformedResponse {
        /// Decoder diagnostic.
        detail: String,
    },

    /// The HTTP client could not be constructed.
    #[error("could not build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl SlackError {
    /// Classifies a Slack `ok: false` error code.
    pub(crate) fn from_api_code(code: &str, retry_after: Option<Duration>) -> Self {
        if code == "ratelimited" {
            SlackError::RateLimited { retry_after }
        } else if AUTH_ERRORS.contains(&code) {
            SlackError::Auth {
                detail: code.to_string(),
            }
        } else if TRANSIENT_ERRORS.contains(&code) {
            SlackError::ApiTransient {
                code: code.to_string(),
            }
        } else {
            SlackError::Rejected {
                detail: code.to_string(),
            }
        }
    }

    /// Classifies a non-2xx HTTP status.
    pub(crate) fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 => SlackError::RateLimited { retry_after },
            401 | 403 => SlackError::Auth {
                detail: format!("HTTP {status}"),
            },
            500..=599 => SlackError::Server { status },
            _ => SlackError::Rejected {
                detail: format!("HTTP {status}"),
            },
        }
    }

    /// Whether another attempt may succeed, and after what delay.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            SlackError::RateLimited { retry_after } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            SlackError::Transport { .. }
            | SlackError::Server { .. }
            | SlackError::ApiTransient { .. }
            | SlackError::MalformedResponse { .. } => RetryPolicy::Retryable { after: None },
            SlackError::Auth { .. } | SlackError::Rejected { .. } | SlackError::ClientBuild(_) => {
                RetryPolicy::NonRetryable
            }
        }
    }

    /// `true` when the failed attempt may nevertheless have posted the message.
    pub fn is_ambiguous(&self) -> bool {
        match self {
            SlackError::Transport { ambiguous, .. } => *ambiguous,
            SlackError::MalformedResponse { .. } => true,
            _ => false,
        }
    }

    /// Converts a terminal per-attempt error into the domain error.
    pub fn into_delivery_error(self) -> DeliveryError {
        match self {
            SlackError::Auth { .. } => DeliveryError::auth(self.to_string()),
            SlackError::Rejected { .. } | SlackError::ClientBuild(_) => {
                DeliveryError::bad_request(self.to_string())
            }
            other => DeliveryError::unavailable(other.to_string()),
        }
    }
}

/// Parses a `Retry-After` value given in (possibly fractional) seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
