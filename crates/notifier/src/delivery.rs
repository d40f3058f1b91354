//! Chat backend port and the delivery retry vocabulary.
//!
//! [`ChatBackend`] is implemented by infrastructure crates (the `slack`
//! crate). The retry loop lives in the implementation; this module defines
//! the schedule it follows ([`Backoff`]) and the states one delivery passes
//! through ([`DeliveryState`]).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DeliveryError;
use crate::event::DispatchKey;
use crate::formatter::ChatMessage;
use crate::{ChannelId, MessageId, Timestamp};

/// Longest backend-requested delay that is waited out unless the configured
/// `max` is larger.
pub const MAX_BACKEND_DELAY: Duration = Duration::from_secs(60);

/// Sends formatted messages to a chat channel.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Delivers `message` to `channel`, retrying transient failures internally.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] once delivery has terminally failed: an
    /// auth or bad-request rejection immediately, or `Unavailable` after the
    /// attempt budget is exhausted. No local state is changed on failure.
    async fn send(
        &self,
        message: &ChatMessage,
        channel: &ChannelId,
    ) -> Result<DeliveryReceipt, DeliveryError>;

    /// Looks for a message already posted to `channel` for `key` since `since`.
    ///
    /// Lets a fresh process (a retried CI step) notice a delivery its own
    /// in-memory store never saw. Backends without a queryable history keep
    /// the default, which finds nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the lookup itself fails; callers treat
    /// that as "not found" and send.
    async fn find_delivered(
        &self,
        key: &DispatchKey,
        channel: &ChannelId,
        since: Timestamp,
    ) -> Result<Option<MessageId>, DeliveryError> {
        let _ = (key, channel, since);
        Ok(None)
    }
}

/// Proof that the backend accepted a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Backend-assigned message identifier.
    pub message_id: MessageId,
    /// Number of send attempts made (1 when the first attempt succeeded).
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// States of a single delivery.
///
/// `Pending → Sending → {Delivered | Failed(retryable) → Sending | Failed(terminal)}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Not yet attempted.
    Pending,
    /// Attempt `n` (1-based) is in flight.
    Sending(u32),
    /// The backend accepted the message.
    Delivered,
    /// The last attempt failed; `retryable` decides whether another follows.
    Failed {
        /// Whether another attempt may be made.
        retryable: bool,
    },
}

impl DeliveryState {
    /// `true` for states no further transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::Delivered | DeliveryState::Failed { retryable: false })
    }

    /// Whether `self → next` is an allowed transition.
    pub fn can_transition_to(self, next: DeliveryState) -> bool {
        use DeliveryState::*;
        match (self, next) {
            (Pending, Sending(1)) => true,
            (Sending(_), Delivered) | (Sending(_), Failed { .. }) => true,
            (Failed { retryable: true }, Sending(n)) => n > 1,
            _ => false,
        }
    }
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryState::Pending => f.write_str("pending"),
            DeliveryState::Sending(n) => write!(f, "sending(attempt={n})"),
            DeliveryState::Delivered => f.write_str("delivered"),
            DeliveryState::Failed { retryable: true } => f.write_str("failed(retryable)"),
            DeliveryState::Failed { retryable: false } => f.write_str("failed(terminal)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Bounded exponential backoff.
///
/// `delay = initial * 2^(attempt - 1)`, capped at `max`. A backend-provided
/// delay (e.g. `Retry-After`) replaces the computed one and may exceed `max`,
/// up to [`hint_limit`](Self::hint_limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts including the first one. At least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial: Duration,
    /// Upper bound on computed delays.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Delay before the attempt following failed attempt `attempt` (1-based).
    ///
    /// `None` when the backend asked for a wait beyond
    /// [`hint_limit`](Self::hint_limit); the delivery should give up instead.
    pub fn delay_after(&self, attempt: u32, backend_hint: Option<Duration>) -> Option<Duration> {
        if let Some(hint) = backend_hint {
            return (hint <= self.hint_limit()).then_some(hint);
        }
        let exponent = attempt.saturating_sub(1).min(31);
        Some(
            self.initial
                .checked_mul(1u32 << exponent)
                .unwrap_or(self.max)
                .min(self.max),
        )
    }

    /// Longest backend-requested delay honored: `max` or
    /// [`MAX_BACKEND_DELAY`], whichever is larger.
    pub fn hint_limit(&self) -> Duration {
        self.max.max(MAX_BACKEND_DELAY)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }
}
