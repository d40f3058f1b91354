//! Dispatcher: receiver → deduplicator → formatter → chat backend.
//!
//! One call to [`Dispatcher::dispatch`] is one unit of work. Dispatches for
//! different events run fully in parallel; dispatches for the same
//! [`DispatchKey`] are serialized by the [`Deduplicator`].

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use crate::dedup::{DispatchDecision, Deduplicator};
use crate::delivery::ChatBackend;
use crate::errors::{DeliveryErrorKind, ValidationError};
use crate::event::{DispatchKey, Event};
use crate::formatter::{self, ChatMessage};
use crate::receiver::{Admission, EventReceiver, FilterReason};
use crate::{ChannelId, DispatchId, MessageId};

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The backend accepted the message.
    Delivered {
        /// Backend-assigned message identifier.
        message_id: MessageId,
    },
    /// The same logical event was already delivered within the dedup window.
    Suppressed {
        /// Key of the duplicate.
        dispatch_key: DispatchKey,
    },
    /// Delivery terminally failed.
    Failed {
        /// Failure category.
        kind: DeliveryErrorKind,
        /// Backend detail.
        detail: String,
    },
}

/// Result of ingesting a raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IngestOutcome {
    /// The payload was valid but an admission predicate rejected it.
    Filtered(FilteredOutcome),
    /// The event was dispatched.
    Dispatched(DispatchOutcome),
}

/// Serialized form of a filtered ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilteredOutcome {
    /// Always `"filtered"`.
    pub outcome: &'static str,
    /// Which predicate rejected the event.
    pub reason: FilterReason,
}

impl IngestOutcome {
    fn filtered(reason: FilterReason) -> Self {
        IngestOutcome::Filtered(FilteredOutcome {
            outcome: "filtered",
            reason,
        })
    }
}

/// Wires the receiver, deduplicator, and chat backend together.
#[derive(Clone)]
pub struct Dispatcher {
    receiver: EventReceiver,
    dedup: Deduplicator,
    backend: Arc<dyn ChatBackend>,
    channel: ChannelId,
}

impl Dispatcher {
    /// Creates a dispatcher posting to `channel` through `backend`.
    pub fn new(
        receiver: EventReceiver,
        dedup: Deduplicator,
        backend: Arc<dyn ChatBackend>,
        channel: ChannelId,
    ) -> Self {
        Self {
            receiver,
            dedup,
            backend,
            channel,
        }
    }

    /// The deduplicator, for periodic pruning.
    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Validates a raw payload of kind `tag` and dispatches it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for malformed payloads. The error is
    /// logged here; callers only need to surface it.
    pub async fn ingest(&self, tag: &str, body: &[u8]) -> Result<IngestOutcome, ValidationError> {
        let admission = self.receiver.receive(tag, body).inspect_err(|e| {
            tracing::warn!(event_kind = tag, error = %e, "dropping invalid event");
        })?;
        Ok(self.admit(admission).await)
    }

    async fn admit(&self, admission: Admission) -> IngestOutcome {
        match admission {
            Admission::Filtered(reason) => {
                tracing::info!(%reason, "event filtered");
                IngestOutcome::filtered(reason)
            }
            Admission::Admitted(event) => IngestOutcome::Dispatched(self.dispatch(&event).await),
        }
    }

    /// Dispatches a validated event.
    pub async fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let key = event.dispatch_key();
        let span = tracing::info_span!(
            "dispatch",
            dispatch_id = %DispatchId::new_random(),
            dispatch_key = %key,
            event_kind = %event.kind(),
            repository = %event.repository(),
        );
        self.dispatch_with(key, || formatter::format(event))
            .instrument(span)
            .await
    }

    /// Dispatches a pre-formatted message under `key` (used for notifications
    /// that are not CI events, such as the weekly report).
    pub async fn dispatch_message(
        &self,
        key: DispatchKey,
        message: ChatMessage,
    ) -> DispatchOutcome {
        let span = tracing::info_span!(
            "dispatch",
            dispatch_id = %DispatchId::new_random(),
            dispatch_key = %key,
        );
        self.dispatch_with(key, move || message).instrument(span).await
    }

    async fn dispatch_with<F>(&self, key: DispatchKey, build: F) -> DispatchOutcome
    where
        F: FnOnce() -> ChatMessage,
    {
        let permit = match self.dedup.should_dispatch_key(key).await {
            DispatchDecision::Suppress(record) => {
                tracing::info!(
                    message_id = %record.message_id,
                    delivered_at = %record.delivered_at,
                    "duplicate suppressed"
                );
                return DispatchOutcome::Suppressed {
                    dispatch_key: record.key,
                };
            }
            DispatchDecision::Dispatch(permit) => permit,
        };

        // A retried CI step runs in a fresh process whose store is empty.
        let since = self.dedup.window_start();
        match self.backend.find_delivered(permit.key(), &self.channel, since).await {
            Ok(Some(message_id)) => {
                tracing::info!(%message_id, "already posted by an earlier run; suppressed");
                let record = permit.record_delivered(message_id);
                return DispatchOutcome::Suppressed {
                    dispatch_key: record.key,
                };
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    kind = %e.kind,
                    detail = %e.detail,
                    "history lookup failed; sending"
                );
            }
        }

        let message = build();
        match self.backend.send(&message, &self.channel).await {
            Ok(receipt) => {
                tracing::info!(
                    message_id = %receipt.message_id,
                    attempts = receipt.attempts,
                    "notification delivered"
                );
                let record = permit.record_delivered(receipt.message_id);
                DispatchOutcome::Delivered {
                    message_id: record.message_id,
                }
            }
            Err(e) => {
                tracing::error!(kind = %e.kind, detail = %e.detail, "notification delivery failed");
                DispatchOutcome::Failed {
                    kind: e.kind,
                    detail: e.detail,
                }
            }
        }
    }
}
