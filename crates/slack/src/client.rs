//! [`SlackClient`]: the `chat.postMessage` retry loop.

use std::time::Duration;

use async_trait::async_trait;
use notifier::{
    ChannelId, ChatBackend, ChatMessage, DeliveryError, DeliveryReceipt, DeliveryState, DispatchKey,
    MessageId, RetryPolicy, Timestamp, METADATA_EVENT_TYPE,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::api::{HistoryResponse, PostMessageRequest, PostMessageResponse};
use crate::config::SlackConfig;
use crate::error::{parse_retry_after, SlackError};

/// How far before the first attempt the history lookup starts, to absorb
/// clock skew between us and Slack.
const HISTORY_SKEW_SECS: i64 = 60;

/// Messages requested per history page.
const HISTORY_LIMIT: u32 = 100;

/// History pages scanned before a lookup gives up.
const HISTORY_MAX_PAGES: usize = 5;

/// Slack Web API client implementing [`ChatBackend`].
#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    config: SlackConfig,
}

impl SlackClient {
    /// Builds a client; every request is bounded by `config.request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SlackError::ClientBuild`] if the TLS backend cannot be initialised.
    pub fn new(config: SlackConfig) -> Result<Self, SlackError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .user_agent(concat!("cinotify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SlackError::ClientBuild)?;
        Ok(Self { http, config })
    }

    /// Sends one `chat.postMessage` request.
    async fn post_once(&self, request: &PostMessageRequest<'_>) -> Result<MessageId, SlackError> {
        let response = self
            .http
            .post(self.config.endpoint("chat.postMessage"))
            .bearer_auth(self.config.bot_token.expose())
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        if !status.is_success() {
            return Err(SlackError::from_status(status.as_u16(), retry_after));
        }

        let body: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| SlackError::MalformedResponse { detail: e.to_string() })?;
        if !body.ok {
            let code = body.error.as_deref().unwrap_or("unknown_error");
            return Err(SlackError::from_api_code(code, retry_after));
        }
        body.ts
            .as_deref()
            .and_then(MessageId::new)
            .ok_or_else(|| SlackError::MalformedResponse {
                detail: "ok response without ts".to_string(),
            })
    }

    /// Looks for a message we already posted for `dispatch_key` since `oldest`.
    ///
    /// Follows `next_cursor` for up to [`HISTORY_MAX_PAGES`] pages.
    async fn find_posted(
        &self,
        channel: &ChannelId,
        dispatch_key: &str,
        oldest: &str,
    ) -> Result<Option<MessageId>, SlackError> {
        let limit = HISTORY_LIMIT.to_string();
        let mut cursor: Option<String> = None;

        for _ in 0..HISTORY_MAX_PAGES {
            let mut query = vec![
                ("channel", channel.as_str()),
                ("oldest", oldest),
                ("limit", limit.as_str()),
                ("include_all_metadata", "true"),
            ];
            if let Some(cursor) = cursor.as_deref() {
                query.push(("cursor", cursor));
            }
            let response = self
                .http
                .get(self.config.endpoint("conversations.history"))
                .bearer_auth(self.config.bot_token.expose())
                .query(&query)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                let after = retry_after(response.headers());
                return Err(SlackError::from_status(status.as_u16(), after));
            }
            let body: HistoryResponse = response
                .json()
                .await
                .map_err(|e| SlackError::MalformedResponse { detail: e.to_string() })?;
            if !body.ok {
                let code = body.error.as_deref().unwrap_or("unknown_error");
                return Err(SlackError::from_api_code(code, None));
            }
            let found = body
                .messages
                .iter()
                .find(|m| m.carries_key(METADATA_EVENT_TYPE, dispatch_key))
                .and_then(|m| MessageId::new(m.ts.as_str()));
            if found.is_some() {
                return Ok(found);
            }
            match body.next_cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => return Ok(None),
            }
        }
        tracing::warn!(pages = HISTORY_MAX_PAGES, "history lookup stopped at the page limit");
        Ok(None)
    }

    /// [`find_posted`](Self::find_posted) after an ambiguous attempt; lookup
    /// failures count as "not posted".
    async fn reconcile(
        &self,
        channel: &ChannelId,
        dispatch_key: &str,
        oldest: &str,
    ) -> Option<MessageId> {
        match self.find_posted(channel, dispatch_key, oldest).await {
            Ok(Some(message_id)) => {
                tracing::info!(%message_id, "earlier attempt was accepted; not re-posting");
                Some(message_id)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "history lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl ChatBackend for SlackClient {
    #[tracing::instrument(
        skip_all,
        fields(channel = %channel, dispatch_key = message.dispatch_key())
    )]
    async fn send(
        &self,
        message: &ChatMessage,
        channel: &ChannelId,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let request = PostMessageRequest::new(channel.as_str(), message);
        let key = message.dispatch_key();
        let oldest = slack_ts(chrono::Utc::now() - chrono::Duration::seconds(HISTORY_SKEW_SECS));
        let backoff = self.config.backoff;

        let mut state = DeliveryState::Pending;
        let mut maybe_posted = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            state = transition(state, DeliveryState::Sending(attempt));

            if maybe_posted {
                if let Some(message_id) = self.reconcile(channel, key, &oldest).await {
                    transition(state, DeliveryState::Delivered);
                    return Ok(DeliveryReceipt {
                        message_id,
                        attempts: attempt - 1,
                    });
                }
            }

            let err = match self.post_once(&request).await {
                Ok(message_id) => {
                    transition(state, DeliveryState::Delivered);
                    return Ok(DeliveryReceipt {
                        message_id,
                        attempts: attempt,
                    });
                }
                Err(err) => err,
            };

            let after = match err.retry_policy() {
                RetryPolicy::NonRetryable => {
                    transition(state, DeliveryState::Failed { retryable: false });
                    tracing::error!(attempt, error = %err, "terminal delivery failure");
                    return Err(err.into_delivery_error());
                }
                RetryPolicy::Retryable { after } => after,
            };
            maybe_posted |= err.is_ambiguous();

            let delay = if backoff.allows_another(attempt) {
                backoff.delay_after(attempt, after)
            } else {
                None
            };
            let Some(delay) = delay else {
                // The last attempt may still have been accepted.
                if maybe_posted {
                    if let Some(message_id) = self.reconcile(channel, key, &oldest).await {
                        transition(state, DeliveryState::Delivered);
                        return Ok(DeliveryReceipt {
                            message_id,
                            attempts: attempt,
                        });
                    }
                }
                transition(state, DeliveryState::Failed { retryable: false });
                tracing::error!(attempt, error = %err, "giving up on delivery");
                return Err(DeliveryError::unavailable(give_up_detail(
                    attempt,
                    &err,
                    after,
                    backoff.hint_limit(),
                )));
            };

            state = transition(state, DeliveryState::Failed { retryable: true });
            tracing::warn!(
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "transient delivery failure; backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn find_delivered(
        &self,
        key: &DispatchKey,
        channel: &ChannelId,
        since: Timestamp,
    ) -> Result<Option<MessageId>, DeliveryError> {
        let oldest = slack_ts(since.as_datetime());
        self.find_posted(channel, key.as_str(), &oldest)
            .await
            .map_err(SlackError::into_delivery_error)
    }
}

fn give_up_detail(
    attempt: u32,
    err: &SlackError,
    hint: Option<Duration>,
    limit: Duration,
) -> String {
    match hint {
        Some(hint) if hint > limit => format!(
            "server asked to wait {}s (limit {}s): {err}",
            hint.as_secs(),
            limit.as_secs()
        ),
        _ => format!("gave up after {attempt} attempts: {err}"),
    }
}

fn transition(from: DeliveryState, to: DeliveryState) -> DeliveryState {
    debug_assert!(
        from.can_transition_to(to),
        "illegal delivery transition {from} -> {to}"
    );
    tracing::debug!(%from, %to, "delivery state");
    to
}

fn transport_error(source: reqwest::Error) -> SlackError {
    // A timeout may fire after Slack has already processed the request.
    let ambiguous = source.is_timeout() && !source.is_connect();
    SlackError::Transport { source, ambiguous }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

/// Formats a time as a Slack `ts` (`seconds.micros`).
fn slack_ts(at: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}
