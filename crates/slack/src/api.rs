//! Slack Web API request and response shapes.

use notifier::formatter::{Attachment, MessageMetadata};
use notifier::ChatMessage;
use serde::{Deserialize, Serialize};

/// `chat.postMessage` body.
#[derive(Debug, Serialize)]
pub(crate) struct PostMessageRequest<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    pub attachments: &'a [Attachment],
    pub metadata: &'a MessageMetadata,
    pub unfurl_links: bool,
}

impl<'a> PostMessageRequest<'a> {
    pub fn new(channel: &'a str, message: &'a ChatMessage) -> Self {
        Self {
            channel,
            text: &message.text,
            attachments: &message.attachments,
            metadata: &message.metadata,
            unfurl_links: false,
        }
    }
}

/// Common envelope of every Web API response.
#[derive(Debug, Deserialize)]
pub(crate) struct PostMessageResponse {
    pub ok: bool,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `conversations.history` response, reduced to what reconciliation needs.
#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: String,
}

impl HistoryResponse {
    /// Cursor of the next page; Slack sends an empty string on the last one.
    pub fn next_cursor(&self) -> Option<&str> {
        self.response_metadata
            .as_ref()
            .map(|m| m.next_cursor.as_str())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryMessage {
    pub ts: String,
    #[serde(default)]
    pub metadata: Option<HistoryMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryMetadata {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub event_payload: serde_json::Value,
}

impl HistoryMessage {
    /// `true` when this message was posted by us for `dispatch_key`.
    pub fn carries_key(&self, event_type: &str, dispatch_key: &str) -> bool {
        self.metadata.as_ref().is_some_and(|m| {
            m.event_type == event_type
                && m.event_payload.get("dispatch_key").and_then(|v| v.as_str())
                    == Some(dispatch_key)
        })
    }
}
