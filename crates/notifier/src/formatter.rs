//! Message formatter: typed [`Event`] in, channel-ready [`ChatMessage`] out.
//!
//! Formatting is a pure function. The same event always serializes to the
//! same bytes, which is what makes re-sending on retry safe and lets the
//! delivery client recognise its own earlier post via [`MessageMetadata`].
//!
//! The message shape follows Slack's `chat.postMessage`: a fallback `text`
//! plus one colored attachment holding Block Kit blocks.

use serde::{Deserialize, Serialize};

use crate::event::{DeployEvent, Event, PrMergedEvent, PrOpenedEvent};
use crate::{BranchName, DeployStatus, DispatchKey};

/// `metadata.event_type` stamped on every message this service posts.
pub const METADATA_EVENT_TYPE: &str = "ci_notification";

const COLOR_SUCCESS: &str = "#2EB67D";
const COLOR_FAILURE: &str = "#E01E5A";
const COLOR_PR_OPENED: &str = "#36C5F0";
pub(crate) const COLOR_PURPLE: &str = "#6C5CE7";

// ---------------------------------------------------------------------------
// Message model
// ---------------------------------------------------------------------------

/// A formatted message, minus the destination channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Plain fallback text shown in notifications and clients without blocks.
    pub text: String,
    /// Rich content.
    pub attachments: Vec<Attachment>,
    /// Identifies the message as ours and carries its dispatch key.
    pub metadata: MessageMetadata,
}

impl ChatMessage {
    /// The dispatch key carried in the metadata.
    pub fn dispatch_key(&self) -> &str {
        &self.metadata.event_payload.dispatch_key
    }
}

/// A colored container of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Sidebar color as `#RRGGBB`.
    pub color: String,
    /// Content blocks.
    pub blocks: Vec<Block>,
}

/// The subset of Block Kit blocks this service emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Large bold title.
    Header {
        /// Must be plain text.
        text: TextObject,
    },
    /// Body text and/or a two-column field grid.
    Section {
        /// Main text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<TextObject>,
        /// Field grid.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<TextObject>,
    },
    /// Horizontal rule.
    Divider,
    /// Small grey footer line.
    Context {
        /// Footer elements.
        elements: Vec<TextObject>,
    },
}

/// A Block Kit text object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TextObject {
    /// Unformatted text.
    #[serde(rename = "plain_text")]
    PlainText {
        /// Content.
        text: String,
        /// Render `:emoji:` codes.
        emoji: bool,
    },
    /// Slack markdown.
    #[serde(rename = "mrkdwn")]
    Mrkdwn {
        /// Content.
        text: String,
    },
}

impl TextObject {
    /// Plain text with emoji rendering on.
    pub fn plain(text: impl Into<String>) -> Self {
        TextObject::PlainText {
            text: text.into(),
            emoji: true,
        }
    }

    /// Slack markdown.
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        TextObject::Mrkdwn { text: text.into() }
    }
}

/// Message metadata as understood by `chat.postMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Always [`METADATA_EVENT_TYPE`].
    pub event_type: String,
    /// Our payload.
    pub event_payload: MetadataPayload,
}

/// Custom metadata payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPayload {
    /// Dispatch key of the notification.
    pub dispatch_key: String,
}

impl MessageMetadata {
    /// Metadata tagging a message with `key`.
    pub fn for_key(key: &DispatchKey) -> Self {
        Self {
            event_type: METADATA_EVENT_TYPE.to_string(),
            event_payload: MetadataPayload {
                dispatch_key: key.as_str().to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Formats `event` for the chat channel.
pub fn format(event: &Event) -> ChatMessage {
    let metadata = MessageMetadata::for_key(&event.dispatch_key());
    let (text, attachment) = match event {
        Event::Deploy(e) => format_deploy(e),
        Event::PrOpened(e) => format_pr_opened(e),
        Event::PrMerged(e) => format_pr_merged(e),
    };
    ChatMessage {
        text,
        attachments: vec![attachment],
        metadata,
    }
}

fn format_deploy(e: &DeployEvent) -> (String, Attachment) {
    let (icon, verb, color) = match e.outcome.status() {
        DeployStatus::Success => ("✅", "succeeded", COLOR_SUCCESS),
        DeployStatus::Failure => ("❌", "failed", COLOR_FAILURE),
    };
    let short_sha = e.sha.short();

    let text = format!(
        "{icon} Deploy {verb}: {}@{short_sha} ({}) by {}",
        e.repository, e.branch, e.actor
    );

    let mut fields = vec![
        field("Repository", &escape(e.repository.as_str())),
        field("Branch", &escape(e.branch.as_str())),
        field("Commit", &format!("`{short_sha}`")),
        field("Triggered by", &escape(e.actor.as_str())),
    ];
    if let Some(log_url) = e.outcome.log_url() {
        fields.push(field("Logs", &link(log_url.as_str(), "View job log")));
    }

    let blocks = vec![
        Block::Header {
            text: TextObject::plain(format!("{icon} Deploy {verb}")),
        },
        Block::Section { text: None, fields },
    ];
    (
        text,
        Attachment {
            color: color.to_string(),
            blocks,
        },
    )
}

fn format_pr_opened(e: &PrOpenedEvent) -> (String, Attachment) {
    let transition = branch_transition(&e.source_branch, &e.target_branch);
    let text = format!(
        "🔀 PR #{} opened in {}: {} ({transition}) by {}",
        e.number, e.repository, e.title, e.author
    );

    let blocks = vec![
        Block::Header {
            text: TextObject::plain("🔀 New pull request"),
        },
        Block::Section {
            text: Some(TextObject::mrkdwn(format!(
                "*{}*",
                link(e.url.as_str(), &format!("#{} {}", e.number, e.title))
            ))),
            fields: vec![
                field("Repository", &escape(e.repository.as_str())),
                field("Author", &escape(e.author.as_str())),
                field("Branches", &escape(&transition)),
            ],
        },
    ];
    (
        text,
        Attachment {
            color: COLOR_PR_OPENED.to_string(),
            blocks,
        },
    )
}

fn format_pr_merged(e: &PrMergedEvent) -> (String, Attachment) {
    let transition = branch_transition(&e.source_branch, &e.target_branch);
    let text = format!(
        "🎉 PR #{} merged in {} ({transition}) by {}",
        e.number, e.repository, e.merger
    );

    let blocks = vec![
        Block::Header {
            text: TextObject::plain("🎉 Pull request merged"),
        },
        Block::Section {
            text: Some(TextObject::mrkdwn(format!(
                "*#{}* in *{}*",
                e.number,
                escape(e.repository.as_str())
            ))),
            fields: vec![
                field("Author", &escape(e.author.as_str())),
                field("Merged by", &escape(e.merger.as_str())),
                field("Branches", &escape(&transition)),
            ],
        },
    ];
    (
        text,
        Attachment {
            color: COLOR_PURPLE.to_string(),
            blocks,
        },
    )
}

/// Renders `source → target`.
pub fn branch_transition(source: &BranchName, target: &BranchName) -> String {
    format!("{source} → {target}")
}

pub(crate) fn field(label: &str, value: &str) -> TextObject {
    TextObject::mrkdwn(format!("*{label}:*\n{value}"))
}

fn link(url: &str, label: &str) -> String {
    format!("<{url}|{}>", escape(label))
}

/// Escapes the three characters Slack markdown treats as control characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::*;
    use crate::event::{DeployOutcome, WebUrl};
    use crate::CommitSha;

    fn json(message: &ChatMessage) -> String {
        serde_json::to_string(message).unwrap()
    }

    #[test]
    fn failed_deploy_mentions_short_sha_and_log_url() {
        let message = format(&deploy_failure());
        let visible = serde_json::to_string(&message.attachments).unwrap();
        assert!(visible.contains("`abcdef1`"));
        assert!(!visible.contains("abcdef12"));
        assert!(!message.text.contains("abcdef12"));
        let out = json(&message);
        assert!(out.contains("http://x/log"));
        assert!(out.contains("*Logs:*"));
        assert!(out.contains("acme/api"));
        assert!(out.contains("main"));
        assert!(out.contains("alice"));
    }

    #[test]
    fn successful_deploy_has_no_log_field() {
        let out = json(&format(&deploy_success()));
        assert!(!out.contains("Logs"));
        assert!(out.contains(COLOR_SUCCESS));
    }

    #[test]
    fn short_sha_is_exactly_seven_chars_for_long_inputs() {
        for raw in ["abcdef1", "abcdef12", "0123456789abcdef0123456789abcdef01234567"] {
            let mut event = deploy_success();
            if let Event::Deploy(e) = &mut event {
                e.sha = CommitSha::new(raw).unwrap();
            }
            let message = format(&event);
            let expected = format!("`{}`", &raw[..7]);
            assert!(json(&message).contains(&expected), "{raw}");
            if raw.len() > 7 {
                assert!(!message.text.contains(&raw[..8]));
            }
        }
    }

    #[test]
    fn pr_opened_renders_transition_number_and_title() {
        let message = format(&pr_opened());
        let out = json(&message);
        assert!(out.contains("feat/x → main"));
        assert!(out.contains("#42"));
        assert!(out.contains("Add X"));
        assert!(out.contains("http://pr/42"));
        assert!(message.text.contains("feat/x → main"));
    }

    #[test]
    fn pr_merged_names_merger_and_transition() {
        let message = format(&pr_merged());
        assert!(message.text.contains("carol"));
        assert!(message.text.contains("feat/x → main"));
        assert!(json(&message).contains("*Merged by:*\\ncarol"));
    }

    #[test]
    fn formatting_is_deterministic() {
        for event in [deploy_failure(), deploy_success(), pr_opened(), pr_merged()] {
            assert_eq!(json(&format(&event)), json(&format(&event)));
        }
    }

    #[test]
    fn metadata_carries_dispatch_key() {
        let event = pr_merged();
        let message = format(&event);
        assert_eq!(message.metadata.event_type, METADATA_EVENT_TYPE);
        assert_eq!(message.dispatch_key(), event.dispatch_key().as_str());
    }

    #[test]
    fn titles_are_escaped_inside_markdown() {
        let mut event = pr_opened();
        if let Event::PrOpened(e) = &mut event {
            e.title = "Fix <script> & more".to_string();
        }
        let out = json(&format(&event));
        assert!(out.contains("Fix &lt;script&gt; &amp; more"));
    }

    #[test]
    fn header_and_section_serialize_as_block_kit() {
        let mut event = deploy_failure();
        if let Event::Deploy(e) = &mut event {
            e.outcome = DeployOutcome::Failure {
                log_url: WebUrl::new("https://ci/run/1").unwrap(),
            };
        }
        let value = serde_json::to_value(format(&event)).unwrap();
        let blocks = &value["attachments"][0]["blocks"];
        assert_eq!(blocks[0]["type"], "header");
        assert_eq!(blocks[0]["text"]["type"], "plain_text");
        assert_eq!(blocks[1]["type"], "section");
        assert!(blocks[1].get("text").is_none());
        assert_eq!(blocks[1]["fields"][0]["type"], "mrkdwn");
    }
}
