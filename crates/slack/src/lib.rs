//! CI Notify Slack delivery adapter.
//!
//! Implements the [`notifier::ChatBackend`] trait for Slack's Web API
//! (`chat.postMessage`). Other chat backends would be new crates beside this
//! one without any change to the `notifier` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, bearer authentication, response
//! classification, `Retry-After` handling, and exponential back-off live
//! here. The [`notifier`] crate sees only [`notifier::ChatBackend`].
//!
//! ## Delivery guarantees
//!
//! - Transient failures (timeouts, HTTP 5xx, HTTP 429, Slack `ratelimited`
//!   and friends) are retried up to the configured attempt budget.
//! - Auth and payload rejections fail immediately.
//! - When an attempt times out after the request may have reached Slack, the
//!   next attempt first searches the channel history for a message carrying
//!   the same dispatch key, so a slow-but-successful post is never repeated.

mod api;
mod client;
mod config;
mod error;

pub use client::SlackClient;
pub use config::{BotToken, SlackConfig, DEFAULT_API_BASE};
pub use error::SlackError;
