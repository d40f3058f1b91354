//! Slack client configuration.

use std::time::Duration;

use notifier::Backoff;

/// Production Slack Web API base URL.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// A bot token (`xoxb-…`). Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    /// Wraps a token, returning `None` if it is blank.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token.trim().to_string()))
        }
    }

    /// The raw token, for the `Authorization` header only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BotToken(***)")
    }
}

/// Everything [`crate::SlackClient`] needs, passed in at construction.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Bot credential.
    pub bot_token: BotToken,
    /// Web API base URL without a trailing slash.
    pub api_base: String,
    /// Upper bound on a single HTTP exchange.
    pub request_timeout: Duration,
    /// Attempt budget and delay schedule.
    pub backoff: Backoff,
}

impl SlackConfig {
    /// Configuration with production defaults for everything but the token.
    pub fn new(bot_token: BotToken) -> Self {
        Self {
            bot_token,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(10),
            backoff: Backoff::default(),
        }
    }

    pub(crate) fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_redacted_in_debug() {
        let config = SlackConfig::new(BotToken::new("xoxb-secret").unwrap());
        let printed = format!("{config:?}");
        assert!(!printed.contains("xoxb-secret"));
        assert!(printed.contains("BotToken(***)"));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let mut config = SlackConfig::new(BotToken::new("t").unwrap());
        config.api_base = "http://127.0.0.1:9000/api/".to_string();
        assert_eq!(
            config.endpoint("chat.postMessage"),
            "http://127.0.0.1:9000/api/chat.postMessage"
        );
    }
}
