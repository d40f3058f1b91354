//! Configuration: TOML file, then environment, then command-line flags.
//!
//! Every key may appear in the file. Secrets are normally supplied through
//! the environment instead:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `SLACK_BOT_TOKEN` | `bot_token` |
//! | `SLACK_CHANNEL_ID` | `channel_id` |
//! | `GH_TOKEN` | `github_token` |
//! | `ORG_NAME` | `org` |
//! | `CINOTIFY_INGEST_TOKEN` | `ingest_token` |

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use github::{GithubConfig, GithubToken};
use listener::IngestToken;
use notifier::{Backoff, ChannelId, OrgName};
use serde::Deserialize;
use slack::{BotToken, SlackConfig};
use thiserror::Error;

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "cinotify.toml";

/// Why configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting `{key}` ({hint})")]
    Missing { key: &'static str, hint: &'static str },

    #[error("invalid `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Raw settings as they appear in the file; every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
    pub dedup_window_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub api_base: Option<String>,
    pub request_timeout_seconds: Option<u64>,
    pub initial_backoff_millis: Option<u64>,
    pub max_backoff_seconds: Option<u64>,
    pub listen: Option<String>,
    pub ingest_token: Option<String>,
    pub github_token: Option<String>,
    pub github_api_url: Option<String>,
    pub org: Option<String>,
}

impl RawConfig {
    /// Loads `path`, or [`DEFAULT_CONFIG_FILE`] when `path` is `None`.
    ///
    /// A missing default file yields empty settings; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source }),
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Overrides keys from the environment; `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |slot: &mut Option<String>, var: &str| {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        };
        set(&mut self.bot_token, "SLACK_BOT_TOKEN");
        set(&mut self.channel_id, "SLACK_CHANNEL_ID");
        set(&mut self.github_token, "GH_TOKEN");
        set(&mut self.org, "ORG_NAME");
        set(&mut self.ingest_token, "CINOTIFY_INGEST_TOKEN");
    }

    /// Validates the settings every subcommand needs.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let bot_token = self
            .bot_token
            .as_deref()
            .and_then(BotToken::new)
            .ok_or(ConfigError::Missing {
                key: "bot_token",
                hint: "set SLACK_BOT_TOKEN",
            })?;
        let channel = self
            .channel_id
            .as_deref()
            .and_then(ChannelId::new)
            .ok_or(ConfigError::Missing {
                key: "channel_id",
                hint: "set SLACK_CHANNEL_ID",
            })?;

        let max_attempts = self.max_retries.unwrap_or(3);
        if max_attempts == 0 {
            return Err(invalid("max_retries", "must be at least 1"));
        }
        let initial = Duration::from_millis(self.initial_backoff_millis.unwrap_or(500));
        let max = Duration::from_secs(self.max_backoff_seconds.unwrap_or(30));
        if initial > max {
            return Err(invalid(
                "initial_backoff_millis",
                "must not exceed max_backoff_seconds",
            ));
        }
        let request_timeout = Duration::from_secs(self.request_timeout_seconds.unwrap_or(10));
        if request_timeout.is_zero() {
            return Err(invalid("request_timeout_seconds", "must be positive"));
        }
        let dedup_window = Duration::from_secs(
            self.dedup_window_seconds
                .unwrap_or(notifier::DEFAULT_DEDUP_WINDOW.as_secs()),
        );
        if dedup_window.is_zero() {
            return Err(invalid("dedup_window_seconds", "must be positive"));
        }

        let mut slack = SlackConfig::new(bot_token);
        if let Some(api_base) = self.api_base {
            slack.api_base = http_url("api_base", api_base)?;
        }
        slack.request_timeout = request_timeout;
        slack.backoff = Backoff {
            max_attempts,
            initial,
            max,
        };

        let listen = match self.listen.as_deref() {
            Some(addr) => addr
                .parse::<SocketAddr>()
                .map_err(|e| invalid("listen", format!("{addr:?}: {e}")))?,
            None => SocketAddr::from(([127, 0, 0, 1], 8080)),
        };

        let github_api_url = self
            .github_api_url
            .map(|url| http_url("github_api_url", url))
            .transpose()?;

        Ok(Settings {
            slack,
            channel,
            dedup_window,
            listen,
            ingest_token: self.ingest_token.and_then(IngestToken::new),
            github_token: self.github_token.and_then(GithubToken::new),
            github_api_url,
            org: self.org.and_then(OrgName::new),
        })
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

fn http_url(key: &'static str, url: String) -> Result<String, ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(invalid(key, format!("{url:?} is not an http(s) URL")))
    }
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub slack: SlackConfig,
    pub channel: ChannelId,
    pub dedup_window: Duration,
    pub listen: SocketAddr,
    pub ingest_token: Option<IngestToken>,
    github_token: Option<GithubToken>,
    github_api_url: Option<String>,
    org: Option<OrgName>,
}

impl Settings {
    /// GitHub settings for the weekly report; `org` overrides the configured one.
    pub fn github(&self, org: Option<&str>) -> Result<(GithubConfig, OrgName), ConfigError> {
        let token = self.github_token.clone().ok_or(ConfigError::Missing {
            key: "github_token",
            hint: "set GH_TOKEN",
        })?;
        let org = match org {
            Some(name) => OrgName::new(name).ok_or_else(|| invalid("org", "must not be blank"))?,
            None => self.org.clone().ok_or(ConfigError::Missing {
                key: "org",
                hint: "set ORG_NAME or pass --org",
            })?,
        };
        let mut config = GithubConfig::new(token);
        if let Some(url) = &self.github_api_url {
            config.graphql_url.clone_from(url);
        }
        Ok((config, org))
    }
}
