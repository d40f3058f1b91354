//! Typed CI lifecycle events and their deduplication identity.
//!
//! An [`Event`] is only ever built by the [receiver](crate::receiver), so every
//! value of this type has already passed validation. The deploy outcome
//! carries its log URL inside the failure variant, which keeps "log URL only
//! on failure" true by construction.

use serde::{Deserialize, Serialize};

use crate::{
    BranchName, CommitSha, DeployStatus, EventKind, PullRequestNumber, RepositoryName, Timestamp,
    UserLogin,
};

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

/// An absolute `http://` or `https://` URL (log pages, pull request pages).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebUrl(String);

impl WebUrl {
    /// Creates a [`WebUrl`], returning `None` unless `value` starts with an
    /// HTTP(S) scheme followed by a non-empty host part.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let v = value.as_ref().trim();
        let rest = v
            .strip_prefix("https://")
            .or_else(|| v.strip_prefix("http://"))?;
        if rest.is_empty() || rest.starts_with('/') || v.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self(v.to_string()))
    }

    /// Returns the URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WebUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// Deploy outcome; a failure always links to its job log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// The deployment succeeded.
    Success,
    /// The deployment failed.
    Failure {
        /// Where the failing job's log can be read.
        log_url: WebUrl,
    },
}

impl DeployOutcome {
    /// Returns the plain status without the log URL.
    pub fn status(&self) -> DeployStatus {
        match self {
            DeployOutcome::Success => DeployStatus::Success,
            DeployOutcome::Failure { .. } => DeployStatus::Failure,
        }
    }

    /// Returns the log URL for failures.
    pub fn log_url(&self) -> Option<&WebUrl> {
        match self {
            DeployOutcome::Success => None,
            DeployOutcome::Failure { log_url } => Some(log_url),
        }
    }
}

/// A deployment finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployEvent {
    /// Repository that was deployed.
    pub repository: RepositoryName,
    /// Who triggered the deployment.
    pub actor: UserLogin,
    /// When the event happened (or was received).
    pub timestamp: Timestamp,
    /// Success, or failure with a log link.
    pub outcome: DeployOutcome,
    /// Deployed commit.
    pub sha: CommitSha,
    /// Deployed branch.
    pub branch: BranchName,
}

/// A pull request was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrOpenedEvent {
    /// Repository the pull request targets.
    pub repository: RepositoryName,
    /// Who triggered the workflow run (defaults to the author).
    pub actor: UserLogin,
    /// When the event happened (or was received).
    pub timestamp: Timestamp,
    /// Pull request number.
    pub number: PullRequestNumber,
    /// Head branch.
    pub source_branch: BranchName,
    /// Base branch.
    pub target_branch: BranchName,
    /// Pull request author.
    pub author: UserLogin,
    /// Pull request title.
    pub title: String,
    /// Pull request page.
    pub url: WebUrl,
}

/// A pull request was merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrMergedEvent {
    /// Repository the pull request targets.
    pub repository: RepositoryName,
    /// Who triggered the workflow run (defaults to the merger).
    pub actor: UserLogin,
    /// When the event happened (or was received).
    pub timestamp: Timestamp,
    /// Pull request number.
    pub number: PullRequestNumber,
    /// Pull request author.
    pub author: UserLogin,
    /// Head branch.
    pub source_branch: BranchName,
    /// Base branch.
    pub target_branch: BranchName,
    /// Who pressed the merge button.
    pub merger: UserLogin,
}

/// A validated CI lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// See [`DeployEvent`].
    Deploy(DeployEvent),
    /// See [`PrOpenedEvent`].
    PrOpened(PrOpenedEvent),
    /// See [`PrMergedEvent`].
    PrMerged(PrMergedEvent),
}

impl Event {
    /// Returns the event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Deploy(_) => EventKind::Deploy,
            Event::PrOpened(_) => EventKind::PrOpened,
            Event::PrMerged(_) => EventKind::PrMerged,
        }
    }

    /// Repository the event concerns.
    pub fn repository(&self) -> &RepositoryName {
        match self {
            Event::Deploy(e) => &e.repository,
            Event::PrOpened(e) => &e.repository,
            Event::PrMerged(e) => &e.repository,
        }
    }

    /// Who triggered the event.
    pub fn actor(&self) -> &UserLogin {
        match self {
            Event::Deploy(e) => &e.actor,
            Event::PrOpened(e) => &e.actor,
            Event::PrMerged(e) => &e.actor,
        }
    }

    /// When the event happened.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Event::Deploy(e) => e.timestamp,
            Event::PrOpened(e) => e.timestamp,
            Event::PrMerged(e) => e.timestamp,
        }
    }

    /// Deduplication identity of this event.
    pub fn dispatch_key(&self) -> DispatchKey {
        DispatchKey::for_event(self)
    }
}

// ---------------------------------------------------------------------------
// Dispatch key
// ---------------------------------------------------------------------------

/// Deterministic identity used to detect duplicate logical events.
///
/// Built from the event kind, the repository, the PR number or full commit
/// SHA, and (for deploys) the status. Actor and timestamp are deliberately
/// excluded: a platform retry of the same event may differ in both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DispatchKey(String);

impl DispatchKey {
    /// Derives the key for `event`.
    pub fn for_event(event: &Event) -> Self {
        let key = match event {
            Event::Deploy(e) => format!(
                "{}:{}:{}:{}",
                EventKind::Deploy,
                e.repository,
                e.sha,
                e.outcome.status()
            ),
            Event::PrOpened(e) => format!("{}:{}:{}", EventKind::PrOpened, e.repository, e.number),
            Event::PrMerged(e) => format!("{}:{}:{}", EventKind::PrMerged, e.repository, e.number),
        };
        Self(key)
    }

    /// Builds a key for a notification that is not a CI [`Event`] (e.g. the
    /// weekly report). `namespace` must not collide with an [`EventKind`] tag.
    pub fn custom(namespace: &str, parts: &[&str]) -> Self {
        let mut key = namespace.to_string();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        Self(key)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
