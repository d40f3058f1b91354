//! Newtype domain identifiers.
//!
//! Every concept that has an identity is a distinct newtype wrapping a
//! primitive, so a [`BranchName`] can never be passed where a [`ChannelId`]
//! is expected even though both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is blank.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else if trimmed.len() == v.len() {
                    Some(Self(v))
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// A repository name, usually in `"owner/repo"` format.
    RepositoryName
}

string_id! {
    /// A Git branch name (e.g. `"main"`, `"feat/x"`).
    BranchName
}

string_id! {
    /// A platform user login (PR author, merger, or the actor who triggered a job).
    UserLogin
}

string_id! {
    /// A GitHub organization login, used to scope the weekly report search.
    OrgName
}

string_id! {
    /// Destination chat channel identifier (e.g. Slack `C0123456789`).
    ChannelId
}

string_id! {
    /// Backend-assigned identifier of a delivered message (Slack `ts`).
    MessageId
}

// ---------------------------------------------------------------------------
// Commit SHA
// ---------------------------------------------------------------------------

/// Length of the abbreviated commit SHA shown in chat messages.
pub const SHORT_SHA_LEN: usize = 7;

/// A Git commit SHA: at least [`SHORT_SHA_LEN`] hex characters, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitSha(String);

impl CommitSha {
    /// Creates a [`CommitSha`], returning `None` if `value` is shorter than
    /// seven characters or contains non-hex characters.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let v = value.as_ref().trim();
        if v.len() < SHORT_SHA_LEN || !v.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(v.to_ascii_lowercase()))
    }

    /// Returns the full SHA.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first seven characters.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_SHA_LEN]
    }
}

impl std::fmt::Display for CommitSha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Pull request number
// ---------------------------------------------------------------------------

/// A pull request number as assigned by the hosting platform (strictly positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PullRequestNumber(u64);

impl PullRequestNumber {
    /// Creates a [`PullRequestNumber`], returning `None` for zero.
    pub fn new(value: u64) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PullRequestNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single dispatch (one pass through dedup, formatting, and delivery).
///
/// Generated fresh for every dispatch and recorded on its tracing span so all
/// delivery attempts for one event can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchId(Uuid);

impl DispatchId {
    /// Generates a new random dispatch identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
