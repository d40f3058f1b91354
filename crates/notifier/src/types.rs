//! Shared value types for the notification domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaning beyond identity: the kind of CI event, a deploy outcome, and the
//! wall-clock time used for dedup-window bookkeeping.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The kind of CI lifecycle event a payload describes.
///
/// The wire tag (`deploy`, `pr_opened`, `pr_merged`) is what CI jobs put in
/// the URL path or the `--kind` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A deployment finished (successfully or not).
    Deploy,
    /// A pull request was opened (or marked ready for review).
    PrOpened,
    /// A pull request was merged.
    PrMerged,
}

impl EventKind {
    /// Returns the canonical wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Deploy => "deploy",
            EventKind::PrOpened => "pr_opened",
            EventKind::PrMerged => "pr_merged",
        }
    }

    /// Parses a wire tag. `-` is accepted in place of `_` (`pr-opened`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "deploy" => Some(EventKind::Deploy),
            "pr_opened" => Some(EventKind::PrOpened),
            "pr_merged" => Some(EventKind::PrMerged),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------

/// Outcome of a deployment job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    /// The deployment succeeded.
    Success,
    /// The deployment failed; the event carries a log URL.
    Failure,
}

impl DeployStatus {
    /// Returns the wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            DeployStatus::Success => "success",
            DeployStatus::Failure => "failure",
        }
    }

    /// Parses the wire representation (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(DeployStatus::Success),
            "failure" => Some(DeployStatus::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses an RFC 3339 string (any offset), normalised to UTC.
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Time elapsed from `earlier` to `self`; zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }

    /// Returns `self + d`, saturating at the maximum representable time.
    pub fn plus(self, d: Duration) -> Self {
        let delta = chrono::Duration::from_std(d).unwrap_or(chrono::TimeDelta::MAX);
        Self(self.0.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Returns `self - d`, saturating at the minimum representable time.
    pub fn minus(self, d: Duration) -> Self {
        let delta = chrono::Duration::from_std(d).unwrap_or(chrono::TimeDelta::MAX);
        Self(self.0.checked_sub_signed(delta).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_accepts_hyphenated_tags() {
        assert_eq!(EventKind::from_tag("pr-opened"), Some(EventKind::PrOpened));
        assert_eq!(EventKind::from_tag("PR_MERGED"), Some(EventKind::PrMerged));
        assert_eq!(EventKind::from_tag("release"), None);
    }

    #[test]
    fn timestamp_parses_offsets_to_utc() {
        let ts = Timestamp::parse_rfc3339("2026-01-02T18:00:00+09:00").unwrap();
        assert_eq!(ts.to_string(), "2026-01-02T09:00:00+00:00");
    }

    #[test]
    fn saturating_since_never_goes_negative() {
        let a = Timestamp::parse_rfc3339("2026-01-01T00:00:00Z").unwrap();
        let b = a.plus(Duration::from_secs(30));
        assert_eq!(b.saturating_since(a), Duration::from_secs(30));
        assert_eq!(a.saturating_since(b), Duration::ZERO);
        assert_eq!(b.minus(Duration::from_secs(30)), a);
    }
}
