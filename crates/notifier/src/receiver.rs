//! Event receiver: raw payload + kind tag in, typed [`Event`] out.
//!
//! Validation is pure; the only input besides the payload is the receive
//! time, used when the payload carries no `timestamp`. Conditional triggers
//! that CI platforms usually express as workflow `if:` expressions (skip
//! draft PRs, skip PRs closed without merging) are the explicit predicates
//! [`is_draft_pull_request`] and [`is_unmerged_close`], evaluated after
//! validation and before admission.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::clock::{Clock, SystemClock};
use crate::errors::ValidationError;
use crate::event::{DeployEvent, DeployOutcome, Event, PrMergedEvent, PrOpenedEvent, WebUrl};
use crate::{
    BranchName, CommitSha, DeployStatus, EventKind, PullRequestNumber, RepositoryName, Timestamp,
    UserLogin,
};

/// Result of receiving a well-formed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The event should be dispatched.
    Admitted(Event),
    /// The payload is valid but an admission predicate rejected it.
    Filtered(FilterReason),
}

/// Why a valid payload was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    /// Opened pull request is still a draft.
    DraftPullRequest,
    /// Pull request was closed without being merged.
    ClosedWithoutMerge,
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::DraftPullRequest => f.write_str("draft pull request"),
            FilterReason::ClosedWithoutMerge => f.write_str("pull request closed without merge"),
        }
    }
}

/// Validates inbound payloads, stamping missing timestamps from its clock.
#[derive(Clone)]
pub struct EventReceiver {
    clock: Arc<dyn Clock>,
}

impl Default for EventReceiver {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl EventReceiver {
    /// Creates a receiver reading "now" from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Parses `body` as JSON and validates it as an event of kind `tag`.
    pub fn receive(&self, tag: &str, body: &[u8]) -> Result<Admission, ValidationError> {
        let kind = EventKind::from_tag(tag).ok_or_else(|| ValidationError::UnknownKind {
            tag: tag.to_string(),
        })?;
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ValidationError::MalformedJson {
                message: e.to_string(),
            })?;
        self.receive_value(kind, &value)
    }

    /// Validates an already-decoded payload.
    pub fn receive_value(
        &self,
        kind: EventKind,
        value: &Value,
    ) -> Result<Admission, ValidationError> {
        parse_event(kind, value, self.clock.now())
    }
}

/// Validates `value` as an event of `kind`; `received_at` is used when the
/// payload has no `timestamp`.
pub fn parse_event(
    kind: EventKind,
    value: &Value,
    received_at: Timestamp,
) -> Result<Admission, ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;
    match kind {
        EventKind::Deploy => {
            parse_deploy(obj, received_at).map(|e| Admission::Admitted(Event::Deploy(e)))
        }
        EventKind::PrOpened => {
            let event = parse_pr_opened(obj, received_at)?;
            if is_draft_pull_request(obj)? {
                return Ok(Admission::Filtered(FilterReason::DraftPullRequest));
            }
            Ok(Admission::Admitted(Event::PrOpened(event)))
        }
        EventKind::PrMerged => {
            let event = parse_pr_merged(obj, received_at)?;
            if is_unmerged_close(obj)? {
                return Ok(Admission::Filtered(FilterReason::ClosedWithoutMerge));
            }
            Ok(Admission::Admitted(Event::PrMerged(event)))
        }
    }
}

// ---------------------------------------------------------------------------
// Admission predicates
// ---------------------------------------------------------------------------

/// `true` when an opened-PR payload is flagged `draft`.
pub fn is_draft_pull_request(obj: &Map<String, Value>) -> Result<bool, ValidationError> {
    Ok(optional_bool(obj, "draft")?.unwrap_or(false))
}

/// `true` when a merged-PR payload explicitly says `merged: false`, i.e. the
/// close event of a PR that was not merged.
pub fn is_unmerged_close(obj: &Map<String, Value>) -> Result<bool, ValidationError> {
    Ok(optional_bool(obj, "merged")? == Some(false))
}

// ---------------------------------------------------------------------------
// Per-kind parsers
// ---------------------------------------------------------------------------

type Object = Map<String, Value>;

fn parse_deploy(obj: &Object, received_at: Timestamp) -> Result<DeployEvent, ValidationError> {
    let status_raw = required_str(obj, "status")?;
    let status = DeployStatus::parse(status_raw).ok_or_else(|| {
        let reason = format!("expected 'success' or 'failure', got '{status_raw}'");
        ValidationError::invalid("status", reason)
    })?;
    let sha_raw = required_str(obj, "sha")?;
    let sha = CommitSha::new(sha_raw).ok_or_else(|| {
        ValidationError::invalid("sha", "expected at least 7 hexadecimal characters")
    })?;

    let outcome = match status {
        DeployStatus::Success => DeployOutcome::Success,
        DeployStatus::Failure => DeployOutcome::Failure {
            log_url: url(obj, "log_url")?,
        },
    };

    Ok(DeployEvent {
        repository: repository(obj)?,
        actor: login(obj, "actor")?,
        timestamp: timestamp(obj, received_at)?,
        outcome,
        sha,
        branch: branch(obj, "branch")?,
    })
}

fn parse_pr_opened(
    obj: &Object,
    received_at: Timestamp,
) -> Result<PrOpenedEvent, ValidationError> {
    let author = login(obj, "author")?;
    let actor = optional_login(obj, "actor")?.unwrap_or_else(|| author.clone());
    Ok(PrOpenedEvent {
        repository: repository(obj)?,
        actor,
        timestamp: timestamp(obj, received_at)?,
        number: pr_number(obj)?,
        source_branch: branch(obj, "source_branch")?,
        target_branch: branch(obj, "target_branch")?,
        author,
        title: required_str(obj, "title")?.trim().to_string(),
        url: url(obj, "url")?,
    })
}

fn parse_pr_merged(
    obj: &Object,
    received_at: Timestamp,
) -> Result<PrMergedEvent, ValidationError> {
    let merger = login(obj, "merger")?;
    let actor = optional_login(obj, "actor")?.unwrap_or_else(|| merger.clone());
    Ok(PrMergedEvent {
        repository: repository(obj)?,
        actor,
        timestamp: timestamp(obj, received_at)?,
        number: pr_number(obj)?,
        author: login(obj, "author")?,
        source_branch: branch(obj, "source_branch")?,
        target_branch: branch(obj, "target_branch")?,
        merger,
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn optional_str<'a>(
    obj: &'a Object,
    field: &'static str,
) -> Result<Option<&'a str>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ValidationError::invalid(field, "expected a string")),
    }
}

fn required_str<'a>(obj: &'a Object, field: &'static str) -> Result<&'a str, ValidationError> {
    optional_str(obj, field)?.ok_or(ValidationError::MissingField { field })
}

fn optional_bool(obj: &Object, field: &'static str) -> Result<Option<bool>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        // CI expression templating renders booleans as strings.
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            "" => Ok(None),
            _ => Err(ValidationError::invalid(field, "expected a boolean")),
        },
        Some(_) => Err(ValidationError::invalid(field, "expected a boolean")),
    }
}

fn repository(obj: &Object) -> Result<RepositoryName, ValidationError> {
    let raw = required_str(obj, "repository")?;
    RepositoryName::new(raw).ok_or(ValidationError::MissingField { field: "repository" })
}

fn login(obj: &Object, field: &'static str) -> Result<UserLogin, ValidationError> {
    optional_login(obj, field)?.ok_or(ValidationError::MissingField { field })
}

fn optional_login(obj: &Object, field: &'static str) -> Result<Option<UserLogin>, ValidationError> {
    Ok(optional_str(obj, field)?.and_then(UserLogin::new))
}

fn branch(obj: &Object, field: &'static str) -> Result<BranchName, ValidationError> {
    let raw = required_str(obj, field)?;
    BranchName::new(raw).ok_or(ValidationError::MissingField { field })
}

fn url(obj: &Object, field: &'static str) -> Result<WebUrl, ValidationError> {
    let raw = required_str(obj, field)?;
    WebUrl::new(raw).ok_or_else(|| ValidationError::invalid(field, "expected an http(s) URL"))
}

fn timestamp(obj: &Object, received_at: Timestamp) -> Result<Timestamp, ValidationError> {
    match optional_str(obj, "timestamp")? {
        None => Ok(received_at),
        Some(raw) => Timestamp::parse_rfc3339(raw)
            .ok_or_else(|| ValidationError::invalid("timestamp", "expected an RFC 3339 date-time")),
    }
}

fn pr_number(obj: &Object) -> Result<PullRequestNumber, ValidationError> {
    const FIELD: &str = "number";
    let not_positive = || ValidationError::invalid(FIELD, "expected a positive integer");
    let raw = match obj.get(FIELD) {
        None | Some(Value::Null) => return Err(ValidationError::MissingField { field: FIELD }),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(not_positive)?,
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(ValidationError::MissingField { field: FIELD })
        }
        Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| not_positive())?,
        Some(_) => return Err(not_positive()),
    };
    PullRequestNumber::new(raw).ok_or_else(not_positive)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::event::fixtures::ts;

    fn now() -> Timestamp {
        ts("2026-03-06T07:00:00Z")
    }

    fn admitted(kind: EventKind, value: Value) -> Event {
        match parse_event(kind, &value, now()).unwrap() {
            Admission::Admitted(e) => e,
            other => panic!("expected admission, got {other:?}"),
        }
    }

    fn deploy_payload() -> Value {
        json!({
            "repository": "acme/api",
            "actor": "alice",
            "status": "failure",
            "sha": "abcdef1234",
            "branch": "main",
            "log_url": "http://x/log"
        })
    }

    fn pr_opened_payload() -> Value {
        json!({
            "repository": "acme/api",
            "number": 42,
            "source_branch": "feat/x",
            "target_branch": "main",
            "author": "bob",
            "title": "Add X",
            "url": "http://pr/42"
        })
    }

    fn pr_merged_payload() -> Value {
        json!({
            "repository": "acme/api",
            "number": "42",
            "author": "bob",
            "source_branch": "feat/x",
            "target_branch": "main",
            "merger": "carol"
        })
    }

    #[test]
    fn failed_deploy_keeps_log_url() {
        let Event::Deploy(e) = admitted(EventKind::Deploy, deploy_payload()) else {
            panic!("expected deploy");
        };
        assert_eq!(e.outcome.log_url().unwrap().as_str(), "http://x/log");
        assert_eq!(e.timestamp, now());
    }

    #[test]
    fn successful_deploy_drops_log_url() {
        let mut payload = deploy_payload();
        payload["status"] = json!("success");
        let Event::Deploy(e) = admitted(EventKind::Deploy, payload) else {
            panic!("expected deploy");
        };
        assert_eq!(e.outcome, DeployOutcome::Success);
    }

    #[test]
    fn failed_deploy_without_log_url_is_rejected() {
        let mut payload = deploy_payload();
        payload.as_object_mut().unwrap().remove("log_url");
        assert_eq!(
            parse_event(EventKind::Deploy, &payload, now()),
            Err(ValidationError::MissingField { field: "log_url" })
        );
    }

    #[test]
    fn explicit_timestamp_wins_over_receive_time() {
        let mut payload = deploy_payload();
        payload["timestamp"] = json!("2026-03-01T00:00:00Z");
        let event = admitted(EventKind::Deploy, payload);
        assert_eq!(event.timestamp(), ts("2026-03-01T00:00:00Z"));
    }

    #[test]
    fn pr_opened_actor_defaults_to_author() {
        let event = admitted(EventKind::PrOpened, pr_opened_payload());
        assert_eq!(event.actor().as_str(), "bob");
    }

    #[test]
    fn pr_merged_accepts_stringified_number() {
        let Event::PrMerged(e) = admitted(EventKind::PrMerged, pr_merged_payload()) else {
            panic!("expected merge");
        };
        assert_eq!(e.number.as_u64(), 42);
        assert_eq!(e.actor.as_str(), "carol");
    }

    #[rstest]
    #[case::zero(json!(0))]
    #[case::negative(json!(-3))]
    #[case::fraction(json!(4.5))]
    #[case::word(json!("forty-two"))]
    #[case::array(json!([42]))]
    fn pr_number_must_be_positive_integer(#[case] number: Value) {
        let mut payload = pr_opened_payload();
        payload["number"] = number;
        assert!(matches!(
            parse_event(EventKind::PrOpened, &payload, now()),
            Err(ValidationError::InvalidField { field: "number", .. })
        ));
    }

    #[rstest]
    #[case::repository("repository")]
    #[case::source_branch("source_branch")]
    #[case::target_branch("target_branch")]
    #[case::author("author")]
    #[case::title("title")]
    #[case::url("url")]
    #[case::number("number")]
    fn pr_opened_required_fields(#[case] field: &'static str) {
        let mut payload = pr_opened_payload();
        payload.as_object_mut().unwrap().remove(field);
        assert_eq!(
            parse_event(EventKind::PrOpened, &payload, now()),
            Err(ValidationError::MissingField { field })
        );
    }

    #[rstest]
    #[case::short_sha("sha", json!("abc12"))]
    #[case::non_hex_sha("sha", json!("zzzzzzzz"))]
    #[case::unknown_status("status", json!("cancelled"))]
    #[case::bad_url("log_url", json!("not a url"))]
    #[case::bad_timestamp("timestamp", json!("yesterday"))]
    #[case::numeric_branch("branch", json!(7))]
    fn deploy_malformed_fields(#[case] field: &'static str, #[case] value: Value) {
        let mut payload = deploy_payload();
        payload[field] = value;
        assert!(matches!(
            parse_event(EventKind::Deploy, &payload, now()),
            Err(ValidationError::InvalidField { field: f, .. }) if f == field
        ));
    }

    #[test]
    fn draft_pull_requests_are_filtered() {
        let mut payload = pr_opened_payload();
        payload["draft"] = json!("true");
        assert_eq!(
            parse_event(EventKind::PrOpened, &payload, now()),
            Ok(Admission::Filtered(FilterReason::DraftPullRequest))
        );
    }

    #[test]
    fn draft_filter_still_validates_first() {
        let mut payload = pr_opened_payload();
        payload["draft"] = json!(true);
        payload.as_object_mut().unwrap().remove("title");
        assert_eq!(
            parse_event(EventKind::PrOpened, &payload, now()),
            Err(ValidationError::MissingField { field: "title" })
        );
    }

    #[test]
    fn unmerged_close_is_filtered_but_missing_flag_is_admitted() {
        let mut payload = pr_merged_payload();
        assert!(matches!(
            parse_event(EventKind::PrMerged, &payload, now()),
            Ok(Admission::Admitted(_))
        ));
        payload["merged"] = json!(false);
        assert_eq!(
            parse_event(EventKind::PrMerged, &payload, now()),
            Ok(Admission::Filtered(FilterReason::ClosedWithoutMerge))
        );
    }

    #[test]
    fn receiver_rejects_unknown_kind_and_bad_json() {
        let receiver = EventReceiver::default();
        assert_eq!(
            receiver.receive("release", b"{}"),
            Err(ValidationError::UnknownKind {
                tag: "release".to_string()
            })
        );
        assert!(matches!(
            receiver.receive("deploy", b"{not json"),
            Err(ValidationError::MalformedJson { .. })
        ));
        assert_eq!(receiver.receive("deploy", b"[1,2]"), Err(ValidationError::NotAnObject));
    }
}
