//! Core notification domain for CI Notify.
//!
//! This crate turns CI lifecycle events (deploy finished, pull request opened,
//! pull request merged) into chat messages and makes sure each logical event
//! is posted at most once. Infrastructure crates implement the ports defined
//! here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No network I/O happens here. The
//! [`ChatBackend`] trait says *what* delivery needs; the `slack` crate says
//! *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RepositoryName`, `CommitSha`, …) |
//! | [`types`] | Shared value types (`EventKind`, `DeployStatus`, `Timestamp`) |
//! | [`errors`] | Validation and delivery errors, `RetryPolicy` |
//! | [`event`] | Typed events and `DispatchKey` |
//! | [`receiver`] | Payload validation and admission predicates |
//! | [`formatter`] | Event → `ChatMessage` |
//! | [`dedup`] | `Deduplicator` and the delivery record store |
//! | [`delivery`] | `ChatBackend` port, backoff schedule, delivery states |
//! | [`dispatch`] | `Dispatcher` gluing the above together |
//! | [`report`] | Weekly PR report aggregation and formatting |
//! | [`clock`] | `Clock` port |
//!
//! ## Data flow
//!
//! `EventReceiver` → `Deduplicator::should_dispatch` → `formatter::format` →
//! `ChatBackend::find_delivered` → `ChatBackend::send` →
//! `DispatchPermit::record_delivered`.

pub mod clock;
pub mod dedup;
pub mod delivery;
pub mod dispatch;
pub mod errors;
pub mod event;
pub mod formatter;
pub mod identifiers;
pub mod receiver;
pub mod report;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{
    DeliveryRecord, DispatchDecision, DispatchPermit, Deduplicator, DEFAULT_DEDUP_WINDOW,
};
pub use delivery::{Backoff, ChatBackend, DeliveryReceipt, DeliveryState, MAX_BACKEND_DELAY};
pub use dispatch::{DispatchOutcome, Dispatcher, IngestOutcome};
pub use errors::{DeliveryError, DeliveryErrorKind, RetryPolicy, ValidationError};
pub use event::{
    DeployEvent, DeployOutcome, DispatchKey, Event, PrMergedEvent, PrOpenedEvent, WebUrl,
};
pub use formatter::{ChatMessage, METADATA_EVENT_TYPE};
pub use identifiers::{
    BranchName, ChannelId, CommitSha, DispatchId, MessageId, OrgName, PullRequestNumber,
    RepositoryName, UserLogin, SHORT_SHA_LEN,
};
pub use receiver::{Admission, EventReceiver, FilterReason};
pub use types::{DeployStatus, EventKind, Timestamp};
