//! CI Notify GitHub adapter.
//!
//! Fetches an organization's pull request activity through the GitHub
//! GraphQL search API and maps it into the raw activity types of
//! [`notifier::report`]. Aggregation and formatting stay in `notifier`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Authentication, query text, and pagination live here.
//! Search results are capped at [`MAX_SEARCH_RESULTS`] per query, the limit
//! GitHub search imposes; hitting the cap is logged as a warning.

mod client;
mod error;
mod graphql;

pub use client::{GithubClient, GithubConfig, GithubToken, DEFAULT_GRAPHQL_URL, MAX_SEARCH_RESULTS};
pub use error::GithubError;
