//! [`GithubClient`]: paginated pull request search.

use std::time::Duration;

use notifier::report::{CreatedPullRequest, ReportWindow, ReviewedPullRequest};
use notifier::OrgName;
use serde::de::DeserializeOwned;

use crate::error::GithubError;
use crate::graphql::{self, CreatedNode, Request, Response, ReviewedNode, SearchData, Variables};

/// Public GitHub GraphQL endpoint.
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// GitHub search never returns more than this many results per query.
pub const MAX_SEARCH_RESULTS: usize = 1000;

const ERROR_BODY_LIMIT: usize = 512;

/// A GitHub token. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct GithubToken(String);

impl GithubToken {
    /// Wraps a token, returning `None` if it is blank.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let token = token.trim();
        (!token.is_empty()).then(|| Self(token.to_string()))
    }
}

impl std::fmt::Debug for GithubToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GithubToken(***)")
    }
}

/// Connection settings for [`GithubClient`].
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// Token with `read:org` and `repo` scopes.
    pub token: GithubToken,
    /// GraphQL endpoint.
    pub graphql_url: String,
    /// Upper bound on a single HTTP exchange.
    pub request_timeout: Duration,
}

impl GithubConfig {
    /// Configuration for github.com.
    pub fn new(token: GithubToken) -> Self {
        Self {
            token,
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// GitHub GraphQL client for the weekly report.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    config: GithubConfig,
}

impl GithubClient {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: GithubConfig) -> Result<Self, GithubError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("cinotify/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// PRs in `org` created within `window`.
    pub async fn search_created(
        &self,
        org: &OrgName,
        window: &ReportWindow,
    ) -> Result<Vec<CreatedPullRequest>, GithubError> {
        let q = search_query(org, "created", window);
        let nodes: Vec<CreatedNode> = self.paginate(graphql::CREATED_QUERY, &q).await?;
        Ok(nodes.into_iter().filter_map(CreatedNode::into_activity).collect())
    }

    /// PRs in `org` updated within `window`, with their latest reviews.
    ///
    /// Reviews are returned unfiltered; [`notifier::report::aggregate`]
    /// keeps only those submitted inside the window.
    pub async fn search_reviewed(
        &self,
        org: &OrgName,
        window: &ReportWindow,
    ) -> Result<Vec<ReviewedPullRequest>, GithubError> {
        let q = search_query(org, "updated", window);
        let nodes: Vec<ReviewedNode> = self.paginate(graphql::REVIEWED_QUERY, &q).await?;
        Ok(nodes.into_iter().filter_map(ReviewedNode::into_activity).collect())
    }

    #[tracing::instrument(skip(self, query))]
    async fn paginate<N: DeserializeOwned>(
        &self,
        query: &str,
        q: &str,
    ) -> Result<Vec<N>, GithubError> {
        let mut cursor: Option<String> = None;
        let mut results = Vec::new();
        loop {
            let page = self
                .execute::<SearchData<N>>(&Request {
                    query,
                    variables: Variables {
                        q,
                        cursor: cursor.as_deref(),
                    },
                })
                .await?
                .search;
            tracing::debug!(
                issue_count = page.issue_count,
                page_len = page.nodes.len(),
                "search page"
            );
            results.extend(page.nodes.into_iter().flatten());

            if !page.page_info.has_next_page {
                break;
            }
            if results.len() >= MAX_SEARCH_RESULTS {
                tracing::warn!(
                    fetched = results.len(),
                    "search result cap reached; some pull requests may be missing"
                );
                break;
            }
            match page.page_info.end_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(results)
    }

    async fn execute<T: DeserializeOwned>(&self, request: &Request<'_>) -> Result<T, GithubError> {
        let response = self
            .http
            .post(&self.config.graphql_url)
            .bearer_auth(&self.config.token.0)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, ERROR_BODY_LIMIT));
            return Err(GithubError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Response<T> = response
            .json()
            .await
            .map_err(|e| GithubError::MalformedResponse { detail: e.to_string() })?;
        if !parsed.errors.is_empty() {
            return Err(GithubError::GraphQl {
                messages: parsed.errors.into_iter().map(|e| e.message).collect(),
            });
        }
        parsed.data.ok_or_else(|| GithubError::MalformedResponse {
            detail: "response has neither data nor errors".to_string(),
        })
    }
}

fn search_query(org: &OrgName, qualifier: &str, window: &ReportWindow) -> String {
    format!(
        "org:{org} type:pr {qualifier}:{}..{}",
        ReportWindow::search_bound(window.since),
        ReportWindow::search_bound(window.until)
    )
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
