//! GraphQL query text and response shapes.

use notifier::report::{CreatedPullRequest, Review, ReviewedPullRequest};
use notifier::Timestamp;
use serde::{Deserialize, Serialize};

/// PRs created in a window: author and repository only.
pub(crate) const CREATED_QUERY: &str = r#"
query($q: String!, $cursor: String) {
  search(query: $q, type: ISSUE, first: 100, after: $cursor) {
    issueCount
    pageInfo { hasNextPage endCursor }
    nodes {
      ... on PullRequest {
        number
        author { login }
        repository { name }
      }
    }
  }
}
"#;

/// PRs updated in a window, with their latest reviews.
pub(crate) const REVIEWED_QUERY: &str = r#"
query($q: String!, $cursor: String) {
  search(query: $q, type: ISSUE, first: 100, after: $cursor) {
    issueCount
    pageInfo { hasNextPage endCursor }
    nodes {
      ... on PullRequest {
        number
        repository { name }
        reviews(last: 100) {
          nodes {
            author { login }
            createdAt
            comments { totalCount }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub query: &'a str,
    pub variables: Variables<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Variables<'a> {
    pub q: &'a str,
    pub cursor: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Response<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEntry {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchData<N> {
    pub search: SearchConnection<N>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchConnection<N> {
    #[serde(default)]
    pub issue_count: u64,
    pub page_info: PageInfo,
    #[serde(default = "Vec::new")]
    pub nodes: Vec<Option<N>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Actor {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryRef {
    pub name: String,
}

/// Search nodes that are not pull requests deserialize with every field absent.
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedNode {
    #[serde(default)]
    pub author: Option<Actor>,
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewedNode {
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    #[serde(default)]
    pub reviews: Option<ReviewConnection>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewConnection {
    #[serde(default)]
    pub nodes: Vec<Option<ReviewNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReviewNode {
    #[serde(default)]
    pub author: Option<Actor>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub comments: Option<TotalCount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TotalCount {
    pub total_count: u64,
}

impl CreatedNode {
    pub fn into_activity(self) -> Option<CreatedPullRequest> {
        Some(CreatedPullRequest {
            repository: self.repository?.name,
            author: self.author.map(|a| a.login),
        })
    }
}

impl ReviewedNode {
    pub fn into_activity(self) -> Option<ReviewedPullRequest> {
        let repository = self.repository?.name;
        let reviews = self
            .reviews
            .map(|c| c.nodes)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(|r| Review {
                author: r.author.map(|a| a.login),
                created_at: r.created_at.as_deref().and_then(Timestamp::parse_rfc3339),
                comment_count: r.comments.map_or(0, |c| c.total_count),
            })
            .collect();
        Some(ReviewedPullRequest { repository, reviews })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn non_pull_request_nodes_are_skipped() {
        let page: SearchConnection<CreatedNode> = serde_json::from_value(json!({
            "issueCount": 3,
            "pageInfo": { "hasNextPage": false, "endCursor": null },
            "nodes": [
                { "number": 1, "author": { "login": "alice" }, "repository": { "name": "api" } },
                {},
                null,
                { "number": 2, "author": null, "repository": { "name": "web" } }
            ]
        }))
        .unwrap();

        let activity: Vec<_> = page
            .nodes
            .into_iter()
            .flatten()
            .filter_map(CreatedNode::into_activity)
            .collect();
        assert_eq!(
            activity,
            vec![
                CreatedPullRequest {
                    repository: "api".to_string(),
                    author: Some("alice".to_string())
                },
                CreatedPullRequest {
                    repository: "web".to_string(),
                    author: None
                },
            ]
        );
    }

    #[test]
    fn reviews_map_timestamps_and_comment_counts() {
        let node: ReviewedNode = serde_json::from_value(json!({
            "number": 7,
            "repository": { "name": "api" },
            "reviews": { "nodes": [
                {
                    "author": { "login": "carol" },
                    "createdAt": "2026-03-03T02:00:00Z",
                    "comments": { "totalCount": 4 }
                },
                { "author": null, "createdAt": "not a date", "comments": { "totalCount": 1 } }
            ]}
        }))
        .unwrap();

        let pr = node.into_activity().unwrap();
        assert_eq!(pr.repository, "api");
        assert_eq!(pr.reviews.len(), 2);
        assert_eq!(pr.reviews[0].author.as_deref(), Some("carol"));
        assert_eq!(pr.reviews[0].comment_count, 4);
        assert!(pr.reviews[0].created_at.is_some());
        assert_eq!(pr.reviews[1].author, None);
        assert_eq!(pr.reviews[1].created_at, None);
    }
}
