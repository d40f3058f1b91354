//! `GithubClient` against an in-process mock GraphQL endpoint.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use github::{GithubClient, GithubConfig, GithubError, GithubToken, MAX_SEARCH_RESULTS};
use notifier::report::ReportWindow;
use notifier::{OrgName, Timestamp};
use serde_json::{json, Value};

type Responder = Box<dyn Fn(&Value) -> Value + Send + Sync>;

struct Mock {
    respond: Responder,
    requests: Mutex<Vec<(HeaderMap, Value)>>,
}

async fn graphql(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let reply = (mock.respond)(&body);
    mock.requests.lock().unwrap().push((headers, body));
    Json(reply)
}

async fn spawn(respond: Responder) -> (Arc<Mock>, GithubClient) {
    let mock = Arc::new(Mock {
        respond,
        requests: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/graphql", post(graphql))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = GithubConfig::new(GithubToken::new("ghp_test").unwrap());
    config.graphql_url = format!("http://{addr}/graphql");
    (mock, GithubClient::new(config).unwrap())
}

fn window() -> ReportWindow {
    ReportWindow::ending_at(Timestamp::parse_rfc3339("2026-03-04T01:00:00Z").unwrap())
}

fn org() -> OrgName {
    OrgName::new("acme").unwrap()
}

fn page(nodes: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "data": {
            "search": {
                "issueCount": nodes.len(),
                "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next },
                "nodes": nodes
            }
        }
    })
}

fn pr(repo: &str, login: &str) -> Value {
    json!({ "number": 1, "author": { "login": login }, "repository": { "name": repo } })
}

#[tokio::test]
async fn follows_cursors_until_last_page() {
    let (mock, client) = spawn(Box::new(|body: &Value| match body["variables"]["cursor"].as_str() {
        None => page(vec![pr("api", "alice"), pr("web", "bob")], Some("c1")),
        Some("c1") => page(vec![pr("api", "carol")], None),
        Some(other) => panic!("unexpected cursor {other}"),
    }))
    .await;

    let created = client.search_created(&org(), &window()).await.unwrap();
    let repos: Vec<_> = created.iter().map(|pr| pr.repository.as_str()).collect();
    assert_eq!(repos, ["api", "web", "api"]);

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let (headers, body) = &requests[0];
    assert_eq!(headers["authorization"], "Bearer ghp_test");
    assert_eq!(
        body["variables"]["q"],
        "org:acme type:pr created:2026-02-27T07:00:00Z..2026-03-06T07:00:00Z"
    );
    assert!(body["query"].as_str().unwrap().contains("first: 100"));
}

#[tokio::test]
async fn stops_at_the_search_result_cap() {
    let (mock, client) = spawn(Box::new(|_: &Value| {
        let nodes = (0..100).map(|_| pr("api", "alice")).collect();
        page(nodes, Some("more"))
    }))
    .await;

    let created = client.search_created(&org(), &window()).await.unwrap();
    assert_eq!(created.len(), MAX_SEARCH_RESULTS);
    assert_eq!(mock.requests.lock().unwrap().len(), MAX_SEARCH_RESULTS / 100);
}

#[tokio::test]
async fn reviewed_search_uses_updated_qualifier() {
    let (mock, client) = spawn(Box::new(|_: &Value| {
        page(
            vec![json!({
                "number": 9,
                "repository": { "name": "api" },
                "reviews": { "nodes": [
                    {
                        "author": { "login": "carol" },
                        "createdAt": "2026-03-02T00:00:00Z",
                        "comments": { "totalCount": 3 }
                    }
                ]}
            })],
            None,
        )
    }))
    .await;

    let reviewed = client.search_reviewed(&org(), &window()).await.unwrap();
    assert_eq!(reviewed.len(), 1);
    assert_eq!(reviewed[0].reviews[0].comment_count, 3);

    let requests = mock.requests.lock().unwrap();
    assert!(requests[0].1["variables"]["q"]
        .as_str()
        .unwrap()
        .contains("updated:2026-02-27T07:00:00Z..2026-03-06T07:00:00Z"));
}

#[tokio::test]
async fn graphql_errors_are_surfaced() {
    let (_mock, client) = spawn(Box::new(|_: &Value| {
        json!({ "data": null, "errors": [{ "message": "Could not resolve to an Organization" }] })
    }))
    .await;

    let err = client.search_created(&org(), &window()).await.unwrap_err();
    match err {
        GithubError::GraphQl { messages } => {
            assert_eq!(messages, vec!["Could not resolve to an Organization".to_string()]);
        }
        other => panic!("expected GraphQL error, got {other:?}"),
    }
}
