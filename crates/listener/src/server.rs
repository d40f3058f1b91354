//! Router, handlers, and server lifecycle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use notifier::{DispatchOutcome, Dispatcher, IngestOutcome};
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ListenerError};

/// Shared secret CI jobs present as `Authorization: Bearer <token>`.
#[derive(Clone, PartialEq, Eq)]
pub struct IngestToken(String);

impl IngestToken {
    /// Wraps a token, returning `None` if it is blank.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let token = token.trim();
        (!token.is_empty()).then(|| Self(token.to_string()))
    }

    fn matches(&self, presented: &str) -> bool {
        // Compare every byte so timing does not reveal the matching prefix.
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        expected.len() == presented.len()
            && expected
                .iter()
                .zip(presented)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl std::fmt::Debug for IngestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IngestToken(***)")
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    ingest_token: Option<IngestToken>,
}

impl AppState {
    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = &self.ingest_token else {
            return Ok(());
        };
        match bearer_token(headers) {
            Some(token) if expected.matches(token) => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

/// Builds the HTTP router. Without an `ingest_token` every request is accepted.
pub fn router(dispatcher: Arc<Dispatcher>, ingest_token: Option<IngestToken>) -> Router {
    let state = AppState {
        dispatcher,
        ingest_token,
    };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/events/{kind}", post(ingest_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ingest_event(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    state.authorize(&headers)?;
    let outcome = state.dispatcher.ingest(&kind, &body).await?;
    let status = match &outcome {
        IngestOutcome::Filtered(_) => StatusCode::ACCEPTED,
        IngestOutcome::Dispatched(DispatchOutcome::Failed { .. }) => StatusCode::BAD_GATEWAY,
        IngestOutcome::Dispatched(_) => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// Binds `addr` and serves `app` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish after `shutdown` fires.
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;
    let local = listener.local_addr().map_err(ListenerError::Serve)?;
    tracing::info!(addr = %local, "listening for CI events");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ListenerError::Serve)
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown requested");
}
