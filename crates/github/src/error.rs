//! GitHub adapter errors.

use thiserror::Error;

/// Failure of a GitHub GraphQL call.
#[derive(Debug, Error)]
pub enum GithubError {
    /// The HTTP exchange failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// GitHub answered with a non-2xx status.
    #[error("GitHub returned HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response carried a GraphQL `errors` array.
    #[error("GraphQL errors: {}", messages.join("; "))]
    GraphQl {
        /// One entry per reported error.
        messages: Vec<String>,
    },

    /// The response could not be decoded.
    #[error("unreadable response: {detail}")]
    MalformedResponse {
        /// Decoder diagnostic.
        detail: String,
    },
}
