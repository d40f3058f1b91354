//! CI Notify HTTP event receiver.
//!
//! Exposes the [`notifier::Dispatcher`] to CI jobs over HTTP:
//!
//! | Route | Behavior |
//! |-------|----------|
//! | `POST /v1/events/{kind}` | Validate the JSON body as an event of `kind` and dispatch it |
//! | `GET /healthz` | Liveness probe, always `ok` |
//!
//! ## Status codes
//!
//! | Outcome | Status |
//! |---------|--------|
//! | delivered, suppressed | 200 |
//! | filtered by an admission predicate | 202 |
//! | missing or wrong ingest token | 401 |
//! | validation error (including unknown `kind`) | 422 |
//! | delivery failed | 502 |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Only HTTP concerns live here; every decision about
//! an event is made by the `notifier` crate.

mod error;
mod server;

pub use error::ListenerError;
pub use server::{router, serve, shutdown_signal, IngestToken};
