//! Error types for the request lifecycle.
//!
//! # Design
//! Transport failures, timeouts and cancellations are not Rust errors: they
//! are terminal states recorded in the shared `HttpResult` and delivered
//! through the callbacks. The enums here cover local misuse only, which
//! never reaches the transport.

use thiserror::Error;

/// Errors returned by `RequestLifecycle::run` before any attempt starts.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The request cannot be sent (for example, it has no host).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Another run is in flight on this lifecycle.
    #[error("a request is already in flight on this lifecycle")]
    Busy,
}

/// Errors raised while loading a `LifecycleConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Lookup failures in a `DiagnosticRecorder`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("no stopwatch recorder named '{0}'")]
    UnknownTimer(String),

    #[error("no counter named '{0}'")]
    UnknownCounter(String),
}
