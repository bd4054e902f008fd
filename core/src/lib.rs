//! Retry/timeout/cancel lifecycle for network requests over a pluggable
//! transport.
//!
//! # Overview
//! A `RequestLifecycle` executes one `Request` at a time against a
//! `Transport`, polling the in-flight attempt, applying a timeout and a
//! bounded fixed-delay retry policy, and delivering exactly one terminal
//! notification. The transport is an external collaborator: the core never
//! opens sockets itself. `UreqTransport` is the bundled HTTP implementation.
//!
//! # Design
//! - `Request` is immutable data; `prepare` turns it into the escaped URL,
//!   headers and form body a transport receives.
//! - One `HttpResult` per run is shared by every attempt and is the only
//!   value handed back to callers.
//! - Transport errors consume the retry budget; cancellation and timeouts
//!   are terminal.
//! - `diagnostics` holds the rolling counters the lifecycle can feed.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod result;
pub mod transport;
pub mod ureq_transport;

pub use config::LifecycleConfig;
pub use diagnostics::{Counter, DiagnosticRecorder, StopwatchRecorder};
pub use error::{ConfigError, DiagnosticsError, LifecycleError};
pub use http::{AuthMode, Credentials, HttpMethod, PreparedRequest, Request};
pub use lifecycle::RequestLifecycle;
pub use result::{status, AudioClip, HttpResult, Payload, ResultKind, Texture};
pub use transport::{Transport, TransportHandle};
pub use ureq_transport::{UreqHandle, UreqTransport, UreqTransportConfig};
