//! A `Transport` backed by ureq on tokio's blocking pool.
//!
//! # Design
//! ureq is blocking, so `send` hands the round-trip to
//! `tokio::task::spawn_blocking` and returns immediately. The worker writes
//! into a shared `FetchState` that the handle reads: a done flag,
//! received/expected byte counts for progress, and the finished response.
//! `dispose` raises an abort flag that the worker checks between body
//! chunks. A worker blocked in connect or in the response head cannot see
//! the flag; it is released by the agent's global deadline, which is always
//! finite.
//!
//! Responses with status >= 400 are reported as transport errors
//! (`"404 Not Found"`) with headers and body kept, matching how the
//! lifecycle expects a web primitive to behave.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use ureq::http::Response;
use ureq::{Agent, Body};

use crate::http::{HttpMethod, PreparedRequest};
use crate::transport::{Transport, TransportHandle};

const CHUNK_SIZE: usize = 8 * 1024;

/// Deadline for one round-trip on the ureq side, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UreqTransportConfig {
    /// Hard limit for the whole round-trip on the ureq side, in seconds.
    /// Non-positive or unrepresentable values fall back to
    /// `DEFAULT_REQUEST_TIMEOUT_SECS`.
    pub request_timeout_secs: f64,
    pub user_agent: String,
}

impl UreqTransportConfig {
    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout_secs > 0.0 {
            if let Ok(timeout) = Duration::try_from_secs_f64(self.request_timeout_secs) {
                return timeout;
            }
        }
        Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

impl Default for UreqTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: concat!("request-lifecycle/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
    user_agent: String,
    in_flight: Arc<AtomicUsize>,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(UreqTransportConfig::default())
    }
}

impl UreqTransport {
    pub fn new(config: UreqTransportConfig) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.request_timeout()))
            .build()
            .new_agent();
        Self {
            agent,
            user_agent: config.user_agent,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Workers still running a round-trip, disposed ones included. Shared by
    /// clones.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Decrements the in-flight count when a worker exits, panics included.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(count))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Transport for UreqTransport {
    type Handle = UreqHandle;

    fn send(&self, request: &PreparedRequest) -> UreqHandle {
        let state = Arc::new(FetchState::default());
        let worker_state = Arc::clone(&state);
        let agent = self.agent.clone();
        let mut request = request.clone();
        if !request
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
        {
            request
                .headers
                .push(("User-Agent".to_string(), self.user_agent.clone()));
        }

        match Handle::try_current() {
            Ok(runtime) => {
                let in_flight = InFlight::enter(&self.in_flight);
                runtime.spawn_blocking(move || {
                    let _in_flight = in_flight;
                    fetch(&agent, &request, &worker_state);
                });
            }
            Err(err) => {
                warn!(%err, "no tokio runtime for transport worker");
                state.finish_with_error(format!("no tokio runtime for transport worker: {err}"));
            }
        }

        UreqHandle { state }
    }
}

#[derive(Debug, Default)]
struct Fetched {
    headers: HashMap<String, String>,
    body: Vec<u8>,
    error: Option<String>,
    received: u64,
    expected: Option<u64>,
}

#[derive(Debug, Default)]
struct FetchState {
    done: AtomicBool,
    aborted: AtomicBool,
    fetched: Mutex<Fetched>,
}

impl FetchState {
    fn finish_with_error(&self, error: String) {
        self.fetched.lock().error = Some(error);
        self.done.store(true, Ordering::Release);
    }
}

fn fetch(agent: &Agent, request: &PreparedRequest, state: &FetchState) {
    debug!(url = %request.url, method = ?request.method, "transport fetch");
    let response = match (request.method, &request.form) {
        (HttpMethod::Post, Some(form)) => {
            let mut builder = agent.post(&request.url);
            for (k, v) in &request.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            builder.send_form(form.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        }
        (HttpMethod::Post, None) => {
            let mut builder = agent.post(&request.url);
            for (k, v) in &request.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            builder.send_empty()
        }
        (HttpMethod::Get, _) => {
            let mut builder = agent.get(&request.url);
            for (k, v) in &request.headers {
                builder = builder.header(k.as_str(), v.as_str());
            }
            builder.call()
        }
    };

    match response {
        Ok(response) => read_response(response, state),
        Err(err) => state.finish_with_error(err.to_string()),
    }
}

fn read_response(response: Response<Body>, state: &FetchState) {
    let (parts, body) = response.into_parts();
    let headers: HashMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    let expected = headers
        .get("content-length")
        .and_then(|v| v.parse::<u64>().ok());

    {
        let mut fetched = state.fetched.lock();
        fetched.headers = headers;
        fetched.expected = expected;
    }

    let mut reader = body.into_reader();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut read_error = None;
    loop {
        if state.aborted.load(Ordering::Acquire) {
            debug!("transport fetch aborted");
            break;
        }
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let mut fetched = state.fetched.lock();
                fetched.body.extend_from_slice(&chunk[..n]);
                fetched.received += n as u64;
            }
            Err(err) => {
                read_error = Some(err.to_string());
                break;
            }
        }
    }

    let status = parts.status;
    let error = read_error.or_else(|| {
        (status.as_u16() >= 400).then(|| {
            format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""))
                .trim_end()
                .to_string()
        })
    });

    state.fetched.lock().error = error;
    state.done.store(true, Ordering::Release);
}

/// Handle to one ureq round-trip running on the blocking pool.
#[derive(Debug)]
pub struct UreqHandle {
    state: Arc<FetchState>,
}

impl TransportHandle for UreqHandle {
    fn is_done(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }

    fn error(&self) -> Option<String> {
        self.state.fetched.lock().error.clone()
    }

    fn progress(&self) -> f32 {
        let fetched = self.state.fetched.lock();
        if self.is_done() && fetched.error.is_none() {
            return 1.0;
        }
        match fetched.expected {
            Some(expected) if expected > 0 => (fetched.received as f64 / expected as f64).min(1.0) as f32,
            _ => 0.0,
        }
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.state.fetched.lock().body).into_owned()
    }

    fn bytes(&self) -> Vec<u8> {
        self.state.fetched.lock().body.clone()
    }

    fn response_headers(&self) -> HashMap<String, String> {
        self.state.fetched.lock().headers.clone()
    }

    fn dispose(&mut self) {
        self.state.aborted.store(true, Ordering::Release);
    }
}
