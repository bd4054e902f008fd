//! Scripted in-memory transport for deterministic lifecycle tests.
//!
//! # Design
//! Each `send` pops the next `Script`; the last script repeats once the
//! queue is drained. Completion is measured with `tokio::time::Instant`, so
//! tests running with `start_paused = true` advance through timeouts and
//! retry delays without real waiting.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use request_lifecycle::{PreparedRequest, Transport, TransportHandle};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Script {
    /// `None` never completes.
    pub completes_after: Option<Duration>,
    pub error: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub progress: f32,
}

impl Script {
    pub fn ok(body: &str) -> Self {
        Self {
            completes_after: Some(Duration::ZERO),
            error: None,
            headers: HashMap::new(),
            body: body.as_bytes().to_vec(),
            progress: 1.0,
        }
    }

    pub fn fail(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::ok("")
        }
    }

    pub fn hang() -> Self {
        Self {
            completes_after: None,
            progress: 0.5,
            ..Self::ok("")
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.completes_after = Some(delay);
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn progress(mut self, progress: f32) -> Self {
        self.progress = progress;
        self
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub sent: AtomicUsize,
    pub disposed: AtomicUsize,
}

#[derive(Debug)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    last: Mutex<Option<Script>>,
    requests: Mutex<Vec<PreparedRequest>>,
    pub counters: Arc<Counters>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn always(script: Script) -> Arc<Self> {
        Self::new(vec![script])
    }

    pub fn sent(&self) -> usize {
        self.counters.sent.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.counters.disposed.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    type Handle = ScriptedHandle;

    fn send(&self, request: &PreparedRequest) -> ScriptedHandle {
        self.counters.sent.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let script = match self.scripts.lock().pop_front() {
            Some(script) => {
                *self.last.lock() = Some(script.clone());
                script
            }
            None => self
                .last
                .lock()
                .clone()
                .unwrap_or_else(Script::hang),
        };
        ScriptedHandle {
            ready_at: script.completes_after.map(|d| Instant::now() + d),
            script,
            counters: Arc::clone(&self.counters),
        }
    }
}

#[derive(Debug)]
pub struct ScriptedHandle {
    script: Script,
    ready_at: Option<Instant>,
    counters: Arc<Counters>,
}

impl TransportHandle for ScriptedHandle {
    fn is_done(&self) -> bool {
        self.ready_at.is_some_and(|at| Instant::now() >= at)
    }

    fn error(&self) -> Option<String> {
        self.script.error.clone()
    }

    fn progress(&self) -> f32 {
        self.script.progress
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.script.body).into_owned()
    }

    fn bytes(&self) -> Vec<u8> {
        self.script.body.clone()
    }

    fn response_headers(&self) -> HashMap<String, String> {
        self.script.headers.clone()
    }

    fn dispose(&mut self) {
        self.counters.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Callback invocation counts for one lifecycle.
#[derive(Debug, Default)]
pub struct Calls {
    pub success: AtomicUsize,
    pub error: AtomicUsize,
    pub finished: AtomicUsize,
}

impl Calls {
    pub fn success(&self) -> usize {
        self.success.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> usize {
        self.error.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Register counting callbacks on `lifecycle`.
pub fn count_calls<T: Transport>(lifecycle: &request_lifecycle::RequestLifecycle<T>) -> Arc<Calls> {
    let calls = Arc::new(Calls::default());
    let (s, e, f) = (Arc::clone(&calls), Arc::clone(&calls), Arc::clone(&calls));
    lifecycle
        .on_success(move |_| {
            s.success.fetch_add(1, Ordering::SeqCst);
        })
        .on_error(move |_| {
            e.error.fetch_add(1, Ordering::SeqCst);
        })
        .on_finished(move |_| {
            f.finished.fetch_add(1, Ordering::SeqCst);
        });
    calls
}
