//! Drives one request through send, poll, retry and a single terminal
//! notification.
//!
//! # Design
//! A `RequestLifecycle` is a cheap, clonable handle over shared state: one
//! clone runs the request (`run` or `execute`) while others call `cancel` or
//! read `progress`. The run is an ordinary future. Its only suspension
//! points are the sleep between transport polls and the fixed delay before a
//! retry, and those are the only places cancellation and the timeout are
//! observed.
//!
//! Attempts are strictly sequential: the in-flight handle lives in a single
//! slot, and a second `run` while one is in flight is refused. Canceled and
//! timed-out attempts are terminal and never retried; only transport errors
//! consume the retry budget.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::diagnostics::DiagnosticRecorder;
use crate::error::LifecycleError;
use crate::http::{PreparedRequest, Request};
use crate::result::{messages, parse_status_header, status, HttpResult};
use crate::transport::{decode_payload, Transport, TransportHandle};

/// Timer fed with the duration of every attempt.
pub const ATTEMPT_TIMER: &str = "attempt";
/// Counter fed with the number of attempts of every run.
pub const ATTEMPTS_COUNTER: &str = "attempts";

type Callback = Box<dyn Fn(&HttpResult) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    success: Vec<Callback>,
    error: Vec<Callback>,
    finished: Vec<Callback>,
}

/// How a single attempt ended.
enum AttemptOutcome {
    Succeeded,
    Failed,
    /// Canceled or timed out.
    Aborted,
}

struct Inner<H> {
    config: LifecycleConfig,
    busy: AtomicBool,
    cancel: Mutex<CancellationToken>,
    /// The in-flight handle. Empty before the first attempt, during a retry
    /// delay, and after dispose.
    attempt: Mutex<Option<H>>,
    attempts: AtomicU32,
    callbacks: RwLock<Callbacks>,
    diagnostics: Mutex<Option<Arc<Mutex<DiagnosticRecorder>>>>,
}

/// Retry/timeout/cancel state machine for one request at a time.
///
/// Callbacks run on the task driving the request and must not register new
/// callbacks on the same lifecycle.
pub struct RequestLifecycle<T: Transport> {
    transport: Arc<T>,
    inner: Arc<Inner<T::Handle>>,
}

impl<T: Transport> Clone for RequestLifecycle<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Clears the busy flag and re-arms cancellation when a run ends. If the
/// run's future is dropped mid-attempt, the unfinished handle is disposed.
struct RunGuard<'a, H: TransportHandle> {
    inner: &'a Inner<H>,
}

impl<H: TransportHandle> Drop for RunGuard<'_, H> {
    fn drop(&mut self) {
        {
            let mut slot = self.inner.attempt.lock();
            if slot.as_ref().is_some_and(|handle| !handle.is_done()) {
                if let Some(mut handle) = slot.take() {
                    handle.dispose();
                }
            }
        }
        *self.inner.cancel.lock() = CancellationToken::new();
        self.inner.busy.store(false, Ordering::Release);
    }
}

impl<T: Transport> RequestLifecycle<T> {
    pub fn new(transport: T, config: LifecycleConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            inner: Arc::new(Inner {
                config,
                busy: AtomicBool::new(false),
                cancel: Mutex::new(CancellationToken::new()),
                attempt: Mutex::new(None),
                attempts: AtomicU32::new(0),
                callbacks: RwLock::new(Callbacks::default()),
                diagnostics: Mutex::new(None),
            }),
        }
    }

    /// Record attempt durations and per-run attempt counts into `recorder`.
    pub fn with_diagnostics(self, recorder: Arc<Mutex<DiagnosticRecorder>>) -> Self {
        self.set_diagnostics(recorder);
        self
    }

    /// Attach or replace the recorder on this lifecycle and all its clones.
    /// Takes effect from the next recorded attempt.
    pub fn set_diagnostics(&self, recorder: Arc<Mutex<DiagnosticRecorder>>) {
        *self.inner.diagnostics.lock() = Some(recorder);
    }

    fn diagnostics(&self) -> Option<Arc<Mutex<DiagnosticRecorder>>> {
        self.inner.diagnostics.lock().clone()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    /// Called when an attempt completes without a transport error.
    pub fn on_success(&self, f: impl Fn(&HttpResult) + Send + Sync + 'static) -> &Self {
        self.inner.callbacks.write().success.push(Box::new(f));
        self
    }

    /// Called once per run on the terminal failure: retries exhausted,
    /// canceled, or timed out.
    pub fn on_error(&self, f: impl Fn(&HttpResult) + Send + Sync + 'static) -> &Self {
        self.inner.callbacks.write().error.push(Box::new(f));
        self
    }

    /// Called exactly once per run, after `on_success` or the final `on_error`.
    pub fn on_finished(&self, f: impl Fn(&HttpResult) + Send + Sync + 'static) -> &Self {
        self.inner.callbacks.write().finished.push(Box::new(f));
        self
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Attempts started in the current or most recent run.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    /// Ask the in-flight attempt to stop. Observed at the next poll or at
    /// the end of a retry delay. A cancel issued while idle applies to the
    /// next run.
    pub fn cancel(&self) {
        self.inner.cancel.lock().cancel();
    }

    /// Transport progress in `[0, 1]`, or -1 when no attempt handle exists.
    pub fn progress(&self) -> f32 {
        self.inner
            .attempt
            .lock()
            .as_ref()
            .map_or(-1.0, |handle| handle.progress().clamp(0.0, 1.0))
    }

    /// Spawn `run` on the current tokio runtime.
    ///
    /// Returns `None`, without spawning, when the request is invalid or a
    /// run is already in flight.
    pub fn execute(&self, request: Request) -> Option<JoinHandle<HttpResult>> {
        self.try_acquire(&request).ok()?;
        let lifecycle = self.clone();
        Some(tokio::spawn(async move { lifecycle.run_acquired(request).await }))
    }

    /// Drive `request` to its terminal state and return the shared result.
    pub async fn run(&self, request: Request) -> Result<HttpResult, LifecycleError> {
        self.try_acquire(&request)?;
        Ok(self.run_acquired(request).await)
    }

    fn try_acquire(&self, request: &Request) -> Result<(), LifecycleError> {
        if let Err(err) = request.validate() {
            error!(%err, "refusing to execute request");
            return Err(err);
        }
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(host = %request.host, "lifecycle busy, execute ignored");
            return Err(LifecycleError::Busy);
        }
        Ok(())
    }

    async fn run_acquired(&self, request: Request) -> HttpResult {
        let _guard = RunGuard { inner: &self.inner };
        let span = info_span!("request", run_id = %Uuid::new_v4(), host = %request.host, path = %request.path);
        self.drive(&request).instrument(span).await
    }

    async fn drive(&self, request: &Request) -> HttpResult {
        let prepared = request.prepare();
        let cancel = self.inner.cancel.lock().clone();
        let config = &self.inner.config;
        let mut result = HttpResult::default();
        let mut retries_used = 0;
        self.inner.attempts.store(0, Ordering::Release);

        loop {
            let attempt = self.inner.attempts.fetch_add(1, Ordering::AcqRel) + 1;
            result.attempts = attempt;
            debug!(attempt, method = ?prepared.method, "starting attempt");

            match self.attempt(request, &prepared, &cancel, &mut result).await {
                AttemptOutcome::Succeeded => {
                    info!(attempt, elapsed_ms = result.time_elapsed.as_millis() as u64, "request succeeded");
                    self.fire(|c| &c.success, &result);
                    break;
                }
                AttemptOutcome::Aborted => {
                    warn!(attempt, status = result.status_code, error = %result.error, "attempt aborted");
                    self.fire(|c| &c.error, &result);
                    break;
                }
                AttemptOutcome::Failed if retries_used < config.retry_attempts => {
                    retries_used += 1;
                    warn!(
                        attempt,
                        status = result.status_code,
                        error = %result.error,
                        retries_left = config.retry_attempts - retries_used,
                        "attempt failed, retrying"
                    );
                    self.inner.attempt.lock().take();
                    if !self.retry_delay(&cancel).await {
                        mark_aborted(&mut result, status::CANCELED, messages::canceled(&request.host));
                        warn!(attempt, "canceled during retry delay");
                        self.fire(|c| &c.error, &result);
                        break;
                    }
                }
                AttemptOutcome::Failed => {
                    warn!(attempt, status = result.status_code, error = %result.error, "request failed");
                    self.fire(|c| &c.error, &result);
                    break;
                }
            }
        }

        if let Some(diagnostics) = self.diagnostics() {
            diagnostics
                .lock()
                .record_count(ATTEMPTS_COUNTER, result.attempts as i32, false);
        }
        self.fire(|c| &c.finished, &result);
        result
    }

    async fn attempt(
        &self,
        request: &Request,
        prepared: &PreparedRequest,
        cancel: &CancellationToken,
        result: &mut HttpResult,
    ) -> AttemptOutcome {
        let config = &self.inner.config;
        result.reset_for_attempt();
        let started = Instant::now();
        let handle = self.transport.send(prepared);
        *self.inner.attempt.lock() = Some(handle);

        loop {
            if self.handle_is_done() {
                break;
            }
            sleep(config.poll_interval()).await;
            result.time_elapsed = started.elapsed();

            if cancel.is_cancelled() {
                self.dispose_attempt();
                mark_aborted(result, status::CANCELED, messages::canceled(&request.host));
                self.record_attempt(result.time_elapsed);
                return AttemptOutcome::Aborted;
            }
            if let Some(timeout) = config.timeout() {
                if result.time_elapsed > timeout {
                    self.dispose_attempt();
                    let message = messages::timed_out(result.time_elapsed, &request.host);
                    mark_aborted(result, status::TIMEOUT, message);
                    self.record_attempt(result.time_elapsed);
                    return AttemptOutcome::Aborted;
                }
            }
        }

        result.time_elapsed = started.elapsed();
        self.record_attempt(result.time_elapsed);

        let slot = self.inner.attempt.lock();
        let Some(handle) = slot.as_ref() else {
            mark_aborted(result, status::CANCELED, messages::canceled(&request.host));
            return AttemptOutcome::Aborted;
        };
        result.response_headers = handle.response_headers();
        result.response = handle.text();

        match handle.error().filter(|e| !e.is_empty()) {
            None => {
                result.status_code = status::SUCCESS;
                result.is_success = true;
                result.is_error = false;
                result.error.clear();
                result.payload = decode_payload(handle, request.result_kind);
                AttemptOutcome::Succeeded
            }
            Some(error) => {
                result.status_code = parse_status_header(&result.response_headers).unwrap_or(status::FAILED);
                result.is_success = false;
                result.is_error = true;
                result.error = error;
                result.payload = None;
                AttemptOutcome::Failed
            }
        }
    }

    /// Wait out the retry delay. Returns false if canceled meanwhile.
    async fn retry_delay(&self, cancel: &CancellationToken) -> bool {
        let delay = self.inner.config.retry_delay();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    fn handle_is_done(&self) -> bool {
        self.inner
            .attempt
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_done())
    }

    fn dispose_attempt(&self) {
        if let Some(mut handle) = self.inner.attempt.lock().take() {
            handle.dispose();
        }
    }

    fn record_attempt(&self, elapsed: Duration) {
        if let Some(diagnostics) = self.diagnostics() {
            diagnostics.lock().record_duration(ATTEMPT_TIMER, elapsed);
        }
    }

    fn fire(&self, which: impl Fn(&Callbacks) -> &Vec<Callback>, result: &HttpResult) {
        let callbacks = self.inner.callbacks.read();
        for callback in which(&*callbacks) {
            callback(result);
        }
    }
}

fn mark_aborted(result: &mut HttpResult, status_code: i32, message: String) {
    result.status_code = status_code;
    result.error = message;
    result.is_error = true;
    result.is_success = false;
    result.payload = None;
}
