//! Rolling statistics for counts and timings.
//!
//! `Counter` and `StopwatchRecorder` keep running aggregates rather than the
//! full sample history. `DiagnosticRecorder` groups them by name; a
//! `RequestLifecycle` can feed one with per-attempt timings.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::DiagnosticsError;

/// Min, max, sum and average of the counts recorded into it.
#[derive(Debug, Clone)]
pub struct Counter {
    min: i32,
    max: i32,
    sum: i64,
    count: u64,
    last: Option<i32>,
}

impl Default for Counter {
    fn default() -> Self {
        Self {
            min: i32::MAX,
            max: i32::MIN,
            sum: 0,
            count: 0,
            last: None,
        }
    }
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `value`. Zero is skipped unless `capture_zero` is set.
    pub fn record(&mut self, value: i32, capture_zero: bool) {
        if value == 0 && !capture_zero {
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += i64::from(value);
        self.count += 1;
        self.last = Some(value);
    }

    /// `i32::MAX` until something is recorded.
    pub fn min(&self) -> i32 {
        self.min
    }

    /// `i32::MIN` until something is recorded.
    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn sum(&self) -> i64 {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The last captured value, or -1 when empty.
    pub fn last(&self) -> i32 {
        self.last.unwrap_or(-1)
    }

    /// Integer average, 0 when empty.
    pub fn average(&self) -> i32 {
        if self.count == 0 {
            return 0;
        }
        (self.sum / self.count as i64) as i32
    }
}

/// A restartable stopwatch that aggregates the length of every run.
#[derive(Debug, Clone, Default)]
pub struct StopwatchRecorder {
    started: Option<Instant>,
    min_ms: Option<u64>,
    max_ms: u64,
    total_ms: u64,
    runs: u64,
    last_ms: Option<u64>,
}

impl StopwatchRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// End the current run and record it. Ignored when not running.
    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.record(started.elapsed());
        }
    }

    /// Record a run measured elsewhere.
    pub fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        self.min_ms = Some(self.min_ms.map_or(ms, |min| min.min(ms)));
        self.max_ms = self.max_ms.max(ms);
        self.total_ms += ms;
        self.runs += 1;
        self.last_ms = Some(ms);
    }

    pub fn min_ms(&self) -> u64 {
        self.min_ms.unwrap_or(0)
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Length of the last run, or -1 when nothing has been recorded.
    pub fn last_ms(&self) -> i64 {
        self.last_ms.map_or(-1, |ms| ms as i64)
    }

    pub fn average_ms(&self) -> f64 {
        if self.runs == 0 {
            return 0.0;
        }
        self.total_ms as f64 / self.runs as f64
    }
}

/// Named timers and counters.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticRecorder {
    timers: BTreeMap<String, StopwatchRecorder>,
    counters: BTreeMap<String, Counter>,
}

impl DiagnosticRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timer(&mut self, name: &str) {
        self.timers.entry(name.to_string()).or_default().start();
    }

    pub fn stop_timer(&mut self, name: &str) {
        if let Some(timer) = self.timers.get_mut(name) {
            timer.stop();
        }
    }

    pub fn record_duration(&mut self, name: &str, elapsed: Duration) {
        self.timers.entry(name.to_string()).or_default().record(elapsed);
    }

    pub fn record_count(&mut self, name: &str, value: i32, capture_zero: bool) {
        self.counters
            .entry(name.to_string())
            .or_default()
            .record(value, capture_zero);
    }

    pub fn stopwatch(&self, name: &str) -> Result<&StopwatchRecorder, DiagnosticsError> {
        self.timers
            .get(name)
            .ok_or_else(|| DiagnosticsError::UnknownTimer(name.to_string()))
    }

    pub fn counter(&self, name: &str) -> Result<&Counter, DiagnosticsError> {
        self.counters
            .get(name)
            .ok_or_else(|| DiagnosticsError::UnknownCounter(name.to_string()))
    }
}

impl fmt::Display for DiagnosticRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.timers.is_empty() {
            writeln!(f, "Timers (ms)")?;
        }
        for (name, t) in &self.timers {
            writeln!(
                f,
                "{name}\nLast: {}\tMin: {}\tMax: {}\tAvg: {:.1}\tTotal: {}",
                t.last_ms(),
                t.min_ms(),
                t.max_ms(),
                t.average_ms(),
                t.total_ms()
            )?;
        }
        if !self.counters.is_empty() {
            writeln!(f, "Counters")?;
        }
        for (name, c) in &self.counters {
            writeln!(
                f,
                "{name}\nLast: {}\tMin: {}\tMax: {}\tAvg: {}\tSum: {}",
                c.last(),
                c.min(),
                c.max(),
                c.average(),
                c.sum()
            )?;
        }
        Ok(())
    }
}
