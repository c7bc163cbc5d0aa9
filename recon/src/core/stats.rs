//! Per-module and per-run counters collected by the runner.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

/// Counters for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleStatistics {
    pub name: String,
    pub type_name: String,
    /// `process_event` invocations.
    pub calls: u64,
    /// Wall time spent in `process_event`, in microseconds.
    pub time_us: u64,
    /// Wall time spent in `initialize`, in microseconds.
    pub init_time_us: u64,
    /// Events whose chain this module ended early.
    pub end_event_signals: u64,
    /// Run terminations requested by this module.
    pub end_run_signals: u64,
    /// Events on which the continue-signal was false.
    pub condition_false: u64,
}

impl ModuleStatistics {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            ..Self::default()
        }
    }

    pub fn terminations(&self) -> u64 {
        self.end_event_signals + self.end_run_signals
    }

    pub(crate) fn record_call(&mut self, elapsed: Duration) {
        self.calls += 1;
        self.time_us += elapsed.as_micros() as u64;
    }

    pub fn mean_time_us(&self) -> Option<f64> {
        if self.calls == 0 {
            return None;
        }
        Some(self.time_us as f64 / self.calls as f64)
    }
}

/// Why event iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The source ran out of events.
    Exhausted,
    /// The event cap was reached.
    CapReached,
    /// A module requested the end of the run.
    EndRunRequested,
    /// Initialization failed; no events were attempted.
    InitializationFailed,
    /// A module failed fatally while processing an event.
    ProcessingFailed,
}

/// Run-level counters plus the per-module table.
///
/// `requested` is the number of events the run planned to take from the
/// source: the skipped prefix plus the capped remainder. Events that were
/// planned but never reached because the run ended early are `unvisited`, so
/// `processed + skipped + failed + unvisited == requested` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub available: u64,
    pub requested: u64,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub unvisited: u64,
    pub stop: StopReason,
    pub wall_time_us: u64,
    pub modules: Vec<ModuleStatistics>,
}

impl RunStatistics {
    pub(crate) fn new(modules: Vec<ModuleStatistics>) -> Self {
        Self {
            available: 0,
            requested: 0,
            processed: 0,
            skipped: 0,
            failed: 0,
            unvisited: 0,
            stop: StopReason::Exhausted,
            wall_time_us: 0,
            modules,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.processed + self.skipped + self.failed + self.unvisited == self.requested
    }

    pub fn module(&self, name: &str) -> Option<&ModuleStatistics> {
        self.modules.iter().find(|stats| stats.name == name)
    }

    /// Close the books: whatever was requested and not accounted for is unvisited.
    pub(crate) fn settle(&mut self, stop: StopReason, wall: Duration) {
        self.stop = stop;
        self.wall_time_us = wall.as_micros() as u64;
        let accounted = self.processed + self.skipped + self.failed;
        self.unvisited = self.requested.saturating_sub(accounted);
    }

    /// Plain-text table for the end-of-run summary.
    pub fn render_table(&self) -> String {
        let width = self
            .modules
            .iter()
            .map(|stats| stats.name.len())
            .max()
            .unwrap_or(0)
            .max("Name".len());
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$} | {:>8} | {:>12} | {:>10} | {:>6}",
            "Name", "Calls", "Time(ms)", "Mean(us)", "Ends"
        );
        let _ = writeln!(out, "{}", "-".repeat(width + 49));
        for stats in &self.modules {
            let mean = stats
                .mean_time_us()
                .map(|mean| format!("{mean:.1}"))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<width$} | {:>8} | {:>12.3} | {:>10} | {:>6}",
                stats.name,
                stats.calls,
                stats.time_us as f64 / 1000.0,
                mean,
                stats.terminations()
            );
        }
        let _ = writeln!(
            out,
            "events: requested={} processed={} skipped={} failed={} unvisited={} stop={:?}",
            self.requested, self.processed, self.skipped, self.failed, self.unvisited, self.stop
        );
        out
    }
}
