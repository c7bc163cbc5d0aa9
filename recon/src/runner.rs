//! Sequential event loop over a frozen [`Path`].
//!
//! The runner owns the [`EventStore`] and lends it to one module at a time.
//! Nothing here is concurrent: one event is in flight, and each module's
//! `process_event` runs to completion before the next module starts.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::context::{ContextError, GlobalContext, TagStore};
use crate::core::module::{InitContext, ModuleError, Outputs, Signal};
use crate::core::path::{Path, PathError};
use crate::core::stats::{ModuleStatistics, RunStatistics, StopReason};
use crate::core::store::EventStore;
use crate::core::types::{EVENT_META, EventMetaData};

/// Event cap and initial skip for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    /// `None` processes until the source is exhausted.
    pub max_events: Option<u64>,
    /// Events taken from the source and discarded before processing starts.
    pub skip_events: u64,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Assembly(#[from] PathError),

    #[error("path was already frozen; a path can be run only once")]
    AlreadyRun,

    #[error("path has no source module")]
    NoSource,

    #[error("global tag resolution failed: {0}")]
    Conditions(#[source] ContextError),

    #[error("module '{module}' failed to initialize: {source}")]
    Initialization {
        module: String,
        source: ModuleError,
        statistics: Box<RunStatistics>,
    },

    #[error("module '{module}' failed on event {event}: {source}")]
    Processing {
        module: String,
        /// Zero-based index of the event among all events read from the source.
        event: u64,
        source: ModuleError,
        statistics: Box<RunStatistics>,
    },
}

impl RunError {
    /// Statistics snapshot for failures that happened after assembly.
    pub fn statistics(&self) -> Option<&RunStatistics> {
        match self {
            RunError::Initialization { statistics, .. }
            | RunError::Processing { statistics, .. } => Some(statistics),
            _ => None,
        }
    }
}

/// What a successful run leaves behind.
#[derive(Debug)]
pub struct RunReport {
    pub statistics: RunStatistics,
    pub outputs: Outputs,
}

/// Single-use driver for one path.
pub struct Runner<'a> {
    options: RunOptions,
    conditions: &'a GlobalContext,
    tag_store: &'a dyn TagStore,
}

enum ChainEnd {
    Completed,
    EventEnded,
}

struct ChainFailure {
    module: String,
    error: ModuleError,
}

/// Mutable state threaded through one event's chain.
struct ChainState<'s> {
    store: &'s mut EventStore,
    stats: &'s mut RunStatistics,
    end_run_requested: bool,
}

impl<'a> Runner<'a> {
    pub fn new(
        options: RunOptions,
        conditions: &'a GlobalContext,
        tag_store: &'a dyn TagStore,
    ) -> Self {
        Self {
            options,
            conditions,
            tag_store,
        }
    }

    /// Freeze `path`, initialize, iterate events, finalize.
    #[instrument(skip_all, fields(max_events = ?self.options.max_events, skip_events = self.options.skip_events))]
    pub fn run(self, path: &mut Path) -> Result<RunReport, RunError> {
        let started = Instant::now();
        if path.is_frozen() {
            return Err(RunError::AlreadyRun);
        }
        let module_count = path.freeze();
        let violations = path.check_data_flow();
        if !violations.is_empty() {
            return Err(PathError::DataFlow { violations }.into());
        }
        let source_pos = path
            .entries_mut()
            .iter_mut()
            .position(|entry| entry.module.as_source().is_some())
            .ok_or(RunError::NoSource)?;
        self.conditions
            .resolve_with(self.tag_store)
            .map_err(RunError::Conditions)?;
        debug!(modules = module_count, tags = ?self.conditions.tags(), "path frozen");

        let mut stats = RunStatistics::new(
            path.flatten_mut()
                .iter()
                .map(|slot| ModuleStatistics::new(slot.name, slot.module.type_name()))
                .collect(),
        );

        let initialized = self.initialize_all(path, &mut stats);
        if let Err((module, source)) = initialized {
            let failed_at = stats
                .modules
                .iter()
                .position(|m| m.name == module)
                .unwrap_or(module_count);
            let mut outputs = Outputs::default();
            finalize_all(path, failed_at, &mut outputs);
            stats.settle(StopReason::InitializationFailed, started.elapsed());
            return Err(RunError::Initialization {
                module,
                source,
                statistics: Box::new(stats),
            });
        }

        let mut outputs = Outputs::default();
        let result = self.event_loop(path, source_pos, &mut stats);
        finalize_all(path, module_count, &mut outputs);

        match result {
            Ok(stop) => {
                stats.settle(stop, started.elapsed());
                info!(
                    processed = stats.processed,
                    skipped = stats.skipped,
                    stop = ?stats.stop,
                    "run finished"
                );
                Ok(RunReport {
                    statistics: stats,
                    outputs,
                })
            }
            Err((event, failure)) => {
                stats.failed += 1;
                stats.settle(StopReason::ProcessingFailed, started.elapsed());
                warn!(module = %failure.module, event, "run aborted");
                Err(RunError::Processing {
                    module: failure.module,
                    event,
                    source: failure.error,
                    statistics: Box::new(stats),
                })
            }
        }
    }

    fn initialize_all(
        &self,
        path: &mut Path,
        stats: &mut RunStatistics,
    ) -> Result<(), (String, ModuleError)> {
        let ctx = InitContext {
            conditions: self.conditions,
            tag_store: self.tag_store,
        };
        for slot in path.flatten_mut() {
            let started = Instant::now();
            let result = slot.module.initialize(&ctx);
            stats.modules[slot.id].init_time_us = started.elapsed().as_micros() as u64;
            if let Err(err) = result {
                warn!(module = slot.name, error = %err, "initialize failed");
                return Err((slot.name.to_string(), err));
            }
            debug!(module = slot.name, "initialized");
        }
        Ok(())
    }

    /// Returns the stop reason, or the failing event index and module.
    fn event_loop(
        &self,
        path: &mut Path,
        source_pos: usize,
        stats: &mut RunStatistics,
    ) -> Result<StopReason, (u64, ChainFailure)> {
        let entry = &mut path.entries_mut()[source_pos];
        let name = entry.name().to_string();
        let Some(source) = entry.module.as_source() else {
            return Ok(StopReason::Exhausted);
        };
        let available = source.available();
        let skipped = self.options.skip_events.min(available);
        let remaining = available - skipped;
        let to_process = self
            .options
            .max_events
            .map_or(remaining, |cap| cap.min(remaining));
        stats.available = available;
        stats.requested = skipped + to_process;

        for idx in 0..skipped {
            source.skip_event().map_err(|error| {
                (
                    idx,
                    ChainFailure {
                        module: name.clone(),
                        error,
                    },
                )
            })?;
            stats.skipped += 1;
        }
        info!(available, skipped, to_process, "starting event loop");

        let mut store = EventStore::new();
        let mut current_run: Option<EventMetaData> = None;
        let mut stop = if to_process < remaining {
            StopReason::CapReached
        } else {
            StopReason::Exhausted
        };

        for idx in 0..to_process {
            store.clear();
            let event = skipped + idx;
            let mut state = ChainState {
                store: &mut store,
                stats: &mut *stats,
                end_run_requested: false,
            };
            let outcome = run_top_level(path, source_pos, &mut state, &mut current_run);
            let end_run_requested = state.end_run_requested;
            outcome.map_err(|failure| (event, failure))?;
            stats.processed += 1;
            if end_run_requested {
                debug!(event, "end of run requested");
                stop = StopReason::EndRunRequested;
                break;
            }
        }

        if let Some(meta) = current_run {
            for slot in path.flatten_mut() {
                slot.module.end_run(&meta);
            }
        }
        Ok(stop)
    }
}

/// Run the top-level chain, announcing run boundaries once the source has
/// filled the store.
fn run_top_level(
    path: &mut Path,
    source_pos: usize,
    state: &mut ChainState<'_>,
    current_run: &mut Option<EventMetaData>,
) -> Result<ChainEnd, ChainFailure> {
    let len = path.entries().len();
    for pos in 0..len {
        let end = run_entry(path, pos, state)?;
        if pos == source_pos {
            announce_run_boundary(path, state.store, current_run);
        }
        if let ChainEnd::EventEnded = end {
            return Ok(ChainEnd::EventEnded);
        }
    }
    Ok(ChainEnd::Completed)
}

fn run_chain(path: &mut Path, state: &mut ChainState<'_>) -> Result<ChainEnd, ChainFailure> {
    for pos in 0..path.entries().len() {
        if let ChainEnd::EventEnded = run_entry(path, pos, state)? {
            return Ok(ChainEnd::EventEnded);
        }
    }
    Ok(ChainEnd::Completed)
}

/// Execute one module and, if its continue-signal is true, its condition path.
fn run_entry(
    path: &mut Path,
    pos: usize,
    state: &mut ChainState<'_>,
) -> Result<ChainEnd, ChainFailure> {
    let entry = &mut path.entries_mut()[pos];
    let started = Instant::now();
    let result = entry.module.process_event(state.store);
    let module_stats = &mut state.stats.modules[entry.id()];
    module_stats.record_call(started.elapsed());

    let flow = result.map_err(|error| ChainFailure {
        module: entry.name().to_string(),
        error,
    })?;
    if !flow.condition {
        module_stats.condition_false += 1;
    }
    match flow.signal {
        Signal::Continue => {}
        Signal::EndEvent => {
            module_stats.end_event_signals += 1;
            return Ok(ChainEnd::EventEnded);
        }
        Signal::EndRun => {
            module_stats.end_run_signals += 1;
            state.end_run_requested = true;
        }
    }

    if flow.condition {
        if let Some(sub) = entry.condition.as_mut() {
            return run_chain(sub, state);
        }
    }
    Ok(ChainEnd::Completed)
}

fn announce_run_boundary(
    path: &mut Path,
    store: &EventStore,
    current_run: &mut Option<EventMetaData>,
) {
    let Some(meta) = store.get(&EVENT_META).copied() else {
        return;
    };
    if current_run.map(|prev| prev.run_id()) == Some(meta.run_id()) {
        return;
    }
    if let Some(prev) = current_run.take() {
        for slot in path.flatten_mut() {
            slot.module.end_run(&prev);
        }
    }
    info!(experiment = meta.experiment, run = meta.run, "begin run");
    for slot in path.flatten_mut() {
        slot.module.begin_run(&meta);
    }
    *current_run = Some(meta);
}

/// Finalize the first `initialized` modules (depth-first ids) in reverse order.
fn finalize_all(path: &mut Path, initialized: usize, outputs: &mut Outputs) {
    for slot in path.flatten_mut().into_iter().rev() {
        if slot.id >= initialized {
            continue;
        }
        if let Err(err) = slot.module.finalize(outputs) {
            warn!(module = slot.name, error = %err, "finalize failed");
        } else {
            debug!(module = slot.name, "finalized");
        }
    }
    if !outputs.histograms.is_empty() {
        warn!(
            histograms = outputs.histograms.len(),
            "histograms left uncollected after finalize"
        );
    }
}

/// Format a duration the way run summaries print it.
pub fn format_wall_time(wall_time_us: u64) -> String {
    let wall = Duration::from_micros(wall_time_us);
    format!("{:.3}s", wall.as_secs_f64())
}
