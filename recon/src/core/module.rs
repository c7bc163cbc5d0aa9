//! The module contract: one independently configured unit of per-event work.
//!
//! Lifecycle, as driven by the runner:
//!
//! 1. [`Module::initialize`] once, before any event. Errors abort the run.
//! 2. [`Module::begin_run`] / [`Module::end_run`] around every experiment/run
//!    block seen in the input.
//! 3. [`Module::process_event`] once per event the module participates in.
//! 4. [`Module::finalize`] once, after the last event, in reverse path order.
//!
//! Modules communicate only through the [`EventStore`]; anything a module keeps
//! between events lives in its own fields.

use thiserror::Error;

use crate::core::context::{ContextError, GlobalContext, TagStore};
use crate::core::histogram::HistogramBook;
use crate::core::params::{ParamValue, Params};
use crate::core::store::{Declarations, EventStore};
use crate::core::types::EventMetaData;

/// What the runner should do with the rest of the chain after a module ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    /// Carry on with the next module.
    #[default]
    Continue,
    /// Stop this event's chain; the event still counts as processed.
    EndEvent,
    /// Finish this event's chain, then stop iterating.
    EndRun,
}

/// Result of a successful `process_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flow {
    /// Continue-signal for the sub-path attached to this module.
    pub condition: bool,
    pub signal: Signal,
}

impl Flow {
    pub const fn proceed() -> Self {
        Self {
            condition: true,
            signal: Signal::Continue,
        }
    }

    pub const fn condition(condition: bool) -> Self {
        Self {
            condition,
            signal: Signal::Continue,
        }
    }

    pub const fn end_event() -> Self {
        Self {
            condition: false,
            signal: Signal::EndEvent,
        }
    }

    pub const fn end_run() -> Self {
        Self {
            condition: true,
            signal: Signal::EndRun,
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }
}

impl Default for Flow {
    fn default() -> Self {
        Self::proceed()
    }
}

#[derive(Debug, Error)]
pub enum ModuleError {
    /// A parameter is missing, has the wrong type, or an invalid value.
    #[error("parameter '{key}': {message}")]
    Param { key: String, message: String },

    /// A conditions lookup failed.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A required resource (input file, payload, output) is unavailable.
    #[error("resource unavailable: {0}")]
    Resource(String),

    /// Irrecoverable failure while processing an event.
    #[error("{0}")]
    Fatal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ModuleError {
    pub fn param(key: &str, message: impl Into<String>) -> Self {
        ModuleError::Param {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Everything a module may consult during `initialize`.
pub struct InitContext<'a> {
    pub conditions: &'a GlobalContext,
    pub tag_store: &'a dyn TagStore,
}

impl InitContext<'_> {
    /// Highest-priority conditions value for `key`.
    pub fn condition(&self, key: &str) -> Result<&ParamValue, ContextError> {
        self.conditions.resolve(self.tag_store, key)
    }
}

/// Run-scoped outputs modules hand over at `finalize`.
#[derive(Debug, Default)]
pub struct Outputs {
    pub histograms: HistogramBook,
    /// Files written by sink modules, in the order they were written.
    pub written: Vec<std::path::PathBuf>,
}

/// Per-event processing unit.
pub trait Module {
    /// Registered type identifier (e.g. `EventInput`).
    fn type_name(&self) -> &str;

    /// Parameters as configured, for path listings.
    fn params(&self) -> &Params;

    /// Store slots this module provides, requires, or optionally reads.
    fn declarations(&self) -> Declarations {
        Declarations::new()
    }

    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<(), ModuleError> {
        Ok(())
    }

    fn begin_run(&mut self, _meta: &EventMetaData) {}

    fn process_event(&mut self, store: &mut EventStore) -> Result<Flow, ModuleError>;

    fn end_run(&mut self, _meta: &EventMetaData) {}

    /// Flush aggregated output. Errors are logged; they never fail the run.
    fn finalize(&mut self, _outputs: &mut Outputs) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Source capability, for modules that supply new events.
    fn as_source(&mut self) -> Option<&mut dyn EventSource> {
        None
    }
}

/// Capability of the module that feeds events into the store.
pub trait EventSource {
    /// Events available in total, known after `initialize`.
    fn available(&self) -> u64;

    /// Advance past one event without populating the store.
    fn skip_event(&mut self) -> Result<(), ModuleError>;
}

/// Typed accessors over [`Params`] that report errors as [`ModuleError::Param`].
pub trait ParamsExt {
    fn str_or(&self, key: &str, default: &str) -> Result<String, ModuleError>;
    fn float_or(&self, key: &str, default: f64) -> Result<f64, ModuleError>;
    fn str_list(&self, key: &str) -> Result<Vec<String>, ModuleError>;
    fn str_list_or_empty(&self, key: &str) -> Result<Vec<String>, ModuleError>;
    fn u64_or(&self, key: &str, default: u64) -> Result<u64, ModuleError>;
    fn reject_unknown(&self, known: &[&str]) -> Result<(), ModuleError>;
}

impl ParamsExt for Params {
    fn str_or(&self, key: &str, default: &str) -> Result<String, ModuleError> {
        match self.get(key) {
            None => Ok(default.to_string()),
            Some(value) => value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ModuleError::param(key, format!("expected string, got {}", value.kind()))),
        }
    }

    fn float_or(&self, key: &str, default: f64) -> Result<f64, ModuleError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_float()
                .ok_or_else(|| ModuleError::param(key, format!("expected number, got {}", value.kind()))),
        }
    }

    fn str_list(&self, key: &str) -> Result<Vec<String>, ModuleError> {
        let value = self
            .get(key)
            .ok_or_else(|| ModuleError::param(key, "required"))?;
        value
            .as_str_list()
            .ok_or_else(|| ModuleError::param(key, "expected a string or a list of strings"))
    }

    fn str_list_or_empty(&self, key: &str) -> Result<Vec<String>, ModuleError> {
        if self.get(key).is_none() {
            return Ok(Vec::new());
        }
        self.str_list(key)
    }

    fn u64_or(&self, key: &str, default: u64) -> Result<u64, ModuleError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_int()
                .and_then(|int| u64::try_from(int).ok())
                .ok_or_else(|| ModuleError::param(key, "expected a non-negative integer")),
        }
    }

    fn reject_unknown(&self, known: &[&str]) -> Result<(), ModuleError> {
        match self.keys().find(|key| !known.contains(key)) {
            Some(key) => Err(ModuleError::param(
                key,
                format!("unknown parameter (expected one of: {})", known.join(", ")),
            )),
            None => Ok(()),
        }
    }
}
