//! Test-only scripted modules and a shared call log.
//!
//! Modules move into the [`Path`](crate::core::path::Path) they are appended
//! to, so tests observe them through a [`CallLog`] cloned into each module.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::core::module::{EventSource, Flow, InitContext, Module, ModuleError, Outputs};
use crate::core::params::Params;
use crate::core::store::{Declarations, EventStore, StoreKey};
use crate::core::types::{EVENT_META, EventMetaData};

#[derive(Debug, Default)]
struct LogInner {
    /// `(module, action, event)` in call order.
    calls: Vec<(String, String, u64)>,
    current_event: u64,
    probes: BTreeMap<String, Vec<Option<u64>>>,
}

/// Shared record of lifecycle calls across scripted modules.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    inner: Rc<RefCell<LogInner>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, module: &str, action: &str) {
        let mut inner = self.inner.borrow_mut();
        let event = inner.current_event;
        inner
            .calls
            .push((module.to_string(), action.to_string(), event));
    }

    fn set_event(&self, event: u64) {
        self.inner.borrow_mut().current_event = event;
    }

    fn probe(&self, module: &str, value: Option<u64>) {
        self.inner
            .borrow_mut()
            .probes
            .entry(module.to_string())
            .or_default()
            .push(value);
    }

    pub fn count(&self, module: &str, action: &str) -> usize {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|(m, a, _)| m == module && a == action)
            .count()
    }

    /// One-based source event numbers at which `module` performed `action`.
    pub fn events_for(&self, module: &str, action: &str) -> Vec<u64> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|(m, a, _)| m == module && a == action)
            .map(|(_, _, event)| *event)
            .collect()
    }

    /// Modules that performed `action`, in call order.
    pub fn order(&self, action: &str) -> Vec<String> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|(_, a, _)| a == action)
            .map(|(m, _, _)| m.clone())
            .collect()
    }

    pub fn probes(&self, module: &str) -> Vec<Option<u64>> {
        self.inner
            .borrow()
            .probes
            .get(module)
            .cloned()
            .unwrap_or_default()
    }
}

/// Configurable non-source module.
pub struct ScriptedModule {
    name: String,
    params: Params,
    declarations: Declarations,
    log: Option<CallLog>,
    calls: u64,
    flows: BTreeMap<u64, Flow>,
    fail_on: Option<u64>,
    fail_init: bool,
    required_condition: Option<String>,
    write: Option<(StoreKey<u64>, Vec<u64>)>,
    probe: Option<StoreKey<u64>>,
}

impl ScriptedModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Params::new(),
            declarations: Declarations::new(),
            log: None,
            calls: 0,
            flows: BTreeMap::new(),
            fail_on: None,
            fail_init: false,
            required_condition: None,
            write: None,
            probe: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn logging(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn requiring<T: 'static>(mut self, key: StoreKey<T>) -> Self {
        self.declarations = self.declarations.requires(&key);
        self
    }

    pub fn providing<T: 'static>(mut self, key: StoreKey<T>) -> Self {
        self.declarations = self.declarations.provides(&key);
        self
    }

    pub fn depositing_histograms(mut self) -> Self {
        self.declarations = self.declarations.deposits_histograms();
        self
    }

    pub fn collecting_histograms(mut self) -> Self {
        self.declarations = self.declarations.collects_histograms();
        self
    }

    /// Return `flow` from the `call`-th (one-based) `process_event`.
    pub fn on_call(mut self, call: u64, flow: Flow) -> Self {
        self.flows.insert(call, flow);
        self
    }

    /// Fail fatally on the `call`-th (one-based) `process_event`.
    pub fn failing_on(mut self, call: u64) -> Self {
        self.fail_on = Some(call);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Resolve `key` from the conditions context during `initialize`.
    pub fn requiring_condition(mut self, key: &str) -> Self {
        self.required_condition = Some(key.to_string());
        self
    }

    /// Store the call number under `key` on the listed calls.
    pub fn writing_on(mut self, key: StoreKey<u64>, calls: &[u64]) -> Self {
        self.declarations = self.declarations.provides(&key);
        self.write = Some((key, calls.to_vec()));
        self
    }

    /// Record what `key` holds on every call.
    pub fn probing(mut self, key: StoreKey<u64>, log: &CallLog) -> Self {
        self.declarations = self.declarations.optional(&key);
        self.probe = Some(key);
        self.log = Some(log.clone());
        self
    }

    fn record(&self, action: &str) {
        if let Some(log) = &self.log {
            log.record(&self.name, action);
        }
    }
}

impl Module for ScriptedModule {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn declarations(&self) -> Declarations {
        self.declarations.clone()
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<(), ModuleError> {
        self.record("initialize");
        if self.fail_init {
            return Err(ModuleError::Resource(format!("{} not available", self.name)));
        }
        if let Some(key) = &self.required_condition {
            ctx.condition(key)?;
        }
        Ok(())
    }

    fn begin_run(&mut self, _meta: &EventMetaData) {
        self.record("begin_run");
    }

    fn process_event(&mut self, store: &mut EventStore) -> Result<Flow, ModuleError> {
        self.calls += 1;
        self.record("process");
        if self.fail_on == Some(self.calls) {
            return Err(ModuleError::Fatal(format!(
                "{} failed on call {}",
                self.name, self.calls
            )));
        }
        if let Some((key, calls)) = &self.write {
            if calls.contains(&self.calls) {
                store.put(key, self.calls);
            }
        }
        if let (Some(key), Some(log)) = (&self.probe, &self.log) {
            log.probe(&self.name, store.get(key).copied());
        }
        Ok(self.flows.get(&self.calls).copied().unwrap_or_default())
    }

    fn end_run(&mut self, _meta: &EventMetaData) {
        self.record("end_run");
    }

    fn finalize(&mut self, _outputs: &mut Outputs) -> Result<(), ModuleError> {
        self.record("finalize");
        Ok(())
    }
}

/// Source module yielding `available` events of metadata.
pub struct ScriptedSource {
    name: String,
    params: Params,
    available: u64,
    cursor: u64,
    runs: Vec<u32>,
    log: CallLog,
}

impl ScriptedSource {
    pub fn new(name: &str, available: u64, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            params: Params::new(),
            available,
            cursor: 0,
            runs: Vec::new(),
            log: log.clone(),
        }
    }

    /// Run number per event; events past the list stay in the last run.
    pub fn with_runs(mut self, runs: &[u32]) -> Self {
        self.runs = runs.to_vec();
        self
    }

    fn run_of(&self, idx: u64) -> u32 {
        let idx = idx as usize;
        self.runs
            .get(idx)
            .or_else(|| self.runs.last())
            .copied()
            .unwrap_or(1)
    }
}

impl Module for ScriptedSource {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn declarations(&self) -> Declarations {
        Declarations::new().provides(&EVENT_META)
    }

    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<(), ModuleError> {
        self.log.record(&self.name, "initialize");
        Ok(())
    }

    fn process_event(&mut self, store: &mut EventStore) -> Result<Flow, ModuleError> {
        if self.cursor >= self.available {
            return Err(ModuleError::Fatal("read past the last event".to_string()));
        }
        let idx = self.cursor;
        self.cursor += 1;
        self.log.set_event(self.cursor);
        self.log.record(&self.name, "process");
        store.put(
            &EVENT_META,
            EventMetaData {
                experiment: 0,
                run: self.run_of(idx),
                event: self.cursor,
            },
        );
        Ok(Flow::proceed())
    }

    fn finalize(&mut self, _outputs: &mut Outputs) -> Result<(), ModuleError> {
        self.log.record(&self.name, "finalize");
        Ok(())
    }

    fn as_source(&mut self) -> Option<&mut dyn EventSource> {
        Some(self)
    }
}

impl EventSource for ScriptedSource {
    fn available(&self) -> u64 {
        self.available
    }

    fn skip_event(&mut self) -> Result<(), ModuleError> {
        self.cursor += 1;
        self.log.set_event(self.cursor);
        self.log.record(&self.name, "skip");
        Ok(())
    }
}
