//! `EventInput`: the source module reading JSON Lines event files.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::core::module::{EventSource, Flow, InitContext, Module, ModuleError, ParamsExt};
use crate::core::params::Params;
use crate::core::registry::BuildContext;
use crate::core::store::{Declarations, EventStore, SlotId};
use crate::core::types::{EVENT_META, TRACKS};
use crate::io::event_file::{EventReader, count_events, expand_inputs};

pub const TYPE_NAME: &str = "EventInput";

pub struct EventInput {
    params: Params,
    patterns: Vec<String>,
    /// Extra raw entries to keep; empty keeps every entry found.
    branch_names: Vec<String>,
    files: Vec<PathBuf>,
    available: u64,
    reader: Option<EventReader>,
}

impl EventInput {
    pub fn build(ctx: BuildContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
        Ok(Box::new(Self::from_params(ctx.params)?))
    }

    pub fn from_params(params: Params) -> Result<Self, ModuleError> {
        params.reject_unknown(&["input_files", "branch_names"])?;
        let patterns = params.str_list("input_files")?;
        if patterns.is_empty() {
            return Err(ModuleError::param("input_files", "must name at least one file"));
        }
        let branch_names = params.str_list_or_empty("branch_names")?;
        Ok(Self {
            params,
            patterns,
            branch_names,
            files: Vec::new(),
            available: 0,
            reader: None,
        })
    }

    /// Files resolved by `initialize`, in read order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn reader(&mut self) -> Result<&mut EventReader, ModuleError> {
        self.reader
            .as_mut()
            .ok_or_else(|| ModuleError::Fatal("EventInput used before initialize".to_string()))
    }
}

impl Module for EventInput {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn declarations(&self) -> Declarations {
        self.branch_names.iter().fold(
            Declarations::new().provides(&EVENT_META).provides(&TRACKS),
            |decl, name| decl.provides_slot(SlotId::dynamic::<serde_json::Value>(name)),
        )
    }

    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<(), ModuleError> {
        let files = expand_inputs(&self.patterns)
            .map_err(|err| ModuleError::Resource(format!("{err:#}")))?;
        let available =
            count_events(&files).map_err(|err| ModuleError::Resource(format!("{err:#}")))?;
        info!(files = files.len(), events = available, "opened event input");
        self.reader = Some(EventReader::new(files.clone()));
        self.files = files;
        self.available = available;
        Ok(())
    }

    fn process_event(&mut self, store: &mut EventStore) -> Result<Flow, ModuleError> {
        let record = self
            .reader()?
            .read()
            .map_err(|err| ModuleError::Fatal(format!("{err:#}")))?
            .ok_or_else(|| ModuleError::Fatal("event input exhausted".to_string()))?;

        store.put(&EVENT_META, record.meta);
        store.put(&TRACKS, record.tracks);
        for (name, value) in record.extra {
            if self.branch_names.is_empty() || self.branch_names.contains(&name) {
                store.put_dynamic(&name, value);
            } else {
                debug!(branch = %name, "dropping unlisted input branch");
            }
        }
        Ok(Flow::proceed())
    }

    fn as_source(&mut self) -> Option<&mut dyn EventSource> {
        Some(self)
    }
}

impl EventSource for EventInput {
    fn available(&self) -> u64 {
        self.available
    }

    fn skip_event(&mut self) -> Result<(), ModuleError> {
        let advanced = self
            .reader()?
            .skip()
            .map_err(|err| ModuleError::Fatal(format!("{err:#}")))?;
        if advanced {
            Ok(())
        } else {
            Err(ModuleError::Fatal("event input exhausted while skipping".to_string()))
        }
    }
}
