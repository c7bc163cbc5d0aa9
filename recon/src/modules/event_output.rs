//! `EventOutput`: writes the events that reach it as a JSON Lines record file.
//!
//! Attached to a conditional sub-path it keeps only the selected events.
//! Records stream into `<file>.tmp` from `initialize` on and the file is
//! renamed into place at finalize.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

use crate::core::module::{Flow, InitContext, Module, ModuleError, Outputs, ParamsExt};
use crate::core::params::Params;
use crate::core::registry::BuildContext;
use crate::core::store::{Declarations, EventStore, SlotId};
use crate::core::template::render_file_name;
use crate::core::types::{EVENT_META, TRACKS};
use crate::io::event_file::EventRecord;
use crate::io::output::LineWriter;

pub const TYPE_NAME: &str = "EventOutput";
const DEFAULT_FILE_NAME: &str = "events.jsonl";

pub struct EventOutput {
    params: Params,
    output: PathBuf,
    branch_names: Vec<String>,
    writer: Option<LineWriter>,
}

impl EventOutput {
    pub fn build(ctx: BuildContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
        let params = ctx.params;
        params.reject_unknown(&["output_file_name", "branch_names"])?;
        let template = params.str_or("output_file_name", DEFAULT_FILE_NAME)?;
        let file_name = render_file_name(&template, ctx.templates)
            .map_err(|err| ModuleError::param("output_file_name", err.to_string()))?;
        if file_name.is_empty() {
            return Err(ModuleError::param("output_file_name", "renders to an empty name"));
        }
        let branch_names = params.str_list_or_empty("branch_names")?;
        Ok(Box::new(Self {
            params,
            output: PathBuf::from(file_name),
            branch_names,
            writer: None,
        }))
    }
}

impl Module for EventOutput {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn declarations(&self) -> Declarations {
        let mut decl = Declarations::new().requires(&EVENT_META).optional(&TRACKS);
        for name in &self.branch_names {
            decl.optional.push(SlotId::dynamic::<serde_json::Value>(name));
        }
        decl
    }

    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<(), ModuleError> {
        let writer = LineWriter::create(&self.output)
            .map_err(|err| ModuleError::Resource(format!("{err:#}")))?;
        self.writer = Some(writer);
        Ok(())
    }

    fn process_event(&mut self, store: &mut EventStore) -> Result<Flow, ModuleError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(ModuleError::Fatal("output file is not open".to_string()));
        };
        let meta = store
            .get(&EVENT_META)
            .copied()
            .ok_or_else(|| ModuleError::Fatal("EventMetaData missing from the store".to_string()))?;
        let mut extra = BTreeMap::new();
        for name in &self.branch_names {
            if let Some(value) = store.get_dynamic::<serde_json::Value>(name) {
                extra.insert(name.clone(), value.clone());
            }
        }
        let record = EventRecord {
            meta,
            tracks: store.get(&TRACKS).cloned().unwrap_or_default(),
            extra,
        };
        let line = serde_json::to_string(&record)
            .map_err(|err| ModuleError::Fatal(format!("serialize event record: {err}")))?;
        writer.write_line(&line)?;
        Ok(Flow::proceed())
    }

    fn finalize(&mut self, outputs: &mut Outputs) -> Result<(), ModuleError> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let events = writer.lines();
        let written = writer.commit()?;
        info!(file = %written.display(), events, "wrote event records");
        outputs.written.push(written);
        Ok(())
    }
}
