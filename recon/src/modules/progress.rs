//! `Progress`: logs the number of processed events on a decade schedule.

use tracing::info;

use crate::core::module::{Flow, Module, ModuleError, ParamsExt};
use crate::core::params::Params;
use crate::core::registry::BuildContext;
use crate::core::store::{Declarations, EventStore};
use crate::core::types::{EVENT_META, EventMetaData};

pub const TYPE_NAME: &str = "Progress";

#[derive(Default)]
pub struct Progress {
    params: Params,
    seen: u64,
}

impl Progress {
    pub fn build(ctx: BuildContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
        ctx.params.reject_unknown(&[])?;
        Ok(Box::new(Self {
            params: ctx.params,
            ..Self::default()
        }))
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}

/// 1..=9, then 10, 20, .., 90, then 100, 200, .., 900, and so on.
pub fn is_milestone(count: u64) -> bool {
    if count == 0 {
        return false;
    }
    let mut step = 1u64;
    while count / step >= 10 {
        step *= 10;
    }
    count % step == 0
}

impl Module for Progress {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn declarations(&self) -> Declarations {
        Declarations::new().optional(&EVENT_META)
    }

    fn begin_run(&mut self, meta: &EventMetaData) {
        info!(experiment = meta.experiment, run = meta.run, "begin run");
    }

    fn process_event(&mut self, store: &mut EventStore) -> Result<Flow, ModuleError> {
        self.seen += 1;
        if is_milestone(self.seen) {
            match store.get(&EVENT_META) {
                Some(meta) => info!(
                    processed = self.seen,
                    experiment = meta.experiment,
                    run = meta.run,
                    event = meta.event,
                    "progress"
                ),
                None => info!(processed = self.seen, "progress"),
            }
        }
        Ok(Flow::proceed())
    }

    fn end_run(&mut self, meta: &EventMetaData) {
        info!(
            experiment = meta.experiment,
            run = meta.run,
            processed = self.seen,
            "end run"
        );
    }
}
