//! `Conditions`: checks up front that the listed conditions keys resolve.

use tracing::info;

use crate::core::module::{Flow, InitContext, Module, ModuleError, ParamsExt};
use crate::core::params::Params;
use crate::core::registry::BuildContext;
use crate::core::store::EventStore;

pub const TYPE_NAME: &str = "Conditions";

pub struct Conditions {
    params: Params,
    required: Vec<String>,
}

impl Conditions {
    pub fn build(ctx: BuildContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
        let params = ctx.params;
        params.reject_unknown(&["required"])?;
        let required = params.str_list_or_empty("required")?;
        Ok(Box::new(Self { params, required }))
    }
}

impl Module for Conditions {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<(), ModuleError> {
        for key in &self.required {
            ctx.condition(key)?;
            let resolved = ctx.conditions.lookup(key)?;
            info!(key = %key, tag = %resolved.tag, value = %resolved.value, "condition resolved");
        }
        Ok(())
    }

    fn process_event(&mut self, _store: &mut EventStore) -> Result<Flow, ModuleError> {
        Ok(Flow::proceed())
    }
}
