//! Startup-time registry mapping module identifiers to factories.

use std::collections::BTreeMap;

use crate::core::module::{Module, ModuleError};
use crate::core::params::Params;
use crate::core::template::TemplateVars;

/// Inputs handed to a factory when a steering entry is instantiated.
pub struct BuildContext<'a> {
    pub params: Params,
    pub templates: &'a TemplateVars,
}

pub type Factory = fn(BuildContext<'_>) -> Result<Box<dyn Module>, ModuleError>;

struct Registration {
    description: &'static str,
    factory: Factory,
}

#[derive(Default)]
pub struct ModuleRegistry {
    entries: BTreeMap<&'static str, Registration>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `id`. A later registration replaces an earlier one.
    pub fn register(&mut self, id: &'static str, description: &'static str, factory: Factory) {
        self.entries.insert(
            id,
            Registration {
                description,
                factory,
            },
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// `(id, description)` pairs in lexicographic order.
    pub fn list(&self) -> Vec<(&'static str, &'static str)> {
        self.entries
            .iter()
            .map(|(id, reg)| (*id, reg.description))
            .collect()
    }

    pub fn build(
        &self,
        id: &str,
        params: Params,
        templates: &TemplateVars,
    ) -> Result<Box<dyn Module>, ModuleError> {
        let reg = self.entries.get(id).ok_or_else(|| {
            ModuleError::Resource(format!(
                "no module registered as '{id}' (known: {})",
                self.entries.keys().copied().collect::<Vec<_>>().join(", ")
            ))
        })?;
        (reg.factory)(BuildContext { params, templates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModule;

    fn scripted(ctx: BuildContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
        Ok(Box::new(ScriptedModule::new("Scripted").with_params(ctx.params)))
    }

    #[test]
    fn builds_registered_modules() {
        let mut registry = ModuleRegistry::new();
        registry.register("Scripted", "test module", scripted);
        let module = registry
            .build("Scripted", Params::new().with("x", 1i64), &TemplateVars::new())
            .expect("build");
        assert_eq!(module.type_name(), "Scripted");
        assert_eq!(module.params().keys().collect::<Vec<_>>(), vec!["x"]);
        assert_eq!(registry.list(), vec![("Scripted", "test module")]);
    }

    #[test]
    fn unknown_identifier_names_known_ones() {
        let mut registry = ModuleRegistry::new();
        registry.register("Scripted", "test module", scripted);
        let err = registry
            .build("Nope", Params::new(), &TemplateVars::new())
            .err()
            .expect("unknown");
        assert!(err.to_string().contains("known: Scripted"));
    }
}
