//! `HistoManager`: writes every histogram deposited during finalize to one file.
//!
//! Finalize runs in reverse path order, so every module that deposits
//! histograms must come after this one. Path assembly rejects the opposite.

use std::path::PathBuf;

use tracing::info;

use crate::core::module::{Flow, Module, ModuleError, Outputs, ParamsExt};
use crate::core::params::Params;
use crate::core::registry::BuildContext;
use crate::core::store::{Declarations, EventStore};
use crate::core::template::render_file_name;
use crate::io::output::write_json;

pub const TYPE_NAME: &str = "HistoManager";
const DEFAULT_FILE_NAME: &str = "histofile.json";

pub struct HistoManager {
    params: Params,
    output: PathBuf,
}

impl HistoManager {
    pub fn build(ctx: BuildContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
        let params = ctx.params;
        params.reject_unknown(&["histo_file_name"])?;
        let template = params.str_or("histo_file_name", DEFAULT_FILE_NAME)?;
        let file_name = render_file_name(&template, ctx.templates)
            .map_err(|err| ModuleError::param("histo_file_name", err.to_string()))?;
        if file_name.is_empty() {
            return Err(ModuleError::param("histo_file_name", "renders to an empty name"));
        }
        Ok(Box::new(Self {
            params,
            output: PathBuf::from(file_name),
        }))
    }
}

impl Module for HistoManager {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn declarations(&self) -> Declarations {
        Declarations::new().collects_histograms()
    }

    fn process_event(&mut self, _store: &mut EventStore) -> Result<Flow, ModuleError> {
        Ok(Flow::proceed())
    }

    fn finalize(&mut self, outputs: &mut Outputs) -> Result<(), ModuleError> {
        let book = outputs.histograms.drain();
        write_json(&self.output, &book)?;
        info!(
            file = %self.output.display(),
            histograms = book.len(),
            "wrote histogram file"
        );
        outputs.written.push(self.output.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::histogram::{HistogramBook, Profile};
    use crate::core::params::ParamValue;
    use crate::core::template::TemplateVars;

    #[test]
    fn renders_file_name_template() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut vars = TemplateVars::new();
        vars.insert("iteration".to_string(), ParamValue::Int(2));
        let template = temp.path().join("test{{ iteration }}.json").display().to_string();
        let mut module = HistoManager::build(BuildContext {
            params: Params::new().with("histo_file_name", template),
            templates: &vars,
        })
        .expect("build");

        let mut outputs = Outputs::default();
        outputs
            .histograms
            .deposit("KLM", Profile::new("p", "p", 2, 0.0, 1.0));
        module.finalize(&mut outputs).expect("finalize");

        let written = temp.path().join("test2.json");
        assert_eq!(outputs.written, vec![written.clone()]);
        assert!(outputs.histograms.is_empty());
        let book: HistogramBook =
            serde_json::from_str(&std::fs::read_to_string(written).expect("read")).expect("parse");
        assert_eq!(book.directory("KLM").map(<[Profile]>::len), Some(1));
    }

    #[test]
    fn unknown_template_variable_is_a_param_error() {
        let err = HistoManager::build(BuildContext {
            params: Params::new().with("histo_file_name", "h{{ nope }}.json"),
            templates: &TemplateVars::new(),
        })
        .err()
        .expect("param error");
        assert!(matches!(err, ModuleError::Param { .. }));
    }
}
