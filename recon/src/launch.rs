//! Orchestration for `recon run` and `recon print-path`.
//!
//! Turns a validated [`SteeringConfig`] into a module path, a conditions
//! context and a tag store, then hands them to the [`Runner`].

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::core::context::GlobalContext;
use crate::core::params::ParamValue;
use crate::core::path::Path;
use crate::core::registry::ModuleRegistry;
use crate::core::stats::RunStatistics;
use crate::core::template::{TemplateVars, render_file_name};
use crate::io::config::{ConditionsSection, ModuleSpec, SteeringConfig};
use crate::io::output::write_statistics;
use crate::io::tag_store::DirTagStore;
use crate::modules::default_registry;
use crate::runner::{RunOptions, RunReport, Runner, format_wall_time};

/// Command-line values that take precedence over the steering file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub max_events: Option<u64>,
    pub skip_events: Option<u64>,
    pub vars: Vec<(String, ParamValue)>,
}

impl Overrides {
    /// Apply to `cfg` and re-validate.
    pub fn apply(&self, cfg: &mut SteeringConfig) -> Result<()> {
        if let Some(max_events) = self.max_events {
            cfg.run.max_events = Some(max_events);
        }
        if let Some(skip_events) = self.skip_events {
            cfg.run.skip_events = skip_events;
        }
        for (key, value) in &self.vars {
            cfg.templates.insert(key.clone(), value.clone());
        }
        cfg.validate().context("validate overridden steering")
    }
}

/// Parse a `key=value` template variable. Integers, floats and booleans keep
/// their type; anything else is a string.
pub fn parse_var(raw: &str) -> Result<(String, ParamValue)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("template variable '{raw}' must look like key=value"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("template variable '{raw}' has an empty name"));
    }
    let value = value.trim();
    let typed = if let Ok(int) = value.parse::<i64>() {
        ParamValue::Int(int)
    } else if let Ok(float) = value.parse::<f64>() {
        ParamValue::Float(float)
    } else if let Ok(flag) = value.parse::<bool>() {
        ParamValue::Bool(flag)
    } else {
        ParamValue::from(value)
    };
    Ok((key.to_string(), typed))
}

/// Global tags with the prepends applied, highest priority first.
pub fn build_context(conditions: &ConditionsSection) -> Result<GlobalContext> {
    let mut context = GlobalContext::new(conditions.globaltags.iter().cloned());
    // Prepending in reverse leaves `prepend` in its listed order at the front.
    for tag in conditions.prepend.iter().rev() {
        context
            .prepend_tag(tag.as_str())
            .with_context(|| format!("prepend global tag '{tag}'"))?;
    }
    Ok(context)
}

/// Instantiate `specs` (and their condition paths) from `registry`.
pub fn build_path(
    registry: &ModuleRegistry,
    specs: &[ModuleSpec],
    templates: &TemplateVars,
) -> Result<Path> {
    let mut path = Path::new();
    for spec in specs {
        let name = spec.display_name();
        let params = spec.typed_params()?;
        let module = registry
            .build(&spec.module, params, templates)
            .with_context(|| format!("build module '{name}'"))?;
        path.append_named(name, module)
            .with_context(|| format!("append module '{name}'"))?;
        if !spec.condition_path.is_empty() {
            let sub = build_path(registry, &spec.condition_path, templates)?;
            path.attach_condition(sub)
                .with_context(|| format!("attach condition path to '{name}'"))?;
        }
    }
    Ok(path)
}

/// Listing of the configured path, as `recon print-path` shows it.
pub fn print_path(cfg: &SteeringConfig) -> Result<String> {
    let registry = default_registry();
    let path = build_path(&registry, &cfg.path, &cfg.templates)?;
    let context = build_context(&cfg.conditions)?;
    let mut out = format!("global tags: {}\n", context.tags().join(", "));
    out.push_str(&path.render());
    Ok(out)
}

/// Run the steering file end to end.
///
/// A failed run still writes its statistics file when one is configured; the
/// returned error then wraps the [`RunError`](crate::runner::RunError).
pub fn run_steering(cfg: &SteeringConfig) -> Result<RunReport> {
    let registry = default_registry();
    let mut path = build_path(&registry, &cfg.path, &cfg.templates)?;
    let context = build_context(&cfg.conditions)?;
    let tag_store = DirTagStore::new(&cfg.conditions.store);
    let options = RunOptions {
        max_events: cfg.run.max_events,
        skip_events: cfg.run.skip_events,
    };
    info!(
        tags = ?context.tags(),
        store = %tag_store.dir().display(),
        "starting run"
    );

    let result = Runner::new(options, &context, &tag_store).run(&mut path);
    match result {
        Ok(report) => {
            save_statistics(cfg, &report.statistics)?;
            info!(
                processed = report.statistics.processed,
                wall_time = %format_wall_time(report.statistics.wall_time_us),
                outputs = report.outputs.written.len(),
                "run complete"
            );
            Ok(report)
        }
        Err(err) => {
            if let Some(statistics) = err.statistics() {
                if let Err(save_err) = save_statistics(cfg, statistics) {
                    warn!(error = %format!("{save_err:#}"), "could not write statistics");
                }
            }
            Err(err.into())
        }
    }
}

fn save_statistics(cfg: &SteeringConfig, statistics: &RunStatistics) -> Result<Option<PathBuf>> {
    let Some(template) = &cfg.run.statistics_file else {
        return Ok(None);
    };
    let file_name = render_file_name(template, &cfg.templates)
        .with_context(|| format!("render statistics file name '{template}'"))?;
    let path = PathBuf::from(file_name);
    write_statistics(&path, statistics)?;
    info!(file = %path.display(), "wrote run statistics");
    Ok(Some(path))
}
