//! Steering file: the run-level configuration surface (TOML).
//!
//! ```toml
//! [run]
//! max_events = 1000
//! skip_events = 10449
//!
//! [conditions]
//! globaltags = ["data_reprocessing_proc13", "online"]
//! prepend = ["release-06-00-07"]
//!
//! [[path]]
//! module = "EventInput"
//! params = { input_files = ["data/*.jsonl"] }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::core::params::{ParamValue, Params};

/// Whole steering document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SteeringConfig {
    pub run: RunSection,
    pub logging: LoggingSection,
    pub conditions: ConditionsSection,
    /// Variables for output file-name templates.
    pub templates: BTreeMap<String, ParamValue>,
    /// Top-level module chain, in execution order.
    pub path: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RunSection {
    /// Event cap; absent means "until the input is exhausted".
    pub max_events: Option<u64>,
    /// Events discarded from the start of the input.
    pub skip_events: u64,
    /// Template for a JSON dump of the run statistics.
    pub statistics_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directives when `RUST_LOG` is unset (`info`,
    /// `recon=debug,warn`).
    pub level: String,
    /// Additional plain-text log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConditionsSection {
    /// Global tags, highest priority first.
    pub globaltags: Vec<String>,
    /// Tags raised above `globaltags`, listed in their final priority order.
    pub prepend: Vec<String>,
    /// Directory holding one `<tag>.toml` payload table per tag.
    pub store: PathBuf,
}

impl Default for ConditionsSection {
    fn default() -> Self {
        Self {
            globaltags: Vec::new(),
            prepend: Vec::new(),
            store: PathBuf::from("conditions"),
        }
    }
}

/// One module entry; `condition_path` runs only when this module's
/// continue-signal is true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleSpec {
    /// Registered module identifier.
    pub module: String,
    /// Instance name; defaults to the identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub params: toml::Table,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub condition_path: Vec<ModuleSpec>,
}

impl ModuleSpec {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            name: None,
            params: toml::Table::new(),
            condition_path: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.module)
    }

    /// Convert the TOML table to typed params, keeping declaration order.
    pub fn typed_params(&self) -> Result<Params> {
        let mut params = Params::new();
        for (key, value) in &self.params {
            let typed: ParamValue = value.clone().try_into().map_err(|err| {
                anyhow!(
                    "{}: parameter '{}' must be a bool, number, string or list: {}",
                    self.display_name(),
                    key,
                    err
                )
            })?;
            params.set(key.clone(), typed);
        }
        Ok(params)
    }
}

impl SteeringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.run.max_events == Some(0) {
            return Err(anyhow!(
                "run.max_events must be > 0 (omit it to process all events)"
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(anyhow!("logging.level must be non-empty"));
        }
        EnvFilter::try_new(&self.logging.level).with_context(|| {
            format!("logging.level '{}' is not a valid filter", self.logging.level)
        })?;
        for tag in self.conditions.globaltags.iter().chain(&self.conditions.prepend) {
            if tag.trim().is_empty() {
                return Err(anyhow!("conditions: global tag names must be non-empty"));
            }
        }
        if self.path.is_empty() {
            return Err(anyhow!("path must contain at least one module"));
        }
        validate_specs(&self.path)
    }
}

fn validate_specs(specs: &[ModuleSpec]) -> Result<()> {
    for spec in specs {
        if spec.module.trim().is_empty() {
            return Err(anyhow!("path: module identifier must be non-empty"));
        }
        if let Some(name) = &spec.name {
            if name.trim().is_empty() {
                return Err(anyhow!("{}: name must be non-empty", spec.module));
            }
        }
        spec.typed_params()?;
        validate_specs(&spec.condition_path)?;
    }
    Ok(())
}

/// Load and validate a steering file.
pub fn load_steering(path: &Path) -> Result<SteeringConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SteeringConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
