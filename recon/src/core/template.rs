//! Output file-name templates (`hist{{ iteration }}.json`).

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};

use crate::core::params::ParamValue;

/// Variables available to file-name templates.
pub type TemplateVars = BTreeMap<String, ParamValue>;

/// Render `template` with `vars`. Unknown variables are an error rather than
/// silently rendering as empty, so a typo cannot clobber another run's output.
pub fn render_file_name(template: &str, vars: &TemplateVars) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let rendered = env.render_str(template, vars)?;
    Ok(rendered.trim().to_string())
}
