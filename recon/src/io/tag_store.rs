//! File-backed conditions store: one `<tag>.toml` payload table per global tag.
//!
//! Nested tables flatten to dotted keys, so
//!
//! ```toml
//! [klm]
//! alignment = "v3"
//! ```
//!
//! defines `klm.alignment`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::core::context::{ContextError, TagPayloads, TagStore};
use crate::core::params::ParamValue;

static TAG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid tag name regex")
});

#[derive(Debug, Clone)]
pub struct DirTagStore {
    dir: PathBuf,
}

impl DirTagStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn tag_path(&self, tag: &str) -> Result<PathBuf, ContextError> {
        if !TAG_NAME.is_match(tag) {
            return Err(ContextError::UnknownTag {
                tag: tag.to_string(),
            });
        }
        Ok(self.dir.join(format!("{tag}.toml")))
    }
}

impl TagStore for DirTagStore {
    fn load(&self, tag: &str) -> Result<TagPayloads, ContextError> {
        let path = self.tag_path(tag)?;
        if !path.is_file() {
            return Err(ContextError::UnknownTag {
                tag: tag.to_string(),
            });
        }
        let store_err = |message: String| ContextError::Store {
            tag: tag.to_string(),
            message,
        };
        let contents = fs::read_to_string(&path)
            .map_err(|err| store_err(format!("read {}: {err}", path.display())))?;
        let table: toml::Table = toml::from_str(&contents)
            .map_err(|err| store_err(format!("parse {}: {err}", path.display())))?;

        let mut payloads = TagPayloads::new();
        flatten_into(&mut payloads, "", table).map_err(store_err)?;
        debug!(tag, entries = payloads.len(), "loaded global tag");
        Ok(payloads)
    }
}

fn flatten_into(out: &mut TagPayloads, prefix: &str, table: toml::Table) -> Result<(), String> {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_into(out, &full, nested)?,
            other => {
                let typed: ParamValue = other
                    .try_into()
                    .map_err(|err| format!("payload '{full}': {err}"))?;
                out.insert(full, typed);
            }
        }
    }
    Ok(())
}
