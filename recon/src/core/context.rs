//! Layered conditions context built from an ordered list of global tags.
//!
//! The first tag in the list has the highest priority. Tags may be prepended
//! until the context is resolved; resolution reads every tag's payloads from a
//! [`TagStore`] exactly once and freezes the layered view for the rest of the run.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;

use crate::core::params::ParamValue;

/// Payloads defined by a single tag.
pub type TagPayloads = BTreeMap<String, ParamValue>;

/// Read-only `(tag, key) -> value` oracle.
pub trait TagStore {
    /// All payloads defined by `tag`, or [`ContextError::UnknownTag`].
    fn load(&self, tag: &str) -> Result<TagPayloads, ContextError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    /// No listed tag defines `key`. Callers may fall back to a default.
    #[error("no global tag defines '{key}'")]
    Undefined { key: String },

    #[error("global tag '{tag}' is not known to the conditions store")]
    UnknownTag { tag: String },

    #[error("global tags are frozen after resolution; cannot prepend '{tag}'")]
    Frozen { tag: String },

    #[error("conditions store failure for tag '{tag}': {message}")]
    Store { tag: String, message: String },
}

/// A resolved value together with the tag that supplied it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub tag: String,
    pub value: ParamValue,
}

#[derive(Debug, Default)]
struct Layered {
    values: BTreeMap<String, Resolved>,
}

/// Ordered global tags plus the lazily built layered view.
#[derive(Debug, Default)]
pub struct GlobalContext {
    tags: Vec<String>,
    layered: OnceLock<Layered>,
}

impl GlobalContext {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            layered: OnceLock::new(),
        }
    }

    /// Tags in priority order, highest first.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_resolved(&self) -> bool {
        self.layered.get().is_some()
    }

    /// Raise `tag` above every tag listed so far.
    ///
    /// A tag already in the list is moved to the front rather than duplicated.
    pub fn prepend_tag(&mut self, tag: impl Into<String>) -> Result<(), ContextError> {
        let tag = tag.into();
        if self.is_resolved() {
            return Err(ContextError::Frozen { tag });
        }
        self.tags.retain(|existing| *existing != tag);
        self.tags.insert(0, tag);
        Ok(())
    }

    /// Build the layered view. Later calls are no-ops.
    pub fn resolve_with(&self, store: &dyn TagStore) -> Result<(), ContextError> {
        if self.is_resolved() {
            return Ok(());
        }
        let mut layered = Layered::default();
        // Walk lowest priority first so higher tags overwrite.
        for tag in self.tags.iter().rev() {
            let payloads = store.load(tag)?;
            debug!(tag = %tag, payloads = payloads.len(), "loaded global tag");
            for (key, value) in payloads {
                layered.values.insert(
                    key,
                    Resolved {
                        tag: tag.clone(),
                        value,
                    },
                );
            }
        }
        // A concurrent initializer can only have produced the same view.
        let _ = self.layered.set(layered);
        Ok(())
    }

    /// Highest-priority value for `key`.
    ///
    /// Resolves against `store` on first use if [`resolve_with`](Self::resolve_with)
    /// has not run yet.
    pub fn resolve(&self, store: &dyn TagStore, key: &str) -> Result<&ParamValue, ContextError> {
        self.resolve_with(store)?;
        self.lookup(key).map(|resolved| &resolved.value)
    }

    /// Lookup in the frozen view. Before resolution every key is undefined.
    pub fn lookup(&self, key: &str) -> Result<&Resolved, ContextError> {
        self.layered
            .get()
            .and_then(|layered| layered.values.get(key))
            .ok_or_else(|| ContextError::Undefined {
                key: key.to_string(),
            })
    }

    /// Convenience for callers that treat an undefined key as "use default".
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.lookup(key).ok().map(|resolved| &resolved.value)
    }
}

/// In-memory tag store, handy for tests and embedded callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryTagStore {
    tags: BTreeMap<String, TagPayloads>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag<I, K>(mut self, tag: &str, payloads: I) -> Self
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: Into<String>,
    {
        let entry = self.tags.entry(tag.to_string()).or_default();
        for (key, value) in payloads {
            entry.insert(key.into(), value);
        }
        self
    }
}

impl TagStore for MemoryTagStore {
    fn load(&self, tag: &str) -> Result<TagPayloads, ContextError> {
        self.tags
            .get(tag)
            .cloned()
            .ok_or_else(|| ContextError::UnknownTag {
                tag: tag.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryTagStore {
        MemoryTagStore::new()
            .with_tag("T1", [("a", ParamValue::from("t1"))])
            .with_tag(
                "T2",
                [("a", ParamValue::from("t2")), ("k", ParamValue::from("t2"))],
            )
            .with_tag("T3", [("k", ParamValue::from("t3"))])
    }

    #[test]
    fn first_listed_tag_wins() {
        let store = store();
        let ctx = GlobalContext::new(["T1", "T2"]);
        assert_eq!(ctx.resolve(&store, "a"), Ok(&ParamValue::from("t1")));
        assert_eq!(ctx.resolve(&store, "k"), Ok(&ParamValue::from("t2")));
        assert_eq!(ctx.lookup("k").map(|r| r.tag.as_str()), Ok("T2"));
    }

    #[test]
    fn prepend_before_resolution_raises_priority() {
        let store = store();
        let mut ctx = GlobalContext::new(["T1", "T2"]);
        ctx.prepend_tag("T3").expect("prepend");
        assert_eq!(ctx.tags(), ["T3", "T1", "T2"]);
        assert_eq!(ctx.resolve(&store, "k"), Ok(&ParamValue::from("t3")));
    }

    #[test]
    fn prepend_existing_tag_moves_it_to_front() {
        let mut ctx = GlobalContext::new(["T1", "T2"]);
        ctx.prepend_tag("T2").expect("prepend");
        assert_eq!(ctx.tags(), ["T2", "T1"]);
    }

    #[test]
    fn prepend_after_resolution_is_rejected_and_view_unchanged() {
        let store = store();
        let mut ctx = GlobalContext::new(["T1", "T2"]);
        assert_eq!(ctx.resolve(&store, "k"), Ok(&ParamValue::from("t2")));

        let err = ctx.prepend_tag("T3").expect_err("frozen");
        assert_eq!(
            err,
            ContextError::Frozen {
                tag: "T3".to_string()
            }
        );
        assert_eq!(ctx.tags(), ["T1", "T2"]);
        assert_eq!(ctx.resolve(&store, "k"), Ok(&ParamValue::from("t2")));
    }

    #[test]
    fn missing_key_is_undefined_not_fatal() {
        let store = store();
        let ctx = GlobalContext::new(["T1"]);
        assert_eq!(
            ctx.resolve(&store, "k"),
            Err(ContextError::Undefined {
                key: "k".to_string()
            })
        );
        assert!(ctx.get("k").is_none());
    }

    #[test]
    fn unknown_tag_fails_resolution() {
        let store = store();
        let ctx = GlobalContext::new(["nope"]);
        assert_eq!(
            ctx.resolve_with(&store),
            Err(ContextError::UnknownTag {
                tag: "nope".to_string()
            })
        );
        assert!(!ctx.is_resolved());
    }

    #[test]
    fn lookup_before_resolution_is_undefined() {
        let ctx = GlobalContext::new(["T1"]);
        assert!(matches!(
            ctx.lookup("a"),
            Err(ContextError::Undefined { .. })
        ));
    }
}
