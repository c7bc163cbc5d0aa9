//! Ordered module chain with conditional sub-paths.
//!
//! A [`Path`] is pure structure: the runner walks it, the path itself never
//! executes anything. Appends are rejected once the path is frozen, which the
//! runner does before the first `initialize`.

use std::fmt::Write as _;

use thiserror::Error;

use crate::core::module::Module;
use crate::core::store::SlotId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is frozen; cannot add '{name}'")]
    Frozen { name: String },

    #[error("module name '{name}' is already used in this path")]
    DuplicateName { name: String },

    #[error("cannot attach a condition path: {reason}")]
    Condition { reason: String },

    #[error("data flow violations:\n- {}", .violations.join("\n- "))]
    DataFlow { violations: Vec<String> },
}

/// One module in a path, with its optional conditional sub-path.
pub struct PathEntry {
    name: String,
    /// Depth-first position in the whole tree; assigned when the path freezes.
    id: usize,
    pub(crate) module: Box<dyn Module>,
    pub(crate) condition: Option<Path>,
}

impl PathEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub fn condition_path(&self) -> Option<&Path> {
        self.condition.as_ref()
    }
}

/// Mutable view of one module, produced by [`Path::flatten_mut`].
pub struct ModuleSlot<'a> {
    pub id: usize,
    pub name: &'a str,
    pub module: &'a mut Box<dyn Module>,
}

#[derive(Default)]
pub struct Path {
    entries: Vec<PathEntry>,
    frozen: bool,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    /// Append under the module's type name.
    pub fn append(&mut self, module: Box<dyn Module>) -> Result<(), PathError> {
        let name = module.type_name().to_string();
        self.append_named(name, module)
    }

    /// Append under an explicit instance name, unique across the whole tree.
    pub fn append_named(
        &mut self,
        name: impl Into<String>,
        module: Box<dyn Module>,
    ) -> Result<(), PathError> {
        let name = name.into();
        if self.frozen {
            return Err(PathError::Frozen { name });
        }
        if self.module_names().iter().any(|existing| *existing == name) {
            return Err(PathError::DuplicateName { name });
        }
        self.entries.push(PathEntry {
            name,
            id: 0,
            module,
            condition: None,
        });
        Ok(())
    }

    /// Attach `sub` to the most recently appended module. It runs for an event
    /// only when that module's continue-signal is true.
    pub fn attach_condition(&mut self, sub: Path) -> Result<(), PathError> {
        if self.frozen {
            return Err(PathError::Frozen {
                name: "<condition path>".to_string(),
            });
        }
        if sub.frozen {
            return Err(PathError::Condition {
                reason: "sub-path is already frozen".to_string(),
            });
        }
        let existing = self.module_names();
        if let Some(dup) = sub
            .module_names()
            .into_iter()
            .find(|name| existing.contains(name))
        {
            return Err(PathError::DuplicateName {
                name: dup.to_string(),
            });
        }
        let last = self.entries.last_mut().ok_or_else(|| PathError::Condition {
            reason: "path has no module to attach to".to_string(),
        })?;
        if last.condition.is_some() {
            return Err(PathError::Condition {
                reason: format!("'{}' already has a condition path", last.name),
            });
        }
        last.condition = Some(sub);
        Ok(())
    }

    /// Freeze this path and every sub-path, numbering modules depth-first.
    /// Returns the number of modules in the tree.
    pub fn freeze(&mut self) -> usize {
        let mut next = 0;
        self.freeze_inner(&mut next);
        next
    }

    fn freeze_inner(&mut self, next: &mut usize) {
        self.frozen = true;
        for entry in &mut self.entries {
            entry.id = *next;
            *next += 1;
            if let Some(sub) = &mut entry.condition {
                sub.freeze_inner(next);
            }
        }
    }

    /// Module names in depth-first order (sub-path modules follow their parent).
    pub fn module_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        for entry in &self.entries {
            names.push(entry.name.as_str());
            if let Some(sub) = &entry.condition {
                sub.collect_names(names);
            }
        }
    }

    /// Mutable depth-first view of every module in the tree.
    pub fn flatten_mut(&mut self) -> Vec<ModuleSlot<'_>> {
        let mut slots = Vec::new();
        self.collect_slots(&mut slots);
        slots
    }

    fn collect_slots<'a>(&'a mut self, slots: &mut Vec<ModuleSlot<'a>>) {
        for entry in &mut self.entries {
            slots.push(ModuleSlot {
                id: entry.id,
                name: entry.name.as_str(),
                module: &mut entry.module,
            });
            if let Some(sub) = &mut entry.condition {
                sub.collect_slots(slots);
            }
        }
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [PathEntry] {
        &mut self.entries
    }

    /// Check that every required store slot is provided by an earlier module,
    /// and that every module depositing histograms has a collector before it.
    ///
    /// Slots provided inside a condition path are only visible within it, since
    /// the sub-path may not run for a given event. Finalize ignores conditions,
    /// so a collector anywhere earlier in depth-first order counts.
    pub fn check_data_flow(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut collector_seen = false;
        self.check_data_flow_inner(&mut Vec::new(), &mut collector_seen, &mut violations);
        violations
    }

    fn check_data_flow_inner(
        &self,
        provided: &mut Vec<SlotId>,
        collector_seen: &mut bool,
        violations: &mut Vec<String>,
    ) {
        for entry in &self.entries {
            let decl = entry.module.declarations();
            for slot in &decl.requires {
                if !provided.contains(slot) {
                    violations.push(format!(
                        "{}: requires {} but no earlier module provides it",
                        entry.name, slot
                    ));
                }
            }
            if decl.deposits_histograms && !*collector_seen {
                violations.push(format!(
                    "{}: deposits histograms but no earlier module collects them",
                    entry.name
                ));
            }
            *collector_seen |= decl.collects_histograms;
            for slot in decl.provides {
                if !provided.contains(&slot) {
                    provided.push(slot);
                }
            }
            if let Some(sub) = &entry.condition {
                let mut scoped = provided.clone();
                sub.check_data_flow_inner(&mut scoped, collector_seen, violations);
            }
        }
    }

    /// Human-readable listing of modules and their parameters.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_inner(&mut out, "", 0);
        out
    }

    fn render_inner(&self, out: &mut String, prefix: &str, depth: usize) {
        let indent = "    ".repeat(depth);
        for (idx, entry) in self.entries.iter().enumerate() {
            let label = if prefix.is_empty() {
                format!("{}", idx + 1)
            } else {
                format!("{prefix}.{}", idx + 1)
            };
            let type_name = entry.module.type_name();
            if type_name == entry.name {
                let _ = writeln!(out, "{indent}[{label}] {}", entry.name);
            } else {
                let _ = writeln!(out, "{indent}[{label}] {} ({type_name})", entry.name);
            }
            for (key, value) in entry.module.params().iter() {
                let _ = writeln!(out, "{indent}      {key} = {value}");
            }
            if let Some(sub) = &entry.condition {
                let _ = writeln!(out, "{indent}    if {} is true:", entry.name);
                sub.render_inner(out, &label, depth + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::Params;
    use crate::core::store::StoreKey;
    use crate::test_support::ScriptedModule;

    const A_OUT: StoreKey<u32> = StoreKey::new("a_out");
    const B_OUT: StoreKey<u32> = StoreKey::new("b_out");

    fn module(name: &str) -> Box<dyn Module> {
        Box::new(ScriptedModule::new(name))
    }

    #[test]
    fn append_after_freeze_is_rejected() {
        let mut path = Path::new();
        path.append(module("A")).expect("append");
        assert_eq!(path.freeze(), 1);
        let err = path.append(module("B")).expect_err("frozen");
        assert_eq!(
            err,
            PathError::Frozen {
                name: "B".to_string()
            }
        );
        assert_eq!(path.module_names(), vec!["A"]);
    }

    #[test]
    fn duplicate_names_are_rejected_across_sub_paths() {
        let mut path = Path::new();
        path.append(module("A")).expect("append");
        let mut sub = Path::new();
        sub.append(module("A")).expect("append sub");
        let err = path.attach_condition(sub).expect_err("duplicate");
        assert!(matches!(err, PathError::DuplicateName { .. }));

        path.append_named("A2", module("A")).expect("renamed");
        assert!(matches!(
            path.append(module("A")),
            Err(PathError::DuplicateName { .. })
        ));
    }

    #[test]
    fn attach_condition_needs_a_module() {
        let mut path = Path::new();
        let err = path.attach_condition(Path::new()).expect_err("empty");
        assert!(matches!(err, PathError::Condition { .. }));
    }

    #[test]
    fn freeze_numbers_depth_first() {
        let mut path = Path::new();
        path.append(module("A")).expect("A");
        let mut sub = Path::new();
        sub.append(module("S1")).expect("S1");
        sub.append(module("S2")).expect("S2");
        path.attach_condition(sub).expect("attach");
        path.append(module("B")).expect("B");

        assert_eq!(path.freeze(), 4);
        let order: Vec<(usize, String)> = path
            .flatten_mut()
            .into_iter()
            .map(|slot| (slot.id, slot.name.to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "A".to_string()),
                (1, "S1".to_string()),
                (2, "S2".to_string()),
                (3, "B".to_string()),
            ]
        );
        assert!(path.entries()[0].condition_path().expect("sub").is_frozen());
    }

    #[test]
    fn data_flow_requires_earlier_provider() {
        let mut path = Path::new();
        path.append(Box::new(ScriptedModule::new("Consumer").requiring(A_OUT)))
            .expect("consumer");
        path.append(Box::new(ScriptedModule::new("Producer").providing(A_OUT)))
            .expect("producer");
        let violations = path.check_data_flow();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].starts_with("Consumer: requires a_out"));
    }

    #[test]
    fn sub_path_products_do_not_leak_outward() {
        let mut path = Path::new();
        path.append(Box::new(ScriptedModule::new("Gate").providing(A_OUT)))
            .expect("gate");
        let mut sub = Path::new();
        sub.append(Box::new(
            ScriptedModule::new("Inner")
                .requiring(A_OUT)
                .providing(B_OUT),
        ))
        .expect("inner");
        path.attach_condition(sub).expect("attach");
        path.append(Box::new(ScriptedModule::new("After").requiring(B_OUT)))
            .expect("after");

        let violations = path.check_data_flow();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].starts_with("After: requires b_out"));
    }

    #[test]
    fn histogram_depositors_need_an_earlier_collector() {
        let mut path = Path::new();
        path.append(Box::new(
            ScriptedModule::new("Filler").depositing_histograms(),
        ))
        .expect("filler");
        path.append(Box::new(
            ScriptedModule::new("Writer").collecting_histograms(),
        ))
        .expect("writer");
        let violations = path.check_data_flow();
        assert_eq!(
            violations,
            vec!["Filler: deposits histograms but no earlier module collects them".to_string()]
        );

        let mut path = Path::new();
        path.append(Box::new(
            ScriptedModule::new("Writer").collecting_histograms(),
        ))
        .expect("writer");
        path.append(module("Gate")).expect("gate");
        let mut sub = Path::new();
        sub.append(Box::new(
            ScriptedModule::new("Filler").depositing_histograms(),
        ))
        .expect("filler");
        path.attach_condition(sub).expect("attach");
        assert!(path.check_data_flow().is_empty());
    }

    #[test]
    fn render_lists_modules_params_and_sub_paths() {
        let mut path = Path::new();
        path.append(Box::new(
            ScriptedModule::new("Input").with_params(Params::new().with("input_files", "a.jsonl")),
        ))
        .expect("input");
        let mut sub = Path::new();
        sub.append_named("writer", module("Output")).expect("writer");
        path.attach_condition(sub).expect("attach");

        let rendered = path.render();
        assert_eq!(
            rendered,
            "[1] Input\n      input_files = \"a.jsonl\"\n    if Input is true:\n    [1.1] writer (Output)\n"
        );
    }
}
