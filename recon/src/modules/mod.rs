//! Built-in modules and the registry that makes them available to steering files.

pub mod conditions;
pub mod event_output;
pub mod histo_manager;
pub mod input;
pub mod klm_cdc_track;
pub mod progress;

use crate::core::registry::ModuleRegistry;

/// Registry with every built-in module.
pub fn default_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(
        input::TYPE_NAME,
        "Read events from JSON Lines files (input_files, branch_names)",
        input::EventInput::build,
    );
    registry.register(
        histo_manager::TYPE_NAME,
        "Write histograms handed over at finalize (histo_file_name)",
        histo_manager::HistoManager::build,
    );
    registry.register(
        klm_cdc_track::TYPE_NAME,
        "KLM hits per CDC track profiles (histogram_directory_name, min_momentum)",
        klm_cdc_track::KlmCdcTrack::build,
    );
    registry.register(
        progress::TYPE_NAME,
        "Log processed-event counts",
        progress::Progress::build,
    );
    registry.register(
        conditions::TYPE_NAME,
        "Require conditions keys at initialize (required)",
        conditions::Conditions::build,
    );
    registry.register(
        event_output::TYPE_NAME,
        "Write the events reaching it as JSON Lines (output_file_name, branch_names)",
        event_output::EventOutput::build,
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_builtins() {
        let registry = default_registry();
        let ids: Vec<&str> = registry.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(
            ids,
            vec![
                "Conditions",
                "EventInput",
                "EventOutput",
                "HistoManager",
                "KLMCDCTrack",
                "Progress"
            ]
        );
    }
}
