//! Deterministic pipeline model shared by the runner and the modules.
//!
//! Core modules are free of filesystem I/O. They define the module contract,
//! the per-event store, path structure, conditions context and statistics.

pub mod context;
pub mod histogram;
pub mod module;
pub mod params;
pub mod path;
pub mod registry;
pub mod stats;
pub mod store;
pub mod template;
pub mod types;
