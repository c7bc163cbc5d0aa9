//! Sequential event-processing pipeline for detector reconstruction runs.
//!
//! A run is a [`Path`](core::path::Path) of independently configured modules,
//! executed once per event by the [`Runner`](runner::Runner) over a shared
//! per-event [`EventStore`](core::store::EventStore). Run-wide calibration
//! state comes from a layered [`GlobalContext`](core::context::GlobalContext)
//! built from an ordered list of global tags.
//!
//! - **[`core`]**: pure pipeline model (modules, store, path, context, stats).
//!   No I/O.
//! - **[`io`]**: steering files, event files, the conditions store, outputs.
//! - **[`modules`]**: built-in modules and their registry.
//!
//! [`runner`] drives a path; [`launch`] wires a steering file into a run.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod launch;
pub mod logging;
pub mod modules;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
