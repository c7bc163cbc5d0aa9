//! Side-effecting helpers: steering files, event files, conditions store, outputs.

pub mod config;
pub mod event_file;
pub mod output;
pub mod tag_store;
