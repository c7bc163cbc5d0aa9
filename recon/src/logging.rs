//! Tracing setup for the `recon` binary.
//!
//! `RUST_LOG` wins when set; otherwise the steering file's `logging.level`
//! applies. Output goes to stderr in compact form, and additionally to a plain
//! text file when `logging.file` is configured.
//!
//! ```bash
//! RUST_LOG=recon=debug recon run steering.toml
//! ```

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::io::config::LoggingSection;

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LoggingSection) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("parse logging.level '{}'", config.level))?,
    };

    let file_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .compact(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")
}
