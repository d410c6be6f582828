//! Diagnostics via `tracing`.
//!
//! - **stderr**: compact, filtered by `RUST_LOG` (default `warn`).
//! - **verbose log file** (optional): plain text at `debug` regardless of
//!   `RUST_LOG`, for post-mortem of a single run.
//!
//! Attempt artifacts (`io/attempt_log`) are separate product output and are
//! unaffected by either filter.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// # Example
/// ```bash
/// RUST_LOG=migrator=debug migrator migrate src/Button.test.tsx
/// ```
pub fn init(verbose_log: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(filter);

    let file_layer = match verbose_log {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("create verbose log {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
