//! Tracing setup for the `draftsync` binary.
//!
//! Diagnostics go to stderr so command output on stdout stays machine
//! readable. When the project is initialized, the same events are also
//! appended to `.draftsync/logs/draftsync.log` through a non-blocking writer.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

pub const LOG_FILE: &str = "draftsync.log";

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    pub verbose: bool,
    pub json: bool,
    /// Directory for the log file; `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "draftsync=debug"
    } else {
        "draftsync=info"
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit; dropping it flushes the file
/// writer. Installing twice is a no-op.
pub fn init_logging(options: &LoggingOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options.verbose)));

    let stderr_layer: Box<dyn Layer<Registry> + Send + Sync> = if options.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter);
    tracing::subscriber::set_global_default(subscriber).ok();
    Ok(guard)
}
