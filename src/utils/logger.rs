// Logger initialization

use crate::config::LoggingConfig;
use crate::types::{AppError, AppResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "company-research.log";

/// Installs the global subscriber: `RUST_LOG` wins over the configured filter.
/// With a log directory, events are also written to a daily rolling file and
/// the returned guard must be held until shutdown to flush it.
pub fn init_tracing(config: &LoggingConfig) -> AppResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| AppError::Config(format!("Invalid log filter '{}': {}", config.filter, e)))?;

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to install tracing subscriber: {}", e)))?;

    Ok(guard)
}
