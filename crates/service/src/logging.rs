// Logging setup
//
// SCOREQ_LOG_FORMAT=json switches stdout to JSON lines; SCOREQ_LOG_DIR adds a
// daily rolling file. The returned guard must live as long as the process.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FORMAT_ENV: &str = "SCOREQ_LOG_FORMAT";
pub const LOG_DIR_ENV: &str = "SCOREQ_LOG_DIR";
const LOG_FILE_PREFIX: &str = "scoreq.log";

pub fn init_logging(default_filter: &str) -> Result<Option<WorkerGuard>> {
    let log_format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Failed to create env filter")?;

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    match log_format.as_str() {
        // Production: JSON structured logging
        "json" => registry.with(fmt::layer().json()).try_init(),
        // Development: Pretty formatting with colors
        _ => registry.with(fmt::layer().pretty()).try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
