use anyhow::Context;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::Config;

pub const LOG_FILE_PREFIX: &str = "ekklesia.log";

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Keeps the background file writer alive; drop it to flush on exit.
#[must_use]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber: stderr always, plus a daily rolling file
/// when `log_dir` is configured. `log` records are bridged by the subscriber.
/// Later calls are no-ops.
pub fn init(config: &Config) -> anyhow::Result<LoggingGuard> {
    if INSTALLED.get().is_some() {
        return Ok(LoggingGuard { _file: None });
    }

    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("parse log filter {:?}", config.log_filter))?;

    let stderr_layer = if config.log_json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(UtcTime::rfc_3339())
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    };

    let (file_layer, file_guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    let _ = INSTALLED.set(());

    Ok(LoggingGuard { _file: file_guard })
}
