use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::filter_fn, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

pub const LOGGING_ENV: &str = "FORKDNS_LOG";
pub const LOGGING_FILE_ENV: &str = "FORKDNS_LOG_FILE";

/// Console output filtered by `FORKDNS_LOG`, plus a plain-text file filtered by `FORKDNS_LOG_FILE`
/// when `log_file` is given.
pub fn setup_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open the log file '{}'", path.display()))?;

            Some(
                layer()
                    .pretty()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(
                        EnvFilter::builder()
                            .with_env_var(LOGGING_FILE_ENV)
                            .with_default_directive(LevelFilter::TRACE.into())
                            .from_env_lossy(),
                    ),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            layer()
                .with_filter(filter_fn(|metadata| metadata.level() <= &LevelFilter::INFO))
                .and_then(
                    layer()
                        .with_line_number(true)
                        .with_file(true)
                        .with_filter(filter_fn(|metadata| metadata.level() > &LevelFilter::INFO)),
                )
                .with_filter(
                    EnvFilter::builder()
                        .with_env_var(LOGGING_ENV)
                        .with_default_directive(LevelFilter::INFO.into())
                        .from_env_lossy(),
                ),
        )
        .with(file_layer)
        .try_init()
        .context("failed to initialize tracing_subscriber")
}
