use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logs to stderr at `console_level` (overridable with `RUST_LOG`) and to
/// `log_path` at `file_level`.
pub fn init_logging(console_level: LevelFilter, log_path: &Path, file_level: LevelFilter) -> Result<()> {
    let directory = log_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(directory)?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid log file path: {}", log_path.display()))?;
    let file_appender = tracing_appender::rolling::never(directory, file_name);

    let console_filter = EnvFilter::builder()
        .with_default_directive(console_level.into())
        .from_env_lossy();
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(file_level);

    tracing_subscriber::registry().with(console_layer).with(file_layer).try_init()?;

    Ok(())
}
