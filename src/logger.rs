//! 日志初始化，启动时在配置解析完成后调用一次[`init`]

use anyhow::{Result, anyhow};
use std::path::Path;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::util::SubscriberInitExt;

/// 初始化全局tracing subscriber
///
/// `prefer_level`为true时（命令行显式指定了级别）以`level`为准，
/// 否则`RUST_LOG`优先，`level`作为兜底。
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<()> {
    build_subscriber(level, prefer_level, log_file)?
        .try_init()
        .map_err(|e| anyhow!("failed to set subscriber: {}", e))
}

fn build_subscriber(
    level: &str,
    prefer_level: bool,
    log_file: Option<&Path>,
) -> Result<impl Subscriber + Send + Sync + 'static> {
    let filter = build_filter(level, prefer_level)?;

    let writer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow!("failed to open log file '{}': {}", path.display(), e))?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .finish())
}

fn build_filter(level: &str, prefer_level: bool) -> Result<EnvFilter> {
    if prefer_level {
        EnvFilter::try_new(level)
            .or_else(|_| EnvFilter::try_from_default_env())
            .map_err(|e| anyhow!("invalid log level '{}': {}", level, e))
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| anyhow!("invalid log level '{}': {}", level, e))
    }
}
