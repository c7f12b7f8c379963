use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const LOG_FILE: &str = "quillseo.log";

static EVENT_LOG_DIR: Lazy<std::sync::RwLock<Option<PathBuf>>> =
    Lazy::new(|| std::sync::RwLock::new(None));

/**
 * \brief 初始化 tracing 输出，`RUST_LOG` 优先；重复调用无副作用。
 * \param verbose 为 true 时默认级别为 debug
 */
pub fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .try_init();
}

/**
 * \brief 设置事件日志目录；None 关闭文件记录。
 */
pub fn set_log_dir(dir: Option<PathBuf>) {
    if let Ok(mut guard) = EVENT_LOG_DIR.write() {
        *guard = dir;
    }
}

/**
 * \brief 是否写入事件日志文件。
 */
pub fn is_enabled() -> bool {
    EVENT_LOG_DIR.read().map(|g| g.is_some()).unwrap_or(false)
}

/**
 * \brief 记录常规事件。
 */
pub fn log_event(category: &str, message: &str) {
    tracing::info!(category, "{}", message);
    append("INFO", category, message);
}

/**
 * \brief 记录错误事件。
 */
pub fn log_error(category: &str, message: &str) {
    tracing::error!(category, "{}", message);
    append("ERROR", category, message);
}

fn append(level: &str, category: &str, message: &str) {
    let dir = match EVENT_LOG_DIR.read() {
        Ok(guard) => guard.clone(),
        Err(_) => None,
    };
    if let Some(dir) = dir {
        if let Err(err) = write_line(&dir, level, category, message) {
            tracing::warn!("event log write failed: {}", err);
        }
    }
}

fn write_line(dir: &Path, level: &str, category: &str, message: &str) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?;
    writeln!(file, "{} [{}] {} - {}", timestamp, level, category, message)?;
    Ok(())
}
