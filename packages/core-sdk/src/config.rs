use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};

use crate::providers::ProviderEndpoints;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8001";
pub const DEFAULT_DB_PATH: &str = "quillseo.db";
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;

/**
 * \brief 运行配置，来自环境变量（缺省值见常量）。
 */
#[derive(Debug, Clone)]
pub struct AppConfig {
    /** \brief HTTP 监听地址 */
    pub addr: String,
    /** \brief SQLite 数据库文件 */
    pub db_path: PathBuf,
    /** \brief 单次服务商调用超时 */
    pub provider_timeout: Duration,
    /** \brief 事件日志目录；为空时不写文件 */
    pub log_dir: Option<PathBuf>,
    pub endpoints: ProviderEndpoints,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            log_dir: None,
            endpoints: ProviderEndpoints::default(),
        }
    }
}

impl AppConfig {
    /**
     * \brief 从进程环境读取配置。
     */
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /**
     * \brief 以任意键值来源构造配置，便于测试。
     */
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("QUILLSEO_ADDR") {
            cfg.addr = addr;
        }
        if let Some(path) = get("QUILLSEO_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Some(secs) = get("QUILLSEO_PROVIDER_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("invalid QUILLSEO_PROVIDER_TIMEOUT_SECS: {}", secs))?;
            if secs == 0 {
                anyhow::bail!("QUILLSEO_PROVIDER_TIMEOUT_SECS must be positive");
            }
            cfg.provider_timeout = Duration::from_secs(secs);
        }
        cfg.log_dir = get("QUILLSEO_LOG_DIR").map(PathBuf::from);

        let endpoints = &mut cfg.endpoints;
        for (key, slot) in [
            ("QUILLSEO_OPENAI_BASE", &mut endpoints.openai),
            ("QUILLSEO_ANTHROPIC_BASE", &mut endpoints.anthropic),
            ("QUILLSEO_GEMINI_BASE", &mut endpoints.gemini),
            ("QUILLSEO_GROQ_BASE", &mut endpoints.groq),
            ("QUILLSEO_GROK_BASE", &mut endpoints.grok),
        ] {
            if let Some(base) = get(key) {
                *slot = base;
            }
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_is_empty() {
        let cfg = AppConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(cfg.addr, DEFAULT_ADDR);
        assert_eq!(cfg.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(cfg.provider_timeout, Duration::from_secs(60));
        assert!(cfg.log_dir.is_none());
        assert_eq!(cfg.endpoints, ProviderEndpoints::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("QUILLSEO_ADDR", "0.0.0.0:9000"),
            ("QUILLSEO_DB_PATH", "/tmp/q.db"),
            ("QUILLSEO_PROVIDER_TIMEOUT_SECS", "30"),
            ("QUILLSEO_LOG_DIR", "logs"),
            ("QUILLSEO_GROK_BASE", "http://localhost:4000"),
        ]))
        .expect("config");
        assert_eq!(cfg.addr, "0.0.0.0:9000");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/q.db"));
        assert_eq!(cfg.provider_timeout, Duration::from_secs(30));
        assert_eq!(cfg.log_dir, Some(PathBuf::from("logs")));
        assert_eq!(cfg.endpoints.grok, "http://localhost:4000");
        assert_eq!(cfg.endpoints.openai, ProviderEndpoints::default().openai);
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let cfg = AppConfig::from_lookup(lookup(&[("QUILLSEO_ADDR", "  ")])).expect("config");
        assert_eq!(cfg.addr, DEFAULT_ADDR);
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("QUILLSEO_PROVIDER_TIMEOUT_SECS", "soon")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("QUILLSEO_PROVIDER_TIMEOUT_SECS", "0")])).is_err());
    }
}
