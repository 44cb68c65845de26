use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::DEFAULT_DEBOUNCE;

pub const DEFAULT_API_BASE: &str = "http://localhost:8080";
pub const DEFAULT_TOAST_TTL: Duration = Duration::from_millis(4000);

pub const ENV_API_BASE: &str = "DEMOFLOW_API_BASE";
pub const ENV_DEBOUNCE_MS: &str = "DEMOFLOW_DEBOUNCE_MS";
pub const ENV_TOAST_TTL_MS: &str = "DEMOFLOW_TOAST_TTL_MS";
pub const ENV_STORAGE: &str = "DEMOFLOW_STORAGE";
pub const ENV_POLICY_DIR: &str = "DEMOFLOW_POLICY_DIR";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a whole number of milliseconds, got '{value}'")]
    InvalidMillis { name: &'static str, value: String },
    #[error("{name} must be an http(s) URL, got '{value}'")]
    InvalidUrl { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    pub api_base: String,
    pub debounce: Duration,
    pub toast_ttl: Duration,
    pub storage_path: PathBuf,
    pub policy_dir: Option<PathBuf>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            toast_ttl: DEFAULT_TOAST_TTL,
            storage_path: crate::paths::default_session_path(),
            policy_dir: None,
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_millis(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    env_value(name)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidMillis { name, value: raw })
        })
        .transpose()
}

impl DemoConfig {
    /// Defaults overlaid with `DEMOFLOW_*` variables. Blank values count as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(api_base) = env_value(ENV_API_BASE) {
            cfg = cfg.with_api_base(&api_base)?;
        }
        if let Some(debounce) = env_millis(ENV_DEBOUNCE_MS)? {
            cfg.debounce = debounce;
        }
        if let Some(ttl) = env_millis(ENV_TOAST_TTL_MS)? {
            cfg.toast_ttl = ttl;
        }
        if let Some(path) = env_value(ENV_STORAGE) {
            cfg.storage_path = PathBuf::from(path);
        }
        cfg.policy_dir = env_value(ENV_POLICY_DIR).map(PathBuf::from);
        Ok(cfg)
    }

    pub fn with_api_base(mut self, api_base: &str) -> Result<Self, ConfigError> {
        let trimmed = api_base.trim().trim_end_matches('/');
        let valid = reqwest::Url::parse(trimmed)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
            .unwrap_or(false);
        if !valid {
            return Err(ConfigError::InvalidUrl {
                name: ENV_API_BASE,
                value: api_base.to_string(),
            });
        }
        self.api_base = trimmed.to_string();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScopedEnvVar, ENV_LOCK};

    fn clear_all() -> Vec<ScopedEnvVar> {
        [
            ENV_API_BASE,
            ENV_DEBOUNCE_MS,
            ENV_TOAST_TTL_MS,
            ENV_STORAGE,
            ENV_POLICY_DIR,
        ]
        .into_iter()
        .map(ScopedEnvVar::remove)
        .collect()
    }

    #[test]
    fn defaults_apply_when_unset_or_blank() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _cleared = clear_all();
        let _blank = ScopedEnvVar::set(ENV_DEBOUNCE_MS, "   ");

        let cfg = DemoConfig::from_env().unwrap();
        assert_eq!(cfg.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.debounce, Duration::from_millis(600));
        assert_eq!(cfg.toast_ttl, Duration::from_millis(4000));
        assert_eq!(cfg.policy_dir, None);
    }

    #[test]
    fn env_overrides_are_read() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _cleared = clear_all();
        let _api = ScopedEnvVar::set(ENV_API_BASE, "https://demo.foodgrid.test/");
        let _debounce = ScopedEnvVar::set(ENV_DEBOUNCE_MS, "250");
        let _storage = ScopedEnvVar::set(ENV_STORAGE, "/tmp/demoflow-session.json");
        let _policy = ScopedEnvVar::set(ENV_POLICY_DIR, "/etc/demoflow");

        let cfg = DemoConfig::from_env().unwrap();
        assert_eq!(cfg.api_base, "https://demo.foodgrid.test");
        assert_eq!(cfg.debounce, Duration::from_millis(250));
        assert_eq!(cfg.storage_path, PathBuf::from("/tmp/demoflow-session.json"));
        assert_eq!(cfg.policy_dir, Some(PathBuf::from("/etc/demoflow")));
    }

    #[test]
    fn malformed_values_are_errors() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _cleared = clear_all();
        let _ttl = ScopedEnvVar::set(ENV_TOAST_TTL_MS, "soon");
        assert_eq!(
            DemoConfig::from_env().unwrap_err(),
            ConfigError::InvalidMillis {
                name: ENV_TOAST_TTL_MS,
                value: "soon".to_string()
            }
        );

        assert!(DemoConfig::default().with_api_base("ftp://x").is_err());
        assert!(DemoConfig::default().with_api_base("not a url").is_err());
    }
}
