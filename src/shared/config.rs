//! Application configuration. Storage backend, paths, logging.

use serde::Deserialize;
use std::time::Duration;

/// Default SQLite busy timeout. Writers waiting on `BEGIN IMMEDIATE` give up after this.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Directory holding reviewers.db. Read from PR_REVIEWERS_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// `sqlite` (default) or `memory`. Read from PR_REVIEWERS_STORAGE.
    #[serde(default)]
    pub storage: Option<StorageKind>,

    /// SQLite busy timeout in ms. Read from PR_REVIEWERS_BUSY_TIMEOUT_MS.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,

    /// Fallback filter when RUST_LOG is unset. Read from PR_REVIEWERS_LOG_LEVEL.
    #[serde(default)]
    pub log_level: Option<String>,

    /// `text` (default) or `json`. Read from PR_REVIEWERS_LOG_FORMAT.
    #[serde(default)]
    pub log_format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var("PR_REVIEWERS_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        // environment wins over the file
        c = c.add_source(config::Environment::with_prefix("PR_REVIEWERS"));
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./data".to_string())
    }

    pub fn storage_or_default(&self) -> StorageKind {
        self.storage.unwrap_or_default()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS))
    }

    pub fn log_level_or_default(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    pub fn log_format_or_default(&self) -> LogFormat {
        self.log_format.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.data_dir_or_default(), "./data");
        assert_eq!(cfg.storage_or_default(), StorageKind::Sqlite);
        assert_eq!(cfg.busy_timeout(), Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS));
        assert_eq!(cfg.log_format_or_default(), LogFormat::Text);
    }

    #[test]
    fn deserializes_lowercase_enums() {
        let cfg: AppConfig = config::Config::builder()
            .set_override("storage", "memory")
            .unwrap()
            .set_override("log_format", "json")
            .unwrap()
            .set_override("busy_timeout_ms", 250)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.storage_or_default(), StorageKind::Memory);
        assert_eq!(cfg.log_format_or_default(), LogFormat::Json);
        assert_eq!(cfg.busy_timeout(), Duration::from_millis(250));
    }
}
