//! Service configuration, read from a TOML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration:
//!
//! ```toml
//! db_path = "xkcd.db"
//! log_level = "info"
//!
//! [xkcd]
//! url = "https://xkcd.com"
//! timeout_secs = 10
//! concurrency = 10
//!
//! [search]
//! index_ttl_secs = 60
//!
//! [events]
//! # redis_url = "redis://127.0.0.1/"
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::source::xkcd_client::DEFAULT_BASE_URL;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// SQLite database file, or `:memory:` for a throwaway in-memory corpus
    pub db_path: PathBuf,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    pub xkcd: XkcdConfig,
    pub search: SearchConfig,
    pub events: EventsConfig,
}

/// Upstream feed settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XkcdConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Width of the update fetch pool
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Period of the unconditional index rebuild
    pub index_ttl_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    /// Cross-process bus; in-process only when unset
    pub redis_url: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("xkcd.db"),
            log_level: "info".to_string(),
            xkcd: XkcdConfig::default(),
            search: SearchConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Default for XkcdConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
            concurrency: 10,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { index_ttl_secs: 60 }
    }
}

impl ServiceConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&text)
            .map_err(|e| Error::invalid_input(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.xkcd.concurrency == 0 {
            return Err(Error::invalid_input("xkcd.concurrency must be at least 1"));
        }
        if self.xkcd.timeout_secs == 0 {
            return Err(Error::invalid_input("xkcd.timeout_secs must be at least 1"));
        }
        if self.search.index_ttl_secs == 0 {
            return Err(Error::invalid_input(
                "search.index_ttl_secs must be at least 1",
            ));
        }
        if self.xkcd.url.trim().is_empty() {
            return Err(Error::invalid_input("xkcd.url must not be empty"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.xkcd.timeout_secs)
    }

    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.search.index_ttl_secs)
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ServiceConfig::from_toml("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.xkcd.url, "https://xkcd.com");
        assert_eq!(config.index_ttl(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_overrides() {
        let config = ServiceConfig::from_toml(
            r#"
            db_path = "/var/lib/xkcd/comics.db"

            [xkcd]
            concurrency = 4

            [events]
            redis_url = "redis://127.0.0.1/"
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/xkcd/comics.db"));
        assert_eq!(config.xkcd.concurrency, 4);
        assert_eq!(config.xkcd.timeout_secs, 10);
        assert_eq!(config.events.redis_url.as_deref(), Some("redis://127.0.0.1/"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ServiceConfig::from_toml("dbpath = \"x\"").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = ServiceConfig::default();
        config.xkcd.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidInput { .. })
        ));

        let mut config = ServiceConfig::default();
        config.search.index_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"\n[search]\nindex_ttl_secs = 5").unwrap();

        let config = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.index_ttl(), Duration::from_secs(5));

        let missing = ServiceConfig::load(Path::new("/nonexistent/xkcd.toml")).unwrap_err();
        assert!(missing.to_string().contains("failed to read config file"));

        let mut bad = NamedTempFile::new().unwrap();
        writeln!(bad, "[xkcd]\nconcurrency = 0").unwrap();
        assert!(matches!(
            ServiceConfig::load(bad.path()),
            Err(Error::InvalidInput { .. })
        ));
    }
}
