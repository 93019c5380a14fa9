use std::path::PathBuf;
use std::time::Duration;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub default_lang: Option<String>,
    pub default_format: Option<String>,
    pub default_model: Option<String>,
    pub video_cache_minutes: Option<u64>,
    pub video_cache_entries: Option<usize>,
    pub summary_cache_hours: Option<u64>,
    pub summary_cache_entries: Option<usize>,
}

impl Config {
    /// Load config from ~/.config/ytnote/config.toml if it exists
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    pub fn video_cache(&self) -> CacheSettings {
        let mut settings = CacheSettings::video_data();
        if let Some(minutes) = self.video_cache_minutes {
            settings.expiry = Duration::from_secs(minutes * 60);
        }
        if let Some(entries) = self.video_cache_entries {
            settings.max_entries = entries;
        }
        settings
    }

    pub fn summary_cache(&self) -> CacheSettings {
        let mut settings = CacheSettings::summaries();
        if let Some(hours) = self.summary_cache_hours {
            settings.expiry = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(entries) = self.summary_cache_entries {
            settings.max_entries = entries;
        }
        settings
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytnote")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
default_lang = "es"
default_format = "json"
default_model = "gpt-4o"
video_cache_minutes = 10
summary_cache_entries = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_lang.as_deref(), Some("es"));
        assert_eq!(config.default_format.as_deref(), Some("json"));
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.video_cache().expiry, Duration::from_secs(600));
        assert_eq!(config.video_cache().max_entries, 100);
        assert_eq!(config.summary_cache().max_entries, 5);
        assert_eq!(config.summary_cache().expiry, Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.default_lang.is_none());
        assert!(config.default_format.is_none());
        assert_eq!(config.video_cache().expiry, Duration::from_secs(30 * 60));
        assert_eq!(config.summary_cache().max_entries, 50);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(r#"default_lang = "fr""#).unwrap();
        assert_eq!(config.default_lang.as_deref(), Some("fr"));
        assert!(config.default_model.is_none());
    }
}
