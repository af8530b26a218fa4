//! Configuration management using environment variables
//!
//! Hosts (the replay binary, embedding applications) read where trigger
//! specifications live and which storage tiers are available from the
//! environment. A `.env` file is honoured when present.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default tag-manager polling interval in milliseconds
pub const DEFAULT_TAG_MANAGER_POLL_INTERVAL_MS: u64 = 1000;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Trigger specification configuration
    pub triggers: TriggersConfig,

    /// Storage tier configuration
    pub storage: StorageConfig,

    /// Engine runtime tuning
    pub engine: EngineConfig,
}

/// Where the ordered trigger list is loaded from
#[derive(Debug, Clone, Deserialize)]
pub struct TriggersConfig {
    /// JSON file holding an array of trigger specifications
    pub file: PathBuf,
}

/// Storage tier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// File backing the durable tier (`once` policy)
    pub durable_path: PathBuf,

    /// Whether a session-scoped tier is available (`session` policy)
    pub session_enabled: bool,
}

/// Engine runtime tuning
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Polling interval for the third-party tag-manager fallback channel
    pub tag_manager_poll_interval_ms: u64,
}

impl EngineConfig {
    /// Tag-manager polling interval as a `Duration`
    pub fn tag_manager_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tag_manager_poll_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tag_manager_poll_interval_ms: DEFAULT_TAG_MANAGER_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Used by `from_env` and by tests that must not touch the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let triggers_file = lookup("TRIGGERS_FILE").unwrap_or_else(|| "triggers.json".to_string());
        if triggers_file.trim().is_empty() {
            return Err(Error::config("TRIGGERS_FILE must not be empty"));
        }

        let session_enabled = lookup("TRIGGER_SESSION_STORAGE")
            .unwrap_or_else(|| "true".to_string())
            .parse::<bool>()
            .map_err(|e| Error::config(format!("Invalid TRIGGER_SESSION_STORAGE: {}", e)))?;

        let poll_interval_ms = lookup("TAG_MANAGER_POLL_INTERVAL_MS")
            .unwrap_or_else(|| DEFAULT_TAG_MANAGER_POLL_INTERVAL_MS.to_string())
            .parse::<u64>()
            .map_err(|e| Error::config(format!("Invalid TAG_MANAGER_POLL_INTERVAL_MS: {}", e)))?;

        if poll_interval_ms == 0 {
            return Err(Error::config(
                "TAG_MANAGER_POLL_INTERVAL_MS must be greater than 0",
            ));
        }

        Ok(Self {
            triggers: TriggersConfig {
                file: PathBuf::from(triggers_file),
            },
            storage: StorageConfig {
                durable_path: PathBuf::from(
                    lookup("TRIGGER_STORAGE_PATH")
                        .unwrap_or_else(|| ".feedback_widget_storage.json".to_string()),
                ),
                session_enabled,
            },
            engine: EngineConfig {
                tag_manager_poll_interval_ms: poll_interval_ms,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.triggers.file, PathBuf::from("triggers.json"));
        assert_eq!(
            config.storage.durable_path,
            PathBuf::from(".feedback_widget_storage.json")
        );
        assert!(config.storage.session_enabled);
        assert_eq!(
            config.engine.tag_manager_poll_interval(),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("TRIGGERS_FILE", "/etc/widget/triggers.json"),
            ("TRIGGER_STORAGE_PATH", "/var/lib/widget/store.json"),
            ("TRIGGER_SESSION_STORAGE", "false"),
            ("TAG_MANAGER_POLL_INTERVAL_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.triggers.file, PathBuf::from("/etc/widget/triggers.json"));
        assert!(!config.storage.session_enabled);
        assert_eq!(config.engine.tag_manager_poll_interval_ms, 250);
    }

    #[test]
    fn test_invalid_poll_interval() {
        let err = Config::from_lookup(lookup_from(&[("TAG_MANAGER_POLL_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("TAG_MANAGER_POLL_INTERVAL_MS"));

        let err = Config::from_lookup(lookup_from(&[("TAG_MANAGER_POLL_INTERVAL_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_session_flag() {
        let err =
            Config::from_lookup(lookup_from(&[("TRIGGER_SESSION_STORAGE", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("TRIGGER_SESSION_STORAGE"));
    }
}
