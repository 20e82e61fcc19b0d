//! Engine configuration.
//!
//! Defaults suit a local dev server; every field can be overridden from the
//! environment with [`SyncConfig::from_env`].

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const ENV_DEBOUNCE_MS: &str = "VAL_SYNC_DEBOUNCE_MS";
pub const ENV_NETWORK_GRACE_MS: &str = "VAL_SYNC_NETWORK_GRACE_MS";
pub const ENV_SYNC_INTERVAL_MS: &str = "VAL_SYNC_INTERVAL_MS";
pub const ENV_API_BASE: &str = "VAL_API_BASE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval at which debounced edits are flushed.
    #[serde(with = "millis")]
    pub debounce_interval: Duration,
    /// How long network failures must persist before the service is
    /// reported unavailable.
    #[serde(with = "millis")]
    pub network_grace: Duration,
    /// Interval between background reconciliation cycles.
    #[serde(with = "millis")]
    pub sync_interval: Duration,
    /// Chunk size of streamed uploads, in bytes.
    pub upload_chunk_size: usize,
    pub api_base: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_interval: Duration::from_millis(200),
            network_grace: Duration::from_secs(2),
            sync_interval: Duration::from_secs(5),
            upload_chunk_size: 64 * 1024,
            api_base: "http://localhost:3000/api/val".to_string(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `VAL_SYNC_*` and `VAL_API_BASE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = lookup(ENV_DEBOUNCE_MS) {
            config.debounce_interval = parse_millis(ENV_DEBOUNCE_MS, &ms)?;
        }
        if let Some(ms) = lookup(ENV_NETWORK_GRACE_MS) {
            config.network_grace = parse_millis(ENV_NETWORK_GRACE_MS, &ms)?;
        }
        if let Some(ms) = lookup(ENV_SYNC_INTERVAL_MS) {
            config.sync_interval = parse_millis(ENV_SYNC_INTERVAL_MS, &ms)?;
        }
        if let Some(base) = lookup(ENV_API_BASE) {
            let base = base.trim_end_matches('/');
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    var: ENV_API_BASE,
                    value: base.to_string(),
                    reason: "expected an http(s) url".to_string(),
                });
            }
            config.api_base = base.to_string();
        }
        Ok(config)
    }
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be positive".to_string(),
        }),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
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
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.debounce_interval, Duration::from_millis(200));
    }

    #[test]
    fn env_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            (ENV_DEBOUNCE_MS, "50"),
            (ENV_API_BASE, "https://example.com/api/val/"),
        ]))
        .unwrap();
        assert_eq!(config.debounce_interval, Duration::from_millis(50));
        assert_eq!(config.api_base, "https://example.com/api/val");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(SyncConfig::from_lookup(lookup(&[(ENV_SYNC_INTERVAL_MS, "soon")])).is_err());
        assert!(SyncConfig::from_lookup(lookup(&[(ENV_NETWORK_GRACE_MS, "0")])).is_err());
        assert!(SyncConfig::from_lookup(lookup(&[(ENV_API_BASE, "localhost")])).is_err());
    }

    #[test]
    fn deserializes_millis() {
        let config: SyncConfig =
            serde_json::from_value(serde_json::json!({"debounce_interval": 10})).unwrap();
        assert_eq!(config.debounce_interval, Duration::from_millis(10));
        assert_eq!(config.sync_interval, Duration::from_secs(5));
    }
}
