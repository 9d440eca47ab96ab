use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const MAX_KEYS_RANGE: RangeInclusive<usize> = 32..=256;
pub const MAX_KEY_LEN_RANGE: RangeInclusive<usize> = 16..=64;
pub const MAX_VALUE_SIZE_RANGE: RangeInclusive<usize> = 64..=1024;
pub const MAX_NAMESPACES_RANGE: RangeInclusive<usize> = 1..=32;
pub const MAX_CALLBACKS_RANGE: RangeInclusive<usize> = 1..=64;

/// When change handlers run relative to the manager lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackDelivery {
    /// Handlers run inside the mutating call while the lock is held.
    #[default]
    Immediate,
    /// Handlers run after the lock is released, before the mutating call returns.
    Deferred,
}

/// Limits and behaviour switches fixed at [`init`](crate::ConfigManager::init).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub max_keys: usize,
    pub max_key_len: usize,
    pub max_value_size: usize,
    pub max_namespaces: usize,
    pub max_callbacks: usize,
    pub auto_commit: bool,
    pub callback_delivery: CallbackDelivery,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_keys: 128,
            max_key_len: 32,
            max_value_size: 256,
            max_namespaces: 8,
            max_callbacks: 16,
            auto_commit: false,
            callback_delivery: CallbackDelivery::Immediate,
        }
    }
}

impl ManagerConfig {
    /// Check every bound; the first violation is reported.
    pub fn validate(&self) -> Result<()> {
        check(self.max_keys, MAX_KEYS_RANGE, "max_keys out of range")?;
        check(self.max_key_len, MAX_KEY_LEN_RANGE, "max_key_len out of range")?;
        check(
            self.max_value_size,
            MAX_VALUE_SIZE_RANGE,
            "max_value_size out of range",
        )?;
        check(
            self.max_namespaces,
            MAX_NAMESPACES_RANGE,
            "max_namespaces out of range",
        )?;
        check(
            self.max_callbacks,
            MAX_CALLBACKS_RANGE,
            "max_callbacks out of range",
        )?;
        Ok(())
    }

    /// Parse a JSON document; omitted fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ManagerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|_| ConfigError::InvalidParam("unreadable configuration file"))?;
        Self::from_json_str(&raw)
    }
}

fn check(value: usize, range: RangeInclusive<usize>, reason: &'static str) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidParam(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        ManagerConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut config = ManagerConfig {
            max_keys: 32,
            max_key_len: 64,
            max_value_size: 1024,
            ..ManagerConfig::default()
        };
        config.validate().expect("edges accepted");

        config.max_keys = 31;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParam("max_keys out of range"))
        ));

        config.max_keys = 256;
        config.max_value_size = 1025;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParam("max_value_size out of range"))
        ));
    }

    #[test]
    fn json_file_overrides_selected_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "max_keys": 64, "auto_commit": true, "callback_delivery": "deferred" }}"#
        )
        .expect("write config");

        let config = ManagerConfig::from_json_file(file.path()).expect("config parsed");
        assert_eq!(config.max_keys, 64);
        assert!(config.auto_commit);
        assert_eq!(config.callback_delivery, CallbackDelivery::Deferred);
        assert_eq!(config.max_key_len, ManagerConfig::default().max_key_len);
    }

    #[test]
    fn json_rejects_out_of_range_values() {
        let err = ManagerConfig::from_json_str(r#"{ "max_key_len": 8 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParam(_)));
    }
}
