use thiserror::Error;

use crate::backend::BackendError;
use crate::value::ValueType;

/// Result alias used by every public operation of the crate.
pub type Result<T> = core::result::Result<T, ConfigError>;

/// Capacity-limited table that ran out of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Keys,
    Namespaces,
    Callbacks,
    Defaults,
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Resource::Keys => "key",
            Resource::Namespaces => "namespace",
            Resource::Callbacks => "callback",
            Resource::Defaults => "default",
        };
        f.write_str(label)
    }
}

/// Status taxonomy surfaced by the configuration manager.
///
/// Codec, cipher and backend failures are folded into these variants before they
/// leave the crate, so callers only ever match on this enum.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),
    #[error("configuration manager is not initialized")]
    NotInit,
    #[error("configuration manager is already initialized")]
    AlreadyInit,
    #[error("entry not found")]
    NotFound,
    #[error("type mismatch: expected {expected}, stored {found}")]
    TypeMismatch { expected: ValueType, found: ValueType },
    #[error("key length {len} exceeds limit {max}")]
    KeyTooLong { len: usize, max: usize },
    #[error("buffer too small: {required} bytes required, {available} available")]
    BufferTooSmall { required: usize, available: usize },
    #[error("no storage backend bound")]
    NoBackend,
    #[error("no encryption key configured")]
    NoEncryptionKey,
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("{0} capacity exhausted")]
    Full(Resource),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("decryption failed")]
    Crypto,
}

impl ConfigError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        ConfigError::InvalidFormat(reason.into())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        ConfigError::InvalidFormat(value.to_string())
    }
}

impl From<postcard::Error> for ConfigError {
    fn from(value: postcard::Error) -> Self {
        ConfigError::InvalidFormat(value.to_string())
    }
}

impl From<base64::DecodeError> for ConfigError {
    fn from(value: base64::DecodeError) -> Self {
        ConfigError::InvalidFormat(value.to_string())
    }
}

impl From<glob::PatternError> for ConfigError {
    fn from(_: glob::PatternError) -> Self {
        ConfigError::InvalidParam("malformed wildcard pattern")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_bound() {
        let err = ConfigError::KeyTooLong { len: 40, max: 32 };
        assert_eq!(err.to_string(), "key length 40 exceeds limit 32");

        let err = ConfigError::Full(Resource::Namespaces);
        assert_eq!(err.to_string(), "namespace capacity exhausted");
    }

    #[test]
    fn codec_errors_collapse_into_invalid_format() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            ConfigError::from(json_err),
            ConfigError::InvalidFormat(_)
        ));
    }
}
