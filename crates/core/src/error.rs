//! Error types shared by every cache plugin operation.

use std::fmt;

use thiserror::Error;

/// Errors returned by the cache plugin contract.
///
/// Every variant is cheap to clone and comparable, so callers can branch on
/// [`CacheError::CacheMiss`] with `==` instead of inspecting the message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid Redis URI: must start with redis:// or rediss://")]
    InvalidUri,
    #[error("failed to parse Redis URI: {0}")]
    ConfigParse(#[from] ConfigError),
    #[error("failed to ping Redis server: {0}")]
    UnreachableBackend(String),
    #[error("redis client not initialized")]
    NotInitialized,
    #[error("redis: nil")]
    CacheMiss,
    #[error("{}", describe_operation(.operation, .key, .cause))]
    BackendOperation {
        operation: Operation,
        key: String,
        cause: String,
    },
    #[error("error closing Redis client: {0}")]
    Close(String),
}

impl CacheError {
    /// Stable machine-readable code for this error, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::InvalidUri => "invalid_uri",
            CacheError::ConfigParse(_) => "config_parse",
            CacheError::UnreachableBackend(_) => "unreachable_backend",
            CacheError::NotInitialized => "not_initialized",
            CacheError::CacheMiss => "cache_miss",
            CacheError::BackendOperation { .. } => "backend_operation",
            CacheError::Close(_) => "close",
        }
    }

    /// Returns true when the error is the expected "key absent" outcome of a get.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, CacheError::CacheMiss)
    }

    /// Builds a [`CacheError::BackendOperation`] for a failed set.
    pub fn set_failed(key: impl Into<String>, cause: impl fmt::Display) -> Self {
        CacheError::BackendOperation {
            operation: Operation::Set,
            key: key.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds a [`CacheError::BackendOperation`] for a failed get.
    pub fn get_failed(key: impl Into<String>, cause: impl fmt::Display) -> Self {
        CacheError::BackendOperation {
            operation: Operation::Get,
            key: key.into(),
            cause: cause.to_string(),
        }
    }
}

/// The cache operation a [`CacheError::BackendOperation`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Set,
    Get,
}

fn describe_operation(operation: &Operation, key: &str, cause: &str) -> String {
    match operation {
        Operation::Set => {
            format!("failed to set cache entry in Redis for key '{key}': {cause}")
        }
        Operation::Get => {
            format!("failed to get cache entry from Redis for key '{key}': {cause}")
        }
    }
}

/// Errors raised while turning a connection URI into connection options.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed URI: {0}")]
    MalformedUri(String),
    #[error("redis: unexpected option: {}", .0.join(", "))]
    UnexpectedOptions(Vec<String>),
    #[error("redis: invalid {param} value {value:?}: {reason}")]
    InvalidValue {
        param: String,
        value: String,
        reason: String,
    },
    #[error("redis: invalid database number: {0:?}")]
    InvalidDatabase(String),
    #[error("redis: multiple {0} option values")]
    DuplicateOption(String),
    #[error("redis: skip_verify requires the rediss:// scheme")]
    SkipVerifyWithoutTls,
}

/// Result type for cache plugin operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_display() {
        assert_eq!(
            CacheError::NotInitialized.to_string(),
            "redis client not initialized"
        );
    }

    #[test]
    fn test_set_failed_display_contains_marker_and_key() {
        let error = CacheError::set_failed("testkey", "connection reset");
        let message = error.to_string();
        assert!(message.contains("failed to set cache entry"));
        assert!(message.contains("testkey"));
        assert!(message.contains("connection reset"));
    }

    #[test]
    fn test_get_failed_display_contains_marker_and_key() {
        let error = CacheError::get_failed("errorkey", "redis GET error");
        assert_eq!(
            error.to_string(),
            "failed to get cache entry from Redis for key 'errorkey': redis GET error"
        );
    }

    #[test]
    fn test_cache_miss_is_comparable() {
        let error = CacheError::CacheMiss;
        assert_eq!(error, CacheError::CacheMiss);
        assert!(error.is_cache_miss());
        assert!(!CacheError::get_failed("k", "boom").is_cache_miss());
    }

    #[test]
    fn test_config_parse_wraps_config_error() {
        let error: CacheError =
            ConfigError::UnexpectedOptions(vec!["dialTimeout".to_string()]).into();
        assert_eq!(
            error.to_string(),
            "failed to parse Redis URI: redis: unexpected option: dialTimeout"
        );
        assert_eq!(error.kind(), "config_parse");
    }

    #[test]
    fn test_unexpected_options_are_joined() {
        let error = ConfigError::UnexpectedOptions(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(error.to_string(), "redis: unexpected option: a, b");
    }

    #[test]
    fn test_invalid_value_display() {
        let error = ConfigError::InvalidValue {
            param: "pool_size".to_string(),
            value: "lots".to_string(),
            reason: "expected an integer".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "redis: invalid pool_size value \"lots\": expected an integer"
        );
    }

    #[test]
    fn test_kinds_are_distinct() {
        let kinds = [
            CacheError::InvalidUri.kind(),
            CacheError::ConfigParse(ConfigError::SkipVerifyWithoutTls).kind(),
            CacheError::UnreachableBackend(String::new()).kind(),
            CacheError::NotInitialized.kind(),
            CacheError::CacheMiss.kind(),
            CacheError::set_failed("k", "e").kind(),
            CacheError::Close(String::new()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}
