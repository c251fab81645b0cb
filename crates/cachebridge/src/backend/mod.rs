//! Backend seam between the cache adapter and the key-value store client.
//!
//! The adapter only talks to [`Connector`] and [`CacheBackend`]. The Redis
//! implementation lives in [`redis_impl`]; tests plug in the in-memory
//! backend from `memory`.

use std::time::Duration;

use async_trait::async_trait;
use cachebridge_core::ConnectionOptions;
use thiserror::Error;

#[cfg(test)]
pub mod memory;
pub mod redis_impl;

pub use redis_impl::{RedisBackend, RedisConnector};

/// Errors reported by a backend client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("operation failed: {0}")]
    Operation(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Builds backend handles from connection options.
#[async_trait]
pub trait Connector: Send + Sync {
    type Backend: CacheBackend;

    /// Creates a handle. Reachability is checked separately with [`CacheBackend::ping`].
    async fn connect(&self, opts: &ConnectionOptions) -> Result<Self::Backend, BackendError>;
}

/// A live handle to the key-value store.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Round-trips a no-op command.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Stores `value` under `key` with the given signed TTL.
    async fn set(&self, key: &str, value: &str, ttl: chrono::Duration)
        -> Result<(), BackendError>;

    /// Returns `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Releases the handle.
    async fn close(self) -> Result<(), BackendError>;
}
