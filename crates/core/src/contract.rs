//! The cache capability contract a plugin host loads.

use async_trait::async_trait;
use chrono::Duration;

use crate::error::Result;

/// Capability name the cache plugin is registered under.
pub const CAPABILITY: &str = "cache";

/// The fixed capability set a cache backend exposes to the host.
///
/// A host loads any implementation of this trait interchangeably. The
/// transport used to reach it (see [`crate::protocol`]) is not part of the
/// contract.
#[async_trait]
pub trait CachePlugin: Send + Sync {
    /// Parses `uri`, connects, and verifies the backend is reachable.
    async fn init_connection(&mut self, uri: &str) -> Result<()>;

    /// Stores `value` under `key`. `ttl` is passed to the backend as given,
    /// including zero and negative values.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Returns the value stored under `key`, or [`crate::CacheError::CacheMiss`].
    async fn get(&self, key: &str) -> Result<String>;

    /// Releases the connection. Calling it without a connection is a no-op.
    async fn close(&mut self) -> Result<()>;
}
