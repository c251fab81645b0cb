//! Redis backend using the connection manager.
//!
//! Connection options map onto the client as follows:
//!
//! - address, credentials, db, protocol and TLS go through the client URL
//!   rendered by [`ConnectionOptions::client_url`]
//! - dial timeout → connection timeout
//! - the longer of read/write timeout → response timeout
//! - max retries and retry backoff → reconnect policy
//!
//! The connection manager multiplexes one connection, so pool options are
//! accepted and logged but do not size anything. `CLIENT SETNAME` is sent once
//! after the first connect; the manager does not replay it when it
//! reconnects, so the name is lost after a reconnect.

use std::time::Duration;

use async_trait::async_trait;
use cachebridge_core::ConnectionOptions;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;

use super::super::{BackendError, CacheBackend, Connector};
use super::error::map_redis_error;

/// Creates [`RedisBackend`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    type Backend = RedisBackend;

    async fn connect(&self, opts: &ConnectionOptions) -> Result<RedisBackend, BackendError> {
        RedisBackend::connect(opts).await
    }
}

/// Redis cache backend using connection manager for pooling.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Opens a managed connection described by `opts`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Connection` if the connection cannot be established.
    pub async fn connect(opts: &ConnectionOptions) -> Result<Self, BackendError> {
        let client = redis::Client::open(opts.client_url()).map_err(map_redis_error)?;

        tracing::debug!(
            addr = %opts.display_addr(),
            pool_size = opts.pool_size,
            pool_fifo = opts.pool_fifo,
            min_idle_conns = opts.min_idle_conns,
            max_idle_conns = opts.max_idle_conns,
            max_active_conns = opts.max_active_conns,
            "Pool options are not applied to the multiplexed connection"
        );

        let mut conn = ConnectionManager::new_with_config(client, manager_config(opts))
            .await
            .map_err(map_redis_error)?;

        if let Some(name) = &opts.client_name {
            let () = redis::cmd("CLIENT")
                .arg("SETNAME")
                .arg(name)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
        }

        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        tracing::trace!(reply = %pong, "Redis ping");
        Ok(())
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: chrono::Duration,
    ) -> Result<(), BackendError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        match set_expiry(ttl) {
            SetExpiry::Persist => {}
            SetExpiry::Seconds(secs) => {
                cmd.arg("EX").arg(secs);
            }
            SetExpiry::Millis(ms) => {
                cmd.arg("PX").arg(ms);
            }
            SetExpiry::KeepTtl => {
                cmd.arg("KEEPTTL");
            }
        }

        let mut conn = self.conn.clone();
        let () = cmd.query_async(&mut conn).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = conn.get(key).await.map_err(map_redis_error)?;
        Ok(result)
    }

    async fn close(self) -> Result<(), BackendError> {
        // The manager closes its connection once the last clone is dropped.
        drop(self.conn);
        Ok(())
    }
}

/// Expiry argument of a `SET` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetExpiry {
    /// No expiry (`ttl == 0`, or negative other than [`KEEP_TTL`]).
    Persist,
    Seconds(u64),
    Millis(u64),
    /// Keep whatever TTL the key already has (`ttl == KEEP_TTL`).
    KeepTtl,
}

/// TTL sentinel asking `SET` to keep the key's current expiry (minus one nanosecond).
pub const KEEP_TTL: chrono::Duration = chrono::Duration::nanoseconds(-1);

/// Chooses the `SET` expiry for a signed TTL.
///
/// Whole seconds use `EX`; other positive TTLs use `PX`, rounding
/// sub-millisecond TTLs up to one millisecond. Zero and negative TTLs store
/// without expiry, except [`KEEP_TTL`] which sends `KEEPTTL`.
pub(crate) fn set_expiry(ttl: chrono::Duration) -> SetExpiry {
    if ttl == KEEP_TTL {
        return SetExpiry::KeepTtl;
    }
    if ttl <= chrono::Duration::zero() {
        return SetExpiry::Persist;
    }

    let millis = u64::try_from(ttl.num_milliseconds()).unwrap_or(u64::MAX).max(1);
    if ttl.subsec_nanos() == 0 {
        SetExpiry::Seconds(u64::try_from(ttl.num_seconds()).unwrap_or(u64::MAX))
    } else {
        SetExpiry::Millis(millis)
    }
}

fn manager_config(opts: &ConnectionOptions) -> ConnectionManagerConfig {
    let retries = opts.max_retries.unwrap_or(0);
    let mut config = ConnectionManagerConfig::new()
        .set_number_of_retries(usize::try_from(retries).unwrap_or(usize::MAX));

    if let Some(min) = opts.min_retry_backoff {
        config = config.set_factor(millis(min).max(1));
    }
    if let Some(max) = opts.max_retry_backoff {
        config = config.set_max_delay(millis(max));
    }
    if let Some(dial) = opts.dial_timeout {
        config = config.set_connection_timeout(dial);
    }
    if let Some(response) = opts.response_timeout() {
        config = config.set_response_timeout(response);
    }

    config
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
