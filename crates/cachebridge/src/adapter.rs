//! Cache adapter: owns at most one backend handle and implements the plugin contract.
//!
//! State machine: `Uninitialized → (init_connection ok) → Ready →
//! (close | failed init_connection) → Uninitialized`.

use async_trait::async_trait;
use cachebridge_core::{parse_uri, CacheError, CachePlugin, Result};

use crate::backend::{BackendError, CacheBackend, Connector, RedisConnector};

/// Cache plugin backed by Redis.
pub type RedisCachePlugin = CacheAdapter<RedisConnector>;

/// Adapter holding an optional backend handle.
///
/// `set` and `get` take `&self` and rely on the backend being safe for
/// concurrent use; no lock is taken around them.
pub struct CacheAdapter<C: Connector> {
    connector: C,
    handle: Option<C::Backend>,
}

impl<C: Connector> CacheAdapter<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handle: None,
        }
    }

    /// Returns true while a live handle is held.
    pub fn is_ready(&self) -> bool {
        self.handle.is_some()
    }

    fn handle(&self) -> Result<&C::Backend> {
        self.handle.as_ref().ok_or(CacheError::NotInitialized)
    }

    /// Closes the previous handle, if any, before a new one is built.
    async fn discard_previous(&mut self) {
        if self.handle.is_none() {
            return;
        }
        tracing::info!("Replacing existing Redis connection");
        if let Err(e) = self.close().await {
            tracing::warn!(error = %e, "Failed to close previous Redis connection");
        }
    }
}

impl Default for RedisCachePlugin {
    fn default() -> Self {
        Self::new(RedisConnector)
    }
}

#[async_trait]
impl<C: Connector> CachePlugin for CacheAdapter<C> {
    async fn init_connection(&mut self, uri: &str) -> Result<()> {
        self.discard_previous().await;

        let opts = parse_uri(uri).inspect_err(|e| {
            tracing::error!(error = %e, "Rejected connection URI");
        })?;

        tracing::info!(
            addr = %opts.display_addr(),
            tls = opts.tls,
            "Connecting to Redis"
        );

        // Connecting and the ping share one deadline.
        let bound = opts.liveness_timeout();
        let deadline = tokio::time::Instant::now() + bound;

        let backend = match tokio::time::timeout_at(deadline, self.connector.connect(&opts)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(bound)),
        }
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to Redis");
            CacheError::UnreachableBackend(e.to_string())
        })?;

        let ping = match tokio::time::timeout_at(deadline, backend.ping()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(bound)),
        };

        if let Err(e) = ping {
            tracing::error!(error = %e, "Redis liveness check failed");
            if let Err(close_err) = backend.close().await {
                tracing::warn!(error = %close_err, "Failed to close unreachable Redis connection");
            }
            return Err(CacheError::UnreachableBackend(e.to_string()));
        }

        self.handle = Some(backend);
        tracing::info!(addr = %opts.display_addr(), "Redis connection ready");
        Ok(())
    }

    async fn set(&self, key: &str, value: &str, ttl: chrono::Duration) -> Result<()> {
        let backend = self.handle()?;
        backend.set(key, value, ttl).await.map_err(|e| {
            tracing::warn!(key, error = %e, "Cache set failed");
            CacheError::set_failed(key, e)
        })
    }

    async fn get(&self, key: &str) -> Result<String> {
        let backend = self.handle()?;
        match backend.get(key).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(CacheError::CacheMiss),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache get failed");
                Err(CacheError::get_failed(key, e))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(backend) = self.handle.take() else {
            return Ok(());
        };
        backend.close().await.map_err(|e| CacheError::Close(e.to_string()))?;
        tracing::info!("Redis connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::memory::{MemoryConnector, SetCall};

    const URI: &str = "redis://localhost:6379";

    fn adapter() -> (CacheAdapter<MemoryConnector>, MemoryConnector) {
        let connector = MemoryConnector::new();
        (CacheAdapter::new(connector.clone()), connector)
    }

    async fn ready_adapter() -> (CacheAdapter<MemoryConnector>, MemoryConnector) {
        let (mut adapter, connector) = adapter();
        adapter.init_connection(URI).await.unwrap();
        (adapter, connector)
    }

    #[tokio::test]
    async fn test_init_connection_invalid_uri() {
        let (mut adapter, connector) = adapter();
        let err = adapter.init_connection("invalid-uri").await.unwrap_err();
        assert_eq!(err, CacheError::InvalidUri);
        assert!(err.to_string().contains("invalid Redis URI"));
        assert!(!adapter.is_ready());
        assert_eq!(connector.connects(), 0);
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_init_connection_unexpected_option() {
        let (mut adapter, connector) = adapter();
        for param in ["dialTimeout", "poolSize", "minIdleConns", "idleTimeout"] {
            let err = adapter
                .init_connection(&format!("{URI}?{param}=whatever"))
                .await
                .unwrap_err();
            assert!(matches!(err, CacheError::ConfigParse(_)), "{err:?}");
            assert!(
                err.to_string()
                    .contains(&format!("redis: unexpected option: {param}")),
                "{err}"
            );
            assert!(!adapter.is_ready());
        }
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_init_connection_passes_parsed_options() {
        let (mut adapter, connector) = adapter();
        adapter
            .init_connection("redis://cache:6380/3?dial_timeout=2s")
            .await
            .unwrap();
        assert!(adapter.is_ready());

        let opts = connector.last_options().unwrap();
        assert_eq!(opts.host, "cache");
        assert_eq!(opts.port, 6380);
        assert_eq!(opts.db, 3);
        assert_eq!(opts.dial_timeout, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_init_connection_connect_failure() {
        let (mut adapter, connector) = adapter();
        connector.faults(|f| f.connect = Some(BackendError::Connection("refused".to_string())));

        let err = adapter.init_connection(URI).await.unwrap_err();
        assert!(matches!(err, CacheError::UnreachableBackend(ref m) if m.contains("refused")));
        assert!(!adapter.is_ready());
        assert_eq!(connector.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_init_connection_ping_failure_discards_handle() {
        let (mut adapter, connector) = adapter();
        connector.faults(|f| f.ping = Some(BackendError::Connection("no route".to_string())));

        let err = adapter.init_connection(URI).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to ping Redis server"));
        assert!(!adapter.is_ready());
        assert_eq!(connector.closes(), 1);
        assert_eq!(connector.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_connection_ping_timeout() {
        let (mut adapter, connector) = adapter();
        connector.faults(|f| f.ping_delay = Some(Duration::from_secs(60)));

        let err = adapter
            .init_connection("redis://localhost?dial_timeout=1s&read_timeout=1s")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CacheError::UnreachableBackend(BackendError::Timeout(Duration::from_secs(3)).to_string())
        );
        assert!(!adapter.is_ready());
        assert_eq!(connector.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_connection_connect_hang_is_bounded() {
        let (mut adapter, connector) = adapter();
        connector.faults(|f| f.connect_delay = Some(Duration::from_secs(60)));

        let started = tokio::time::Instant::now();
        let err = adapter
            .init_connection("redis://localhost?dial_timeout=1s&read_timeout=1s")
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(
            err,
            CacheError::UnreachableBackend(BackendError::Timeout(Duration::from_secs(3)).to_string())
        );
        assert!(!adapter.is_ready());
        assert_eq!(connector.live_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_ping_share_one_bound() {
        let (mut adapter, connector) = adapter();
        connector.faults(|f| {
            f.connect_delay = Some(Duration::from_secs(2));
            f.ping_delay = Some(Duration::from_secs(2));
        });

        let started = tokio::time::Instant::now();
        let err = adapter
            .init_connection("redis://localhost?dial_timeout=1s&read_timeout=1s")
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert!(matches!(err, CacheError::UnreachableBackend(_)));
        assert_eq!(connector.closes(), 1);
        assert_eq!(connector.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_reinit_closes_previous_handle() {
        let (mut adapter, connector) = ready_adapter().await;
        adapter.init_connection(URI).await.unwrap();

        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.closes(), 1);
        assert_eq!(connector.live_handles(), 1);
    }

    #[tokio::test]
    async fn test_reinit_with_invalid_uri_leaves_no_handle() {
        let (mut adapter, connector) = ready_adapter().await;
        let err = adapter.init_connection("http://nope").await.unwrap_err();
        assert_eq!(err, CacheError::InvalidUri);
        assert!(!adapter.is_ready());
        assert_eq!(connector.live_handles(), 0);
    }

    #[tokio::test]
    async fn test_set_not_initialized() {
        let (adapter, connector) = adapter();
        let err = adapter
            .set("key", "value", chrono::Duration::minutes(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "redis client not initialized");
        assert!(connector.set_calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_success_records_one_call() {
        let (adapter, connector) = ready_adapter().await;
        adapter
            .set("testkey", "testvalue", chrono::Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(
            connector.set_calls(),
            vec![SetCall {
                key: "testkey".to_string(),
                value: "testvalue".to_string(),
                ttl: chrono::Duration::seconds(60),
            }]
        );
    }

    #[tokio::test]
    async fn test_set_passes_zero_and_negative_ttl_through() {
        let (adapter, connector) = ready_adapter().await;
        adapter.set("a", "1", chrono::Duration::zero()).await.unwrap();
        adapter.set("b", "2", chrono::Duration::seconds(-5)).await.unwrap();

        let ttls: Vec<_> = connector.set_calls().into_iter().map(|c| c.ttl).collect();
        assert_eq!(ttls, vec![chrono::Duration::zero(), chrono::Duration::seconds(-5)]);
    }

    #[tokio::test]
    async fn test_set_backend_error() {
        let (adapter, connector) = ready_adapter().await;
        connector.faults(|f| f.set = Some(BackendError::Operation("OOM".to_string())));

        let err = adapter
            .set("testkey", "testvalue", chrono::Duration::minutes(1))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("failed to set cache entry"), "{message}");
        assert!(message.contains("testkey"), "{message}");
        assert!(message.contains("OOM"), "{message}");
        assert_eq!(connector.set_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_get_not_initialized() {
        let (adapter, connector) = adapter();
        let result = adapter.get("key").await;
        assert_eq!(result, Err(CacheError::NotInitialized));
        assert_eq!(connector.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_cache_miss() {
        let (adapter, _connector) = ready_adapter().await;
        let err = adapter.get("missingkey").await.unwrap_err();
        assert_eq!(err, CacheError::CacheMiss);
        assert!(err.is_cache_miss());
    }

    #[tokio::test]
    async fn test_get_backend_error() {
        let (adapter, connector) = ready_adapter().await;
        connector.faults(|f| f.get = Some(BackendError::Operation("redis GET error".to_string())));

        let err = adapter.get("errorkey").await.unwrap_err();
        assert!(!err.is_cache_miss());
        let message = err.to_string();
        assert!(message.contains("failed to get cache entry"), "{message}");
        assert!(message.contains("redis GET error"), "{message}");
        assert!(message.contains("errorkey"), "{message}");
    }

    #[tokio::test]
    async fn test_get_success_returns_value_unmodified() {
        let (adapter, connector) = ready_adapter().await;
        connector.insert("testkey", "testvalue");
        assert_eq!(adapter.get("testkey").await.unwrap(), "testvalue");

        connector.insert("json", " {\"a\": 1}\n");
        assert_eq!(adapter.get("json").await.unwrap(), " {\"a\": 1}\n");
    }

    #[tokio::test]
    async fn test_close_without_handle_is_noop() {
        let (mut adapter, connector) = adapter();
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
        assert_eq!(connector.closes(), 0);
    }

    #[tokio::test]
    async fn test_close_clears_handle() {
        let (mut adapter, connector) = ready_adapter().await;
        adapter.close().await.unwrap();
        assert!(!adapter.is_ready());
        assert_eq!(connector.live_handles(), 0);

        adapter.close().await.unwrap();
        assert_eq!(connector.closes(), 1);
        assert_eq!(
            adapter.get("key").await,
            Err(CacheError::NotInitialized)
        );
    }

    #[tokio::test]
    async fn test_close_error_still_clears_handle() {
        let (mut adapter, connector) = ready_adapter().await;
        connector.faults(|f| f.close = Some(BackendError::Connection("broken pipe".to_string())));

        let err = adapter.close().await.unwrap_err();
        assert_eq!(
            err,
            CacheError::Close("connection failed: broken pipe".to_string())
        );
        assert!(!adapter.is_ready());

        connector.faults(|f| f.close = None);
        adapter.init_connection(URI).await.unwrap();
        assert!(adapter.is_ready());
    }
}
