//! In-memory backend for tests.
//!
//! Records every call and can be told to fail any operation, so adapter and
//! serve-loop behavior can be checked without a Redis server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use cachebridge_core::ConnectionOptions;

use super::{BackendError, CacheBackend, Connector};

/// A recorded `set` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCall {
    pub key: String,
    pub value: String,
    pub ttl: chrono::Duration,
}

/// Errors to inject into the next calls.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub connect: Option<BackendError>,
    pub connect_delay: Option<Duration>,
    pub ping: Option<BackendError>,
    pub ping_delay: Option<Duration>,
    pub set: Option<BackendError>,
    pub get: Option<BackendError>,
    pub close: Option<BackendError>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, String>,
    set_calls: Vec<SetCall>,
    get_calls: usize,
    connects: usize,
    closes: usize,
    live: usize,
    last_options: Option<ConnectionOptions>,
    faults: Faults,
}

/// Connector whose handles share one in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<State>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Seeds a stored value.
    pub fn insert(&self, key: &str, value: &str) {
        self.state()
            .entries
            .insert(key.to_string(), value.to_string());
    }

    /// Adjusts the injected faults.
    pub fn faults(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.state().faults);
    }

    pub fn set_calls(&self) -> Vec<SetCall> {
        self.state().set_calls.clone()
    }

    pub fn get_calls(&self) -> usize {
        self.state().get_calls
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    /// Handles connected and not yet closed.
    pub fn live_handles(&self) -> usize {
        self.state().live
    }

    pub fn last_options(&self) -> Option<ConnectionOptions> {
        self.state().last_options.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Backend = MemoryBackend;

    async fn connect(&self, opts: &ConnectionOptions) -> Result<MemoryBackend, BackendError> {
        let delay = self.state().faults.connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.connects += 1;
        state.last_options = Some(opts.clone());
        if let Some(err) = state.faults.connect.clone() {
            return Err(err);
        }
        state.live += 1;
        Ok(MemoryBackend {
            state: Arc::clone(&self.state),
        })
    }
}

/// Handle produced by [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        let (delay, fault) = {
            let state = self.state();
            (state.faults.ping_delay, state.faults.ping.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        fault.map_or(Ok(()), Err)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: chrono::Duration,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        state.set_calls.push(SetCall {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        });
        if let Some(err) = state.faults.set.clone() {
            return Err(err);
        }
        state.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut state = self.state();
        state.get_calls += 1;
        if let Some(err) = state.faults.get.clone() {
            return Err(err);
        }
        Ok(state.entries.get(key).cloned())
    }

    async fn close(self) -> Result<(), BackendError> {
        let mut state = self.state();
        state.closes += 1;
        state.live -= 1;
        state.faults.close.clone().map_or(Ok(()), Err)
    }
}
