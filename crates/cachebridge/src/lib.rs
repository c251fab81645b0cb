//! Redis cache plugin - the imperative shell around `cachebridge_core`.
//!
//! This crate provides:
//! - [`CacheAdapter`], the [`CachePlugin`](cachebridge_core::CachePlugin)
//!   implementation that owns the backend handle
//! - The Redis backend behind the [`backend::Connector`] seam
//! - The serve loop that exposes the adapter to a plugin host

pub mod adapter;
pub mod backend;
pub mod config;
pub mod serve;

pub use adapter::{CacheAdapter, RedisCachePlugin};
pub use config::{LogFormat, PluginConfig};
pub use serve::{check_cookie, serve, ServeError};
