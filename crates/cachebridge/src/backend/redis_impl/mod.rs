//! Redis backend implementation.
//!
//! Wraps `redis::aio::ConnectionManager`, which reconnects on its own and is
//! safe to clone across concurrent callers.

mod backend;
mod error;

pub use backend::{RedisBackend, RedisConnector, KEEP_TTL};
pub use error::map_redis_error;
