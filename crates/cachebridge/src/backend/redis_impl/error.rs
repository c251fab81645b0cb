//! Redis error mapping to BackendError.

use super::super::BackendError;

/// Maps Redis errors to BackendError.
pub fn map_redis_error(err: redis::RedisError) -> BackendError {
    if err.is_connection_refusal() || err.is_timeout() || err.is_connection_dropped() {
        BackendError::Connection(err.to_string())
    } else {
        BackendError::Operation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_refusal_maps_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = map_redis_error(redis::RedisError::from(io));
        assert!(matches!(err, BackendError::Connection(_)), "{err:?}");
    }

    #[test]
    fn test_response_error_maps_to_operation() {
        let err = redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        ));
        let mapped = map_redis_error(err);
        assert!(matches!(mapped, BackendError::Operation(ref m) if m.contains("WRONGTYPE")));
    }
}
