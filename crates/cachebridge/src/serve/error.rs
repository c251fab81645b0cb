use thiserror::Error;

/// Errors that stop the serve loop.
///
/// Per-request failures are never surfaced here; they become error responses.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "this binary is a cache plugin and is not meant to be executed directly; \
         it must be launched by a plugin host that sets {cookie_key}"
    )]
    Handshake { cookie_key: String },
}

pub type Result<T> = std::result::Result<T, ServeError>;
