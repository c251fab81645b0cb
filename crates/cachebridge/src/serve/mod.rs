//! Plugin serve loop.
//!
//! Writes the handshake line, then answers newline-delimited JSON requests
//! one at a time until the input closes or shutdown is signalled. The plugin
//! is always closed before returning.

mod error;

use std::future::Future;

use cachebridge_core::protocol::{
    Call, Handshake, ProtocolError, RawRequest, Response, WireError,
};
use cachebridge_core::{CacheError, CachePlugin};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::PluginConfig;

pub use error::{Result, ServeError};

/// Rejects processes not launched by a plugin host.
pub fn check_cookie(config: &PluginConfig, actual: Option<&str>) -> Result<()> {
    if config.cookie_matches(actual) {
        Ok(())
    } else {
        Err(ServeError::Handshake {
            cookie_key: config.cookie_key.clone(),
        })
    }
}

/// Runs the request loop over `reader`/`writer`.
///
/// Returns when `reader` reaches EOF or `shutdown` completes. Transport
/// failures end the loop with an error; the plugin is closed either way.
pub async fn serve<P, R, W, S>(plugin: &mut P, reader: R, writer: W, shutdown: S) -> Result<()>
where
    P: CachePlugin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let result = run(plugin, reader, writer, shutdown).await;

    if let Err(e) = plugin.close().await {
        tracing::warn!(error = %e, "Failed to close cache plugin on shutdown");
    }

    if let Err(e) = &result {
        tracing::error!(error = %e, "Serve loop stopped");
    }
    result
}

async fn run<P, R, W, S>(plugin: &mut P, reader: R, mut writer: W, shutdown: S) -> Result<()>
where
    P: CachePlugin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    write_line(&mut writer, &Handshake::cache()).await?;
    tracing::debug!("Handshake sent");

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    tokio::pin!(shutdown);

    loop {
        buf.clear();
        let read = tokio::select! {
            () = &mut shutdown => {
                tracing::info!("Shutdown requested, stopping serve loop");
                return Ok(());
            }
            read = reader.read_until(b'\n', &mut buf) => read?,
        };

        if read == 0 {
            tracing::info!("Host closed the connection");
            return Ok(());
        }

        let response = match decode_line(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(plugin, line).await,
            Err(e) => {
                tracing::warn!(error = %e, "Request line is not valid UTF-8");
                Response::err(None, WireError::from(&e))
            }
        };
        write_line(&mut writer, &response).await?;
    }
}

/// Strips the line terminator and checks the bytes are UTF-8.
fn decode_line(buf: &[u8]) -> std::result::Result<&str, ProtocolError> {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    std::str::from_utf8(line).map_err(|e| ProtocolError::BadRequest(e.to_string()))
}

/// Decodes one request line and runs it against the plugin.
pub async fn handle_line<P: CachePlugin>(plugin: &mut P, line: &str) -> Response {
    let raw: RawRequest = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed request line");
            let error = ProtocolError::BadRequest(e.to_string());
            return Response::err(recover_id(line), WireError::from(&error));
        }
    };

    let id = raw.id;
    let method = raw.method.clone();
    let call = match Call::from_raw(raw) {
        Ok(call) => call,
        Err(e) => {
            tracing::warn!(id, method = %method, error = %e, "Rejected request");
            return Response::err(id, WireError::from(&e));
        }
    };

    tracing::debug!(id, method = %method, "Handling request");
    match dispatch(plugin, call).await {
        Ok(result) => Response::ok(id, result),
        Err(e) => {
            if e.is_cache_miss() {
                tracing::debug!(id, "Cache miss");
            } else {
                tracing::debug!(id, method = %method, error = %e, "Request failed");
            }
            Response::err(id, WireError::from(&e))
        }
    }
}

async fn dispatch<P: CachePlugin>(
    plugin: &mut P,
    call: Call,
) -> std::result::Result<Value, CacheError> {
    match call {
        Call::InitConnection { uri } => plugin.init_connection(&uri).await.map(|()| Value::Null),
        Call::Set { key, value, ttl } => plugin.set(&key, &value, ttl).await.map(|()| Value::Null),
        Call::Get { key } => plugin.get(&key).await.map(Value::String),
        Call::Close => plugin.close().await.map(|()| Value::Null),
    }
}

/// Best-effort id extraction from a line that failed to decode as a request.
fn recover_id(line: &str) -> Option<u64> {
    serde_json::from_str::<Value>(line)
        .ok()?
        .get("id")?
        .as_u64()
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(message)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
