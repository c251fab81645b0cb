//! Wire messages exchanged with the host over the plugin transport.
//!
//! The plugin writes one [`Handshake`] line, then reads one JSON request per
//! line and answers each with one JSON [`Response`] line.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::contract::CAPABILITY;
use crate::error::CacheError;

pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const APP_PROTOCOL_VERSION: u32 = 1;
pub const TRANSPORT: &str = "jsonl";

pub const METHOD_INIT_CONNECTION: &str = "cache.InitConnection";
pub const METHOD_SET: &str = "cache.Set";
pub const METHOD_GET: &str = "cache.Get";
pub const METHOD_CLOSE: &str = "cache.Close";

/// First line written by the plugin process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub core_protocol_version: u32,
    pub app_protocol_version: u32,
    pub transport: String,
    pub plugins: Vec<String>,
}

impl Handshake {
    /// Handshake announcing the cache capability.
    pub fn cache() -> Self {
        Self {
            core_protocol_version: CORE_PROTOCOL_VERSION,
            app_protocol_version: APP_PROTOCOL_VERSION,
            transport: TRANSPORT.to_string(),
            plugins: vec![CAPABILITY.to_string()],
        }
    }
}

/// A request line before its params are interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRequest {
    #[serde(default)]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// A decoded call on the cache contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InitConnection { uri: String },
    Set { key: String, value: String, ttl: Duration },
    Get { key: String },
    Close,
}

#[derive(Deserialize)]
struct InitConnectionParams {
    uri: String,
}

#[derive(Deserialize)]
struct SetParams {
    key: String,
    value: String,
    ttl_ms: i64,
}

#[derive(Deserialize)]
struct GetParams {
    key: String,
}

/// Reasons a request line cannot be turned into a [`Call`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
}

impl ProtocolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::BadRequest(_) => "bad_request",
            ProtocolError::UnknownMethod(_) => "unknown_method",
        }
    }
}

impl Call {
    /// Interprets the params of a raw request according to its method.
    pub fn from_raw(raw: RawRequest) -> Result<Self, ProtocolError> {
        let params = raw.params.unwrap_or(Value::Null);
        match raw.method.as_str() {
            METHOD_INIT_CONNECTION => {
                let p: InitConnectionParams = decode_params(params)?;
                Ok(Call::InitConnection { uri: p.uri })
            }
            METHOD_SET => {
                let p: SetParams = decode_params(params)?;
                let ttl = Duration::try_milliseconds(p.ttl_ms)
                    .ok_or_else(|| ProtocolError::BadRequest("ttl_ms out of range".to_string()))?;
                Ok(Call::Set {
                    key: p.key,
                    value: p.value,
                    ttl,
                })
            }
            METHOD_GET => {
                let p: GetParams = decode_params(params)?;
                Ok(Call::Get { key: p.key })
            }
            METHOD_CLOSE => Ok(Call::Close),
            other => Err(ProtocolError::UnknownMethod(other.to_string())),
        }
    }
}

fn decode_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(params).map_err(|e| ProtocolError::BadRequest(e.to_string()))
}

/// Error payload of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

impl From<&CacheError> for WireError {
    fn from(err: &CacheError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<&ProtocolError> for WireError {
    fn from(err: &ProtocolError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// One response line. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    /// Successful response; `Value::Null` for calls that return nothing.
    pub fn ok(id: Option<u64>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<u64>, error: WireError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}
