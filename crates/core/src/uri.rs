//! Connection URI grammar.
//!
//! `scheme://[user[:password]@]host[:port][/db-index][?param=value&...]`
//!
//! `redis` selects a plain TCP connection and `rediss` a TLS one. Query
//! parameter names follow the Redis client URL conventions (`dial_timeout`,
//! `pool_size`, ...); anything else is rejected.

use std::collections::BTreeMap;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::{Host, Url};

use crate::duration::parse_duration;
use crate::error::{CacheError, ConfigError, Result};
use crate::options::{
    ConnectionOptions, Protocol, DEFAULT_DIAL_TIMEOUT, DEFAULT_HOST, DEFAULT_MAX_RETRIES,
    DEFAULT_MAX_RETRY_BACKOFF, DEFAULT_MIN_RETRY_BACKOFF, DEFAULT_PORT, DEFAULT_READ_TIMEOUT,
    LIVENESS_MARGIN,
};

const PLAIN_SCHEME: &str = "redis://";
const TLS_SCHEME: &str = "rediss://";

const DEFAULT_CONN_MAX_IDLE_TIME: Duration = Duration::from_secs(30 * 60);

/// Returns true when `uri` starts with a scheme this backend accepts.
pub fn has_supported_scheme(uri: &str) -> bool {
    uri.starts_with(PLAIN_SCHEME) || uri.starts_with(TLS_SCHEME)
}

/// Parses a connection URI into [`ConnectionOptions`].
///
/// # Errors
///
/// - [`CacheError::InvalidUri`] when the scheme is not `redis://` or `rediss://`.
/// - [`CacheError::ConfigParse`] for malformed URIs, bad values and unknown
///   query parameters.
pub fn parse_uri(uri: &str) -> Result<ConnectionOptions> {
    if !has_supported_scheme(uri) {
        return Err(CacheError::InvalidUri);
    }
    Ok(parse_options(uri)?)
}

fn parse_options(uri: &str) -> std::result::Result<ConnectionOptions, ConfigError> {
    let url = Url::parse(uri).map_err(|e| ConfigError::MalformedUri(e.to_string()))?;
    let tls = url.scheme() == "rediss";

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => DEFAULT_HOST.to_string(),
    };
    let port = url.port().unwrap_or(DEFAULT_PORT);

    let username = decode_userinfo(url.username())?;
    let password = url.password().map(decode_userinfo).transpose()?.flatten();

    let mut opts = ConnectionOptions::new(host, port);
    opts.tls = tls;
    opts.username = username;
    opts.password = password;
    opts.db = parse_db_path(url.path())?;

    let mut query = Query::from_url(&url);

    if let Some(db) = query.take_int("db")? {
        opts.db = non_negative("db", db)?;
    }

    if let Some(version) = query.take_int("protocol")? {
        if version != 0 {
            opts.protocol = Some(Protocol::from_version(version).ok_or_else(|| {
                ConfigError::InvalidValue {
                    param: "protocol".to_string(),
                    value: version.to_string(),
                    reason: "expected 2 or 3".to_string(),
                }
            })?);
        }
    }

    opts.client_name = query.take_str("client_name")?;

    if let Some(retries) = query.take_int("max_retries")? {
        opts.max_retries = match retries {
            0 => Some(DEFAULT_MAX_RETRIES),
            n if n < 0 => None,
            n => Some(u32::try_from(n).map_err(|_| ConfigError::InvalidValue {
                param: "max_retries".to_string(),
                value: n.to_string(),
                reason: "out of range".to_string(),
            })?),
        };
    }

    if let Some(d) = query.take_duration("min_retry_backoff")? {
        opts.min_retry_backoff = resolve(d, DEFAULT_MIN_RETRY_BACKOFF);
    }
    if let Some(d) = query.take_duration("max_retry_backoff")? {
        opts.max_retry_backoff = resolve(d, DEFAULT_MAX_RETRY_BACKOFF);
    }

    if let Some(d) = query.take_duration("dial_timeout")? {
        opts.dial_timeout = resolve(d, DEFAULT_DIAL_TIMEOUT);
    }
    if let Some(d) = query.take_duration("read_timeout")? {
        opts.read_timeout = resolve(d, DEFAULT_READ_TIMEOUT);
    }
    opts.write_timeout = match query.take_duration("write_timeout")? {
        Some(d) if !d.is_zero() => resolve(d, DEFAULT_READ_TIMEOUT),
        _ => opts.read_timeout,
    };

    if let Some(fifo) = query.take_bool("pool_fifo")? {
        opts.pool_fifo = fifo;
    }
    if let Some(size) = query.take_int("pool_size")? {
        let size = non_negative_usize("pool_size", size)?;
        if size > 0 {
            opts.pool_size = size;
        }
    }
    opts.pool_timeout = match query.take_duration("pool_timeout")? {
        Some(d) if !d.is_zero() => resolve(d, DEFAULT_READ_TIMEOUT),
        _ => Some(opts.read_timeout.unwrap_or_default() + LIVENESS_MARGIN),
    };

    if let Some(n) = query.take_int("min_idle_conns")? {
        opts.min_idle_conns = non_negative_usize("min_idle_conns", n)?;
    }
    if let Some(n) = query.take_int("max_idle_conns")? {
        opts.max_idle_conns = non_negative_usize("max_idle_conns", n)?;
    }
    if let Some(n) = query.take_int("max_active_conns")? {
        opts.max_active_conns = non_negative_usize("max_active_conns", n)?;
    }

    let idle_time = match query.take_duration("conn_max_idle_time")? {
        Some(d) => Some(d),
        None => query.take_duration("idle_timeout")?,
    };
    if let Some(d) = idle_time {
        opts.conn_max_idle_time = resolve(d, DEFAULT_CONN_MAX_IDLE_TIME);
    }

    let lifetime = match query.take_duration("conn_max_lifetime")? {
        Some(d) => Some(d),
        None => query.take_duration("max_conn_age")?,
    };
    if let Some(d) = lifetime {
        opts.conn_max_lifetime = positive(d);
    }

    if let Some(skip) = query.take_bool("skip_verify")? {
        if !tls {
            return Err(ConfigError::SkipVerifyWithoutTls);
        }
        opts.tls_insecure_skip_verify = skip;
    }

    query.finish()?;
    Ok(opts)
}

fn decode_userinfo(raw: &str) -> std::result::Result<Option<String>, ConfigError> {
    if raw.is_empty() {
        return Ok(None);
    }
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| Some(s.into_owned()))
        .map_err(|e| ConfigError::MalformedUri(format!("userinfo is not valid UTF-8: {e}")))
}

fn parse_db_path(path: &str) -> std::result::Result<i64, ConfigError> {
    let segment = path.strip_prefix('/').unwrap_or(path);
    if segment.is_empty() {
        return Ok(0);
    }
    match segment.parse::<i64>() {
        Ok(db) if db >= 0 => Ok(db),
        _ => Err(ConfigError::InvalidDatabase(segment.to_string())),
    }
}

/// Maps a signed duration onto a setting: zero picks the default, negative disables.
fn resolve(d: chrono::Duration, default: Duration) -> Option<Duration> {
    if d.is_zero() {
        Some(default)
    } else {
        d.to_std().ok()
    }
}

fn positive(d: chrono::Duration) -> Option<Duration> {
    d.to_std().ok().filter(|d| !d.is_zero())
}

fn non_negative(param: &str, value: i64) -> std::result::Result<i64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::InvalidValue {
            param: param.to_string(),
            value: value.to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    Ok(value)
}

fn non_negative_usize(param: &str, value: i64) -> std::result::Result<usize, ConfigError> {
    let value = non_negative(param, value)?;
    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
        param: param.to_string(),
        value: value.to_string(),
        reason: "out of range".to_string(),
    })
}

/// Query parameters still waiting to be consumed.
struct Query {
    params: BTreeMap<String, Vec<String>>,
}

impl Query {
    fn from_url(url: &Url) -> Self {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url.query_pairs() {
            params
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        Self { params }
    }

    /// Removes `name` and returns its value; empty values count as absent.
    fn take_str(&mut self, name: &str) -> std::result::Result<Option<String>, ConfigError> {
        let Some(mut values) = self.params.remove(name) else {
            return Ok(None);
        };
        values.dedup();
        if values.len() > 1 {
            return Err(ConfigError::DuplicateOption(name.to_string()));
        }
        Ok(values.pop().filter(|v| !v.is_empty()))
    }

    fn take_int(&mut self, name: &str) -> std::result::Result<Option<i64>, ConfigError> {
        self.take_str(name)?
            .map(|value| {
                value.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                    param: name.to_string(),
                    value,
                    reason: "expected an integer".to_string(),
                })
            })
            .transpose()
    }

    fn take_duration(
        &mut self,
        name: &str,
    ) -> std::result::Result<Option<chrono::Duration>, ConfigError> {
        self.take_str(name)?
            .map(|value| {
                parse_duration(&value).map_err(|reason| ConfigError::InvalidValue {
                    param: name.to_string(),
                    value,
                    reason,
                })
            })
            .transpose()
    }

    fn take_bool(&mut self, name: &str) -> std::result::Result<Option<bool>, ConfigError> {
        self.take_str(name)?
            .map(|value| match value.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    param: name.to_string(),
                    value,
                    reason: "expected true/false/1/0 or an empty string".to_string(),
                }),
            })
            .transpose()
    }

    /// Fails with the names of every parameter nobody consumed.
    fn finish(self) -> std::result::Result<(), ConfigError> {
        if self.params.is_empty() {
            return Ok(());
        }
        Err(ConfigError::UnexpectedOptions(
            self.params.into_keys().collect(),
        ))
    }
}
