//! Connection options derived from a connection URI (pure data).

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default host when the URI leaves it empty.
pub const DEFAULT_HOST: &str = "localhost";

/// Default dial timeout.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read timeout. The write timeout defaults to the read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of retries before giving up on a command.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default lower bound of the retry backoff.
pub const DEFAULT_MIN_RETRY_BACKOFF: Duration = Duration::from_millis(8);

/// Default upper bound of the retry backoff.
pub const DEFAULT_MAX_RETRY_BACKOFF: Duration = Duration::from_millis(512);

/// Connections per available CPU when `pool_size` is not given.
pub const POOL_SIZE_PER_CPU: usize = 10;

/// Margin added on top of dial + read timeouts for the liveness check.
pub const LIVENESS_MARGIN: Duration = Duration::from_secs(1);

/// Characters escaped in the userinfo of a rendered client URL.
const USERINFO: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// RESP protocol version negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Resp2,
    Resp3,
}

impl Protocol {
    /// Returns the protocol for a numeric version, if supported.
    pub fn from_version(version: i64) -> Option<Self> {
        match version {
            2 => Some(Protocol::Resp2),
            3 => Some(Protocol::Resp3),
            _ => None,
        }
    }
}

/// Client options parsed from a connection URI.
///
/// Timeouts and backoffs hold `None` when explicitly disabled with `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    /// `true` for the `rediss://` scheme.
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: i64,
    /// `None` leaves the choice to the client library.
    pub protocol: Option<Protocol>,
    pub client_name: Option<String>,
    /// `None` disables retries.
    pub max_retries: Option<u32>,
    pub min_retry_backoff: Option<Duration>,
    pub max_retry_backoff: Option<Duration>,
    pub dial_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub pool_fifo: bool,
    pub pool_size: usize,
    pub pool_timeout: Option<Duration>,
    pub min_idle_conns: usize,
    pub max_idle_conns: usize,
    /// Zero means unlimited.
    pub max_active_conns: usize,
    pub conn_max_idle_time: Option<Duration>,
    pub conn_max_lifetime: Option<Duration>,
    pub tls_insecure_skip_verify: bool,
}

impl ConnectionOptions {
    /// Options for a plain connection to `host:port` with every other value at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1);

        Self {
            host: host.into(),
            port,
            tls: false,
            username: None,
            password: None,
            db: 0,
            protocol: None,
            client_name: None,
            max_retries: Some(DEFAULT_MAX_RETRIES),
            min_retry_backoff: Some(DEFAULT_MIN_RETRY_BACKOFF),
            max_retry_backoff: Some(DEFAULT_MAX_RETRY_BACKOFF),
            dial_timeout: Some(DEFAULT_DIAL_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            write_timeout: Some(DEFAULT_READ_TIMEOUT),
            pool_fifo: false,
            pool_size: POOL_SIZE_PER_CPU * parallelism,
            pool_timeout: Some(DEFAULT_READ_TIMEOUT + LIVENESS_MARGIN),
            min_idle_conns: 0,
            max_idle_conns: 0,
            max_active_conns: 0,
            conn_max_idle_time: Some(Duration::from_secs(30 * 60)),
            conn_max_lifetime: None,
            tls_insecure_skip_verify: false,
        }
    }

    /// Upper bound for the liveness check run after connecting.
    ///
    /// Dial timeout plus read timeout plus [`LIVENESS_MARGIN`]; disabled
    /// timeouts count as zero.
    pub fn liveness_timeout(&self) -> Duration {
        self.dial_timeout.unwrap_or_default()
            + self.read_timeout.unwrap_or_default()
            + LIVENESS_MARGIN
    }

    /// The longer of the read and write timeouts, or `None` if both are disabled.
    pub fn response_timeout(&self) -> Option<Duration> {
        match (self.read_timeout, self.write_timeout) {
            (Some(read), Some(write)) => Some(read.max(write)),
            (Some(one), None) | (None, Some(one)) => Some(one),
            (None, None) => None,
        }
    }

    /// Renders the subset of options the Redis client reads from its own URL format.
    ///
    /// Credentials are percent-encoded. TLS verification skipping is expressed
    /// with the `#insecure` fragment.
    pub fn client_url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };

        let userinfo = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!(
                "{}:{}@",
                utf8_percent_encode(user, USERINFO),
                utf8_percent_encode(pass, USERINFO)
            ),
            (Some(user), None) => format!("{}@", utf8_percent_encode(user, USERINFO)),
            (None, Some(pass)) => format!(":{}@", utf8_percent_encode(pass, USERINFO)),
            (None, None) => String::new(),
        };

        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        let mut url = format!("{scheme}://{userinfo}{host}:{}/{}", self.port, self.db);
        if self.protocol == Some(Protocol::Resp3) {
            url.push_str("?protocol=resp3");
        }
        if self.tls && self.tls_insecure_skip_verify {
            url.push_str("#insecure");
        }
        url
    }

    /// Address for logs, without credentials.
    pub fn display_addr(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.db)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}
