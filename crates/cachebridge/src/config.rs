use std::env;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "CACHEBRIDGE_LOG";
/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "CACHEBRIDGE_LOG_FORMAT";

const DEFAULT_LOG_FILTER: &str = "cachebridge=info,cachebridge_core=info";
const DEFAULT_COOKIE_KEY: &str = "CACHEBRIDGE_PLUGIN_COOKIE";
const DEFAULT_COOKIE_VALUE: &str = "b1d3c0f6a5e24c9e8a7f0e2d4c6b8a91";

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Plugin process configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Log filter directives (default: "cachebridge=info,cachebridge_core=info")
    pub log_filter: String,
    /// Log format (default: pretty)
    pub log_format: LogFormat,
    /// Name of the variable the host sets before starting the plugin
    pub cookie_key: String,
    /// Value the host is expected to put in `cookie_key`
    pub cookie_value: String,
}

impl PluginConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHEBRIDGE_LOG` - Log filter directives (default: "cachebridge=info,cachebridge_core=info")
    /// - `CACHEBRIDGE_LOG_FORMAT` - `json` for JSON logs (default: pretty)
    /// - `CACHEBRIDGE_COOKIE_KEY` - Handshake cookie variable name (default: "CACHEBRIDGE_PLUGIN_COOKIE")
    /// - `CACHEBRIDGE_COOKIE_VALUE` - Expected handshake cookie value
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            log_filter: lookup(LOG_ENV)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_format: lookup(LOG_FORMAT_ENV)
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(LogFormat::Pretty),
            cookie_key: lookup("CACHEBRIDGE_COOKIE_KEY")
                .unwrap_or_else(|| DEFAULT_COOKIE_KEY.to_string()),
            cookie_value: lookup("CACHEBRIDGE_COOKIE_VALUE")
                .unwrap_or_else(|| DEFAULT_COOKIE_VALUE.to_string()),
        }
    }

    /// Returns true when the host launched this process with the expected cookie.
    pub fn cookie_matches(&self, actual: Option<&str>) -> bool {
        actual == Some(self.cookie_value.as_str())
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
