//! Client configuration and its builder.
//!
//! [`ClientConfigBuilder`] validates user input before producing a
//! [`ClientConfig`], which stays immutable for the lifetime of the clients
//! built from it.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Default base URL of the log ingestion API.
pub const DEFAULT_LOGS_URL: &str = "https://logs.logdot.io/api/v1";
/// Default base URL of the metrics and entity API.
pub const DEFAULT_METRICS_URL: &str = "https://metrics.logdot.io/api/v1";
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);
/// Default upper bound on any retry delay.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponential backoff policy for failed deliveries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub attempts: u32,
    /// Delay before the first retry. Doubles for each further retry.
    pub base_delay: Duration,
    /// Cap applied to every delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `retry` (1-based).
    ///
    /// Computes `min(base_delay * 2^(retry - 1), max_delay)` without
    /// overflowing.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Total number of attempts, including the first.
    pub fn total_attempts(&self) -> u32 {
        self.attempts.saturating_add(1)
    }
}

/// Validated configuration shared by every client.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub(crate) api_key: String,
    pub(crate) hostname: Option<String>,
    pub(crate) timeout: Duration,
    pub(crate) retry: RetryPolicy,
    pub(crate) debug: bool,
    pub(crate) logs_url: String,
    pub(crate) metrics_url: String,
}

impl ClientConfig {
    /// Start building a configuration for `api_key`.
    pub fn builder(api_key: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(api_key)
    }

    /// Build a configuration from `LOGDOT_*` environment variables.
    ///
    /// `LOGDOT_API_KEY` is required. `LOGDOT_HOSTNAME`, `LOGDOT_TIMEOUT`,
    /// `LOGDOT_RETRY_ATTEMPTS`, `LOGDOT_RETRY_DELAY`,
    /// `LOGDOT_RETRY_MAX_DELAY` (all in milliseconds where relevant),
    /// `LOGDOT_DEBUG`, `LOGDOT_LOGS_URL` and `LOGDOT_METRICS_URL` are
    /// optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = lookup("LOGDOT_API_KEY").ok_or(ConfigError::MissingApiKey)?;
        let mut builder = ClientConfigBuilder::new(api_key);
        if let Some(hostname) = lookup("LOGDOT_HOSTNAME") {
            builder = builder.with_hostname(hostname);
        }
        if let Some(raw) = lookup("LOGDOT_TIMEOUT") {
            builder = builder.with_timeout_ms(parse_number("LOGDOT_TIMEOUT", &raw)?);
        }
        if let Some(raw) = lookup("LOGDOT_RETRY_ATTEMPTS") {
            let attempts = parse_number("LOGDOT_RETRY_ATTEMPTS", &raw)?;
            let attempts = u32::try_from(attempts).map_err(|_| ConfigError::InvalidValue {
                field: "LOGDOT_RETRY_ATTEMPTS",
                reason: format!("{attempts} is too large"),
            })?;
            builder = builder.with_retry_attempts(attempts);
        }
        if let Some(raw) = lookup("LOGDOT_RETRY_DELAY") {
            builder = builder.with_retry_delay_ms(parse_number("LOGDOT_RETRY_DELAY", &raw)?);
        }
        if let Some(raw) = lookup("LOGDOT_RETRY_MAX_DELAY") {
            builder =
                builder.with_retry_max_delay_ms(parse_number("LOGDOT_RETRY_MAX_DELAY", &raw)?);
        }
        if let Some(raw) = lookup("LOGDOT_DEBUG") {
            builder = builder.with_debug(parse_flag("LOGDOT_DEBUG", &raw)?);
        }
        if let Some(url) = lookup("LOGDOT_LOGS_URL") {
            builder = builder.with_logs_url(url);
        }
        if let Some(url) = lookup("LOGDOT_METRICS_URL") {
            builder = builder.with_metrics_url(url);
        }
        builder.build()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn logs_url(&self) -> &str {
        &self.logs_url
    }

    pub fn metrics_url(&self) -> &str {
        &self.metrics_url
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("hostname", &self.hostname)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("debug", &self.debug)
            .field("logs_url", &self.logs_url)
            .field("metrics_url", &self.metrics_url)
            .finish()
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|err: std::num::ParseIntError| ConfigError::InvalidValue {
            field,
            reason: format!("{raw:?} is not a number: {err}"),
        })
}

fn parse_flag(field: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field,
            reason: format!("{other:?} is not a boolean"),
        }),
    }
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigError::InvalidValue {
                field: $field,
                reason: "must be greater than zero".into(),
            })
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for [`ClientConfig`].
///
/// Holds the API key in the clear, so it does not implement `Debug`.
#[derive(Clone, Default)]
pub struct ClientConfigBuilder {
    api_key: String,
    hostname: Option<String>,
    timeout_ms: Option<u64>,
    retry_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    debug: bool,
    logs_url: Option<String>,
    metrics_url: Option<String>,
}

impl ClientConfigBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Hostname reported with every log entry. Required by the logger.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    option_setter!(
        #[doc = "Set the per-request timeout in milliseconds."]
        with_timeout_ms,
        timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the number of retries after the first attempt."]
        with_retry_attempts,
        retry_attempts,
        u32
    );
    option_setter!(
        #[doc = "Set the delay before the first retry in milliseconds."]
        with_retry_delay_ms,
        retry_delay_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the maximum retry delay in milliseconds."]
        with_retry_max_delay_ms,
        retry_max_delay_ms,
        u64
    );

    /// Log outgoing payloads and raw responses at debug level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Override the log API base URL.
    pub fn with_logs_url(mut self, url: impl Into<String>) -> Self {
        self.logs_url = Some(url.into());
        self
    }

    /// Override the metrics API base URL.
    pub fn with_metrics_url(mut self, url: impl Into<String>) -> Self {
        self.metrics_url = Some(url.into());
        self
    }

    /// Validate the collected values and produce a [`ClientConfig`].
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        let timeout_ms = match self.timeout_ms {
            Some(ms) => ensure_positive!(ms, "timeout_ms")?,
            None => DEFAULT_TIMEOUT.as_millis() as u64,
        };
        let base_delay = match self.retry_delay_ms {
            Some(ms) => Duration::from_millis(ensure_positive!(ms, "retry_delay_ms")?),
            None => DEFAULT_RETRY_DELAY,
        };
        let max_delay = self
            .retry_max_delay_ms
            .map_or(DEFAULT_RETRY_MAX_DELAY, Duration::from_millis);
        if max_delay < base_delay {
            return Err(ConfigError::InvalidValue {
                field: "retry_max_delay_ms",
                reason: format!(
                    "{}ms is below retry_delay_ms ({}ms)",
                    max_delay.as_millis(),
                    base_delay.as_millis()
                ),
            });
        }
        let hostname = self.hostname.filter(|h| !h.trim().is_empty());
        Ok(ClientConfig {
            api_key: self.api_key,
            hostname,
            timeout: Duration::from_millis(timeout_ms),
            retry: RetryPolicy {
                attempts: self.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
                base_delay,
                max_delay,
            },
            debug: self.debug,
            logs_url: trim_base(self.logs_url.as_deref().unwrap_or(DEFAULT_LOGS_URL)),
            metrics_url: trim_base(self.metrics_url.as_deref().unwrap_or(DEFAULT_METRICS_URL)),
        })
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    #[rstest]
    fn defaults_match_documented_values() {
        let config = ClientConfig::builder("key").build().expect("build");
        assert_eq!(config.timeout(), Duration::from_millis(5_000));
        assert_eq!(config.retry(), &RetryPolicy::default());
        assert_eq!(config.retry().attempts, 3);
        assert!(!config.debug());
        assert_eq!(config.hostname(), None);
        assert_eq!(config.logs_url(), DEFAULT_LOGS_URL);
        assert_eq!(config.metrics_url(), DEFAULT_METRICS_URL);
    }

    #[rstest]
    #[case(0, 1_000, 4_000, 1_000)]
    #[case(1, 1_000, 30_000, 1_000)]
    #[case(2, 1_000, 30_000, 2_000)]
    #[case(3, 1_000, 30_000, 4_000)]
    #[case(6, 1_000, 30_000, 30_000)]
    #[case(200, 1_000, 30_000, 30_000)]
    fn delay_doubles_up_to_cap(
        #[case] retry: u32,
        #[case] base_ms: u64,
        #[case] max_ms: u64,
        #[case] expected_ms: u64,
    ) {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        };
        assert_eq!(policy.delay_for(retry), Duration::from_millis(expected_ms));
    }

    #[rstest]
    fn rejects_empty_api_key() {
        let err = ClientConfig::builder("  ").build().expect_err("must fail");
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[rstest]
    #[case(ClientConfigBuilder::new("k").with_timeout_ms(0), "timeout_ms")]
    #[case(ClientConfigBuilder::new("k").with_retry_delay_ms(0), "retry_delay_ms")]
    #[case(
        ClientConfigBuilder::new("k").with_retry_delay_ms(500).with_retry_max_delay_ms(100),
        "retry_max_delay_ms"
    )]
    fn rejects_invalid_timings(#[case] builder: ClientConfigBuilder, #[case] field: &str) {
        let err = builder.build().expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidValue { field: f, .. } if f == field));
    }

    #[rstest]
    fn debug_output_redacts_api_key() {
        let config = ClientConfig::builder("ilog_live_secret").build().expect("build");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ilog_live_secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[rstest]
    fn base_urls_lose_trailing_slash() {
        let config = ClientConfig::builder("k")
            .with_logs_url("http://127.0.0.1:9/api/")
            .build()
            .expect("build");
        assert_eq!(config.logs_url(), "http://127.0.0.1:9/api");
    }

    #[rstest]
    fn reads_values_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LOGDOT_API_KEY", "key"),
            ("LOGDOT_HOSTNAME", "web-1"),
            ("LOGDOT_TIMEOUT", "250"),
            ("LOGDOT_RETRY_ATTEMPTS", "0"),
            ("LOGDOT_RETRY_DELAY", "10"),
            ("LOGDOT_RETRY_MAX_DELAY", "20"),
            ("LOGDOT_DEBUG", "true"),
        ]);
        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_owned()))
            .expect("config");
        assert_eq!(config.hostname(), Some("web-1"));
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.retry().attempts, 0);
        assert_eq!(config.retry().max_delay, Duration::from_millis(20));
        assert!(config.debug());
    }

    #[rstest]
    fn lookup_requires_api_key() {
        let err = ClientConfig::from_lookup(|_| None).expect_err("must fail");
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[rstest]
    #[case("LOGDOT_TIMEOUT", "soon")]
    #[case("LOGDOT_DEBUG", "maybe")]
    fn lookup_rejects_malformed_values(#[case] key: &'static str, #[case] value: &'static str) {
        let err = ClientConfig::from_lookup(|k| match k {
            "LOGDOT_API_KEY" => Some("key".into()),
            k if k == key => Some(value.into()),
            _ => None,
        })
        .expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == key));
    }
}
