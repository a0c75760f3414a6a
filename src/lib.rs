//! Client for the LogDot logging and metrics service.
//!
//! [`LogDotLogger`] ships log entries with persistent context tags and
//! optional batching. [`LogDotMetrics`] resolves entities and produces
//! [`BoundMetricsClient`]s that send single points or batches. All requests
//! go through a retrying [`Dispatcher`] with exponential backoff.
//!
//! ```no_run
//! use logdot::{ClientConfig, LogDotLogger, TagValue, tags};
//!
//! let config = ClientConfig::builder("ilog_live_xxx")
//!     .with_hostname("web-1")
//!     .build()?;
//! let logger = LogDotLogger::new(config)?;
//! let user = logger.with_context(&tags([("user_id", TagValue::from(42))]));
//! user.info("signed in", None);
//! # Ok::<(), logdot::ConfigError>(())
//! ```

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod level;
pub mod logger;
pub mod metrics;
pub mod payload;
pub mod tags;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use capture::{CaptureGuard, CaptureWriter, LogCapture, MAX_MESSAGE_BYTES, truncate_message};
pub use config::{ClientConfig, ClientConfigBuilder, RetryPolicy};
pub use dispatch::{Delivery, Dispatcher, Sleeper, ThreadSleeper};
pub use error::{BatchKind, ConfigError, EntityError, LastError, TransportError, UsageError};
pub use level::{LogLevel, ParseLevelError};
pub use logger::LogDotLogger;
pub use metrics::{BoundMetricsClient, Entity, LogDotMetrics};
pub use payload::{LogEntry, MetricPoint, MetricValue};
pub use tags::{TagValue, Tags, merge_tags, tags};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
