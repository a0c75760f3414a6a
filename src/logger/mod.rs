//! Context-aware logger with optional batching.
//!
//! [`LogDotLogger`] sends each entry as its own request until
//! [`begin_batch`](LogDotLogger::begin_batch) is called. From then on
//! entries are queued and flushed together by
//! [`send_batch`](LogDotLogger::send_batch).

use std::fmt;

use log::warn;
use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::dispatch::{Delivery, Dispatcher};
use crate::error::{BatchKind, ConfigError, LastError, UsageError};
use crate::level::LogLevel;
use crate::payload::{LogBatch, LogEntry, SingleLog};
use crate::tags::{Tags, ensure_finite, merge_tags};


#[derive(Default)]
struct LoggerState {
    /// `Some` while batching.
    batch: Option<Vec<LogEntry>>,
    last_error: LastError,
}

/// Logger shipping entries to the LogDot log API.
///
/// Every instance owns its context, batch queue and last error. Instances
/// derived with [`with_context`](Self::with_context) share the dispatcher
/// but nothing else.
pub struct LogDotLogger {
    dispatcher: Dispatcher,
    hostname: String,
    context: Tags,
    state: Mutex<LoggerState>,
}

impl LogDotLogger {
    /// Build a logger that talks to the API over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingHostname`] when `config` has no
    /// hostname.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_dispatcher(Dispatcher::new(config))
    }

    /// Build a logger from `LOGDOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Build a logger on top of an existing dispatcher.
    pub fn with_dispatcher(dispatcher: Dispatcher) -> Result<Self, ConfigError> {
        let hostname = dispatcher
            .config()
            .hostname()
            .ok_or(ConfigError::MissingHostname)?
            .to_owned();
        Ok(Self {
            dispatcher,
            hostname,
            context: Tags::new(),
            state: Mutex::default(),
        })
    }

    /// Derive a logger whose context is this context overlaid with `extra`.
    ///
    /// The new logger starts outside batch mode with no recorded error;
    /// `self` is left untouched.
    pub fn with_context(&self, extra: &Tags) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            hostname: self.hostname.clone(),
            context: merge_tags(&self.context, extra),
            state: Mutex::default(),
        }
    }

    pub fn get_context(&self) -> &Tags {
        &self.context
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Log `message` at `level` with `tags` merged over the context.
    ///
    /// In batch mode the entry is queued and `true` is returned without any
    /// network traffic. Otherwise the entry is delivered immediately and the
    /// return value reports whether delivery succeeded. An entry carrying a
    /// NaN or infinite float tag is dropped and `false` is returned.
    pub fn log(&self, level: LogLevel, message: &str, tags: Option<&Tags>) -> bool {
        let entry = LogEntry {
            level,
            message: message.to_owned(),
            tags: match tags {
                Some(tags) => merge_tags(&self.context, tags),
                None => self.context.clone(),
            },
        };
        if let Err(err) = ensure_finite(&entry.tags) {
            return self.finish(Err(err));
        }

        if let Some(queue) = self.state.lock().batch.as_mut() {
            queue.push(entry);
            return true;
        }

        let url = format!("{}/logs", self.dispatcher.config().logs_url());
        let delivery = self
            .dispatcher
            .post_json(&url, &SingleLog::new(&self.hostname, &entry));
        self.finish(delivery)
    }

    pub fn debug(&self, message: &str, tags: Option<&Tags>) -> bool {
        self.log(LogLevel::Debug, message, tags)
    }

    pub fn info(&self, message: &str, tags: Option<&Tags>) -> bool {
        self.log(LogLevel::Info, message, tags)
    }

    pub fn warn(&self, message: &str, tags: Option<&Tags>) -> bool {
        self.log(LogLevel::Warn, message, tags)
    }

    pub fn error(&self, message: &str, tags: Option<&Tags>) -> bool {
        self.log(LogLevel::Error, message, tags)
    }

    /// Enter batch mode with an empty queue.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::AlreadyBatching`] if a batch is already
    /// active; the active queue is kept as is.
    pub fn begin_batch(&self) -> Result<(), UsageError> {
        let mut state = self.state.lock();
        if state.batch.is_some() {
            return Err(UsageError::AlreadyBatching(BatchKind::Logs));
        }
        state.batch = Some(Vec::new());
        Ok(())
    }

    /// Deliver every queued entry in one request.
    ///
    /// An empty queue (or no active batch) returns `true` without network
    /// traffic. On success the delivered entries leave the queue; on failure
    /// the queue is left unchanged so the call can be repeated.
    pub fn send_batch(&self) -> bool {
        let pending = match &self.state.lock().batch {
            Some(queue) if !queue.is_empty() => queue.clone(),
            _ => return true,
        };

        let url = format!("{}/logs/batch", self.dispatcher.config().logs_url());
        let delivery = self
            .dispatcher
            .post_json(&url, &LogBatch::new(&self.hostname, &pending));
        let ok = self.finish(delivery);
        if ok {
            let mut state = self.state.lock();
            if let Some(queue) = state.batch.as_mut()
                && queue.starts_with(&pending)
            {
                queue.drain(..pending.len());
            }
        }
        ok
    }

    /// Leave batch mode, discarding anything still queued.
    pub fn end_batch(&self) {
        self.state.lock().batch = None;
    }

    /// Drop queued entries while staying in batch mode.
    pub fn clear_batch(&self) {
        if let Some(queue) = self.state.lock().batch.as_mut() {
            queue.clear();
        }
    }

    /// Number of queued entries; `0` outside batch mode.
    pub fn get_batch_size(&self) -> usize {
        self.state.lock().batch.as_ref().map_or(0, Vec::len)
    }

    pub fn is_batching(&self) -> bool {
        self.state.lock().batch.is_some()
    }

    /// Message of the last failed send, cleared by a successful one.
    pub fn get_last_error(&self) -> Option<String> {
        self.state.lock().last_error.message.clone()
    }

    /// HTTP status of the last send attempt.
    pub fn get_last_http_code(&self) -> Option<u16> {
        self.state.lock().last_error.http_code
    }

    pub fn last_error(&self) -> LastError {
        self.state.lock().last_error.clone()
    }

    fn finish(&self, delivery: Result<Delivery, UsageError>) -> bool {
        match delivery {
            Ok(delivery) => {
                self.state.lock().last_error.record(&delivery);
                delivery.ok
            }
            Err(err) => {
                self.state.lock().last_error = LastError {
                    message: Some(err.to_string()),
                    http_code: None,
                };
                warn!(target: "logdot", "log entry dropped: {err}");
                false
            }
        }
    }
}

impl fmt::Debug for LogDotLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogDotLogger")
            .field("hostname", &self.hostname)
            .field("context", &self.context)
            .field("batch_size", &self.get_batch_size())
            .finish_non_exhaustive()
    }
}
