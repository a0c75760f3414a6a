//! Shims feeding host output into a [`LogDotLogger`].
//!
//! [`LogCapture`] bridges the `log` facade and [`CaptureWriter`] tees an
//! [`io::Write`] stream. Both drop anything emitted while a capture is
//! already in progress on the same thread, so output produced by the
//! delivery itself never loops back into a logger.

use std::borrow::Cow;
use std::cell::Cell;
use std::io::{self, Write};
use std::sync::Arc;

use log::{LevelFilter, Metadata, Record, SetLoggerError};

use crate::level::LogLevel;
use crate::logger::LogDotLogger;
use crate::tags::{TagValue, Tags};

/// Largest captured message, in UTF-8 bytes, before truncation.
pub const MAX_MESSAGE_BYTES: usize = 16_000;

const TRUNCATION_SUFFIX: &str = "... [truncated]";

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as capturing until dropped.
///
/// The flag is cleared on drop, including during unwinding.
#[derive(Debug)]
pub struct CaptureGuard {
    _private: (),
}

impl CaptureGuard {
    /// Set the flag, or return `None` if this thread is already capturing.
    pub fn enter() -> Option<Self> {
        CAPTURING.with(|flag| {
            if flag.replace(true) {
                None
            } else {
                Some(Self { _private: () })
            }
        })
    }

    pub fn is_active() -> bool {
        CAPTURING.with(Cell::get)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURING.with(|flag| flag.set(false));
    }
}

/// Cut `message` to at most `max_bytes` bytes on a character boundary and
/// append `... [truncated]`. Short messages are returned unchanged.
pub fn truncate_message(message: &str, max_bytes: usize) -> Cow<'_, str> {
    if message.len() <= max_bytes {
        return Cow::Borrowed(message);
    }
    let mut end = max_bytes;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}{TRUNCATION_SUFFIX}", &message[..end]))
}

/// `log::Log` implementation forwarding records to a [`LogDotLogger`].
///
/// Each record carries the tags `logger_name` (the record target),
/// `source = "rust_log"`, and `module_path`, `file` and `line` when the
/// record knows them. Delivery failures are ignored.
#[derive(Debug, Clone)]
pub struct LogCapture {
    logger: Arc<LogDotLogger>,
}

impl LogCapture {
    pub fn new(logger: Arc<LogDotLogger>) -> Self {
        Self { logger }
    }

    /// Install as the process-wide `log` backend.
    ///
    /// # Errors
    ///
    /// Fails if another global logger is already installed.
    pub fn install(self, max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }

    fn record_tags(record: &Record<'_>) -> Tags {
        let mut tags = Tags::new();
        tags.insert("logger_name".into(), record.target().into());
        tags.insert("source".into(), "rust_log".into());
        if let Some(module_path) = record.module_path() {
            tags.insert("module_path".into(), module_path.into());
        }
        if let Some(file) = record.file() {
            tags.insert("file".into(), file.into());
        }
        if let Some(line) = record.line() {
            tags.insert("line".into(), TagValue::from(line));
        }
        tags
    }
}

impl log::Log for LogCapture {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        log::max_level() >= metadata.level().to_level_filter() && !CaptureGuard::is_active()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(_guard) = CaptureGuard::enter() else {
            return;
        };
        let text = record.args().to_string();
        let message = truncate_message(&text, MAX_MESSAGE_BYTES);
        let tags = Self::record_tags(record);
        self.logger
            .log(LogLevel::from(record.level()), &message, Some(&tags));
    }

    fn flush(&self) {}
}

/// Tee writing to `inner` and forwarding each non-blank write to a logger.
///
/// Writes are forwarded trimmed and truncated, tagged `source = "print"`.
pub struct CaptureWriter<W: Write> {
    inner: W,
    logger: Arc<LogDotLogger>,
    level: LogLevel,
    tags: Tags,
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(inner: W, logger: Arc<LogDotLogger>, level: LogLevel) -> Self {
        let mut tags = Tags::new();
        tags.insert("source".into(), "print".into());
        Self {
            inner,
            logger,
            level,
            tags,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn forward(&self, written: &[u8]) {
        let text = String::from_utf8_lossy(written);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let Some(_guard) = CaptureGuard::enter() else {
            return;
        };
        let message = truncate_message(trimmed, MAX_MESSAGE_BYTES);
        self.logger.log(self.level, &message, Some(&self.tags));
    }
}

impl<W: Write> Write for CaptureWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.forward(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + std::fmt::Debug> std::fmt::Debug for CaptureWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureWriter")
            .field("inner", &self.inner)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
