//! Wire bodies sent to the LogDot API.
//!
//! Payloads borrow from client state so building one never copies the
//! queued entries.

use serde::Serialize;

use crate::level::LogLevel;
use crate::tags::Tags;

/// One queued log entry.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub tags: Tags,
}

/// One value of a single-metric batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricValue {
    pub value: f64,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

/// One point of a multi-metric batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

fn no_tags(tags: &&Tags) -> bool {
    tags.is_empty()
}

#[derive(Serialize)]
struct LogLine<'a> {
    message: &'a str,
    severity: LogLevel,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a Tags,
}

impl<'a> From<&'a LogEntry> for LogLine<'a> {
    fn from(entry: &'a LogEntry) -> Self {
        Self {
            message: &entry.message,
            severity: entry.level,
            tags: &entry.tags,
        }
    }
}

/// Body of `POST /logs`.
#[derive(Serialize)]
pub(crate) struct SingleLog<'a> {
    #[serde(flatten)]
    line: LogLine<'a>,
    hostname: &'a str,
}

impl<'a> SingleLog<'a> {
    pub(crate) fn new(hostname: &'a str, entry: &'a LogEntry) -> Self {
        Self {
            line: LogLine::from(entry),
            hostname,
        }
    }
}

/// Body of `POST /logs/batch`.
#[derive(Serialize)]
pub(crate) struct LogBatch<'a> {
    hostname: &'a str,
    logs: Vec<LogLine<'a>>,
}

impl<'a> LogBatch<'a> {
    pub(crate) fn new(hostname: &'a str, entries: &'a [LogEntry]) -> Self {
        Self {
            hostname,
            logs: entries.iter().map(LogLine::from).collect(),
        }
    }
}

/// Body of `POST /metrics`.
#[derive(Serialize)]
pub(crate) struct SingleMetric<'a> {
    pub entity_id: &'a str,
    pub name: &'a str,
    pub value: f64,
    pub unit: &'a str,
    #[serde(skip_serializing_if = "no_tags")]
    pub tags: &'a Tags,
}

/// Body of `POST /metrics/batch` for one metric name.
#[derive(Serialize)]
pub(crate) struct SingleMetricBatch<'a> {
    pub entity_id: &'a str,
    pub name: &'a str,
    pub unit: &'a str,
    pub values: &'a [MetricValue],
}

/// Body of `POST /metrics/batch` mixing metric names.
#[derive(Serialize)]
pub(crate) struct MultiMetricBatch<'a> {
    pub entity_id: &'a str,
    pub metrics: &'a [MetricPoint],
}

/// Body of `POST /entities`.
#[derive(Serialize)]
pub(crate) struct NewEntity<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<&'a Tags>,
}
