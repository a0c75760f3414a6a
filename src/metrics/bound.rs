//! Metrics client bound to a single entity.

use std::fmt;

use log::warn;
use parking_lot::Mutex;

use crate::dispatch::{Delivery, Dispatcher};
use crate::error::{BatchKind, LastError, UsageError};
use crate::payload::{MetricPoint, MetricValue, MultiMetricBatch, SingleMetric, SingleMetricBatch};
use crate::tags::{Tags, ensure_finite};

#[derive(Debug, Default)]
enum MetricBatch {
    #[default]
    Idle,
    Single {
        name: String,
        unit: String,
        values: Vec<MetricValue>,
    },
    Multi(Vec<MetricPoint>),
}

impl MetricBatch {
    fn kind(&self) -> BatchKind {
        match self {
            Self::Idle => BatchKind::Idle,
            Self::Single { .. } => BatchKind::SingleMetric,
            Self::Multi(_) => BatchKind::MultiMetric,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Single { values, .. } => values.len(),
            Self::Multi(points) => points.len(),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Idle => {}
            Self::Single { values, .. } => values.clear(),
            Self::Multi(points) => points.clear(),
        }
    }

    /// Fail unless the active mode is `expected`.
    fn require(&self, expected: BatchKind) -> Result<(), UsageError> {
        match self.kind() {
            BatchKind::Idle => Err(UsageError::NotBatching),
            active if active == expected => Ok(()),
            active => Err(UsageError::WrongBatchMode { expected, active }),
        }
    }
}

/// Snapshot of a non-empty queue taken for one flush.
enum Pending {
    Single {
        name: String,
        unit: String,
        values: Vec<MetricValue>,
    },
    Multi(Vec<MetricPoint>),
}

#[derive(Default)]
struct BoundState {
    batch: MetricBatch,
    last_error: LastError,
}

fn check_name(name: &str) -> Result<(), UsageError> {
    if name.trim().is_empty() {
        return Err(UsageError::InvalidArgument(
            "metric name must not be empty".into(),
        ));
    }
    Ok(())
}

fn check_tags(tags: Option<&Tags>) -> Result<(), UsageError> {
    tags.map_or(Ok(()), ensure_finite)
}

fn check_value(value: f64) -> Result<(), UsageError> {
    if !value.is_finite() {
        return Err(UsageError::InvalidArgument(format!(
            "metric value must be finite, got {value}"
        )));
    }
    Ok(())
}

/// Metrics client fixed to one entity id.
///
/// Supports immediate sends plus two batch modes: a single-metric batch
/// collecting values of one name and unit, and a multi-metric batch mixing
/// names. Only one mode is active at a time.
pub struct BoundMetricsClient {
    entity_id: String,
    dispatcher: Dispatcher,
    state: Mutex<BoundState>,
}

impl BoundMetricsClient {
    pub(crate) fn new(entity_id: String, dispatcher: Dispatcher) -> Self {
        Self {
            entity_id,
            dispatcher,
            state: Mutex::default(),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Send one data point immediately.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::InvalidArgument`] for an empty name, a
    /// non-finite value or a non-finite float tag, before any request is
    /// made. Delivery failures are
    /// reported as `Ok(false)`.
    pub fn send(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        tags: Option<&Tags>,
    ) -> Result<bool, UsageError> {
        check_name(name)?;
        check_value(value)?;
        check_tags(tags)?;
        let empty = Tags::new();
        let body = SingleMetric {
            entity_id: &self.entity_id,
            name,
            value,
            unit,
            tags: tags.unwrap_or(&empty),
        };
        let url = format!("{}/metrics", self.dispatcher.config().metrics_url());
        let delivery = self.dispatcher.post_json(&url, &body)?;
        Ok(self.finish(&delivery))
    }

    /// Start collecting values of metric `name` measured in `unit`.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::AlreadyBatching`] if any batch is active.
    pub fn begin_batch(&self, name: &str, unit: &str) -> Result<(), UsageError> {
        check_name(name)?;
        self.begin(MetricBatch::Single {
            name: name.to_owned(),
            unit: unit.to_owned(),
            values: Vec::new(),
        })
    }

    /// Start collecting points of arbitrary metrics.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::AlreadyBatching`] if any batch is active.
    pub fn begin_multi_batch(&self) -> Result<(), UsageError> {
        self.begin(MetricBatch::Multi(Vec::new()))
    }

    fn begin(&self, batch: MetricBatch) -> Result<(), UsageError> {
        let mut state = self.state.lock();
        match state.batch.kind() {
            BatchKind::Idle => {
                state.batch = batch;
                Ok(())
            }
            active => Err(UsageError::AlreadyBatching(active)),
        }
    }

    /// Queue a value in the active single-metric batch.
    ///
    /// # Errors
    ///
    /// [`UsageError::NotBatching`] when idle, [`UsageError::WrongBatchMode`]
    /// during a multi-metric batch. The queue is left untouched on error.
    pub fn add(&self, value: f64, tags: Option<&Tags>) -> Result<(), UsageError> {
        check_value(value)?;
        check_tags(tags)?;
        let mut state = self.state.lock();
        state.batch.require(BatchKind::SingleMetric)?;
        if let MetricBatch::Single { values, .. } = &mut state.batch {
            values.push(MetricValue {
                value,
                tags: tags.cloned().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Queue a point in the active multi-metric batch.
    ///
    /// # Errors
    ///
    /// [`UsageError::NotBatching`] when idle, [`UsageError::WrongBatchMode`]
    /// during a single-metric batch. The queue is left untouched on error.
    pub fn add_metric(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        tags: Option<&Tags>,
    ) -> Result<(), UsageError> {
        check_name(name)?;
        check_value(value)?;
        check_tags(tags)?;
        let mut state = self.state.lock();
        state.batch.require(BatchKind::MultiMetric)?;
        if let MetricBatch::Multi(points) = &mut state.batch {
            points.push(MetricPoint {
                name: name.to_owned(),
                value,
                unit: unit.to_owned(),
                tags: tags.cloned().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Deliver the active batch in one request.
    ///
    /// Returns `true` without a request when idle or when the queue is
    /// empty. Delivered items leave the queue; after a failure the queue is
    /// unchanged.
    pub fn send_batch(&self) -> bool {
        let pending = match &self.state.lock().batch {
            MetricBatch::Single { name, unit, values } if !values.is_empty() => Pending::Single {
                name: name.clone(),
                unit: unit.clone(),
                values: values.clone(),
            },
            MetricBatch::Multi(points) if !points.is_empty() => Pending::Multi(points.clone()),
            _ => return true,
        };

        let url = format!("{}/metrics/batch", self.dispatcher.config().metrics_url());
        let delivery = match &pending {
            Pending::Single { name, unit, values } => self.dispatcher.post_json(
                &url,
                &SingleMetricBatch {
                    entity_id: &self.entity_id,
                    name,
                    unit,
                    values,
                },
            ),
            Pending::Multi(points) => self.dispatcher.post_json(
                &url,
                &MultiMetricBatch {
                    entity_id: &self.entity_id,
                    metrics: points,
                },
            ),
        };
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                self.state.lock().last_error = LastError {
                    message: Some(err.to_string()),
                    http_code: None,
                };
                warn!(target: "logdot", "metric batch dropped: {err}");
                return false;
            }
        };

        let ok = self.finish(&delivery);
        if ok {
            let mut state = self.state.lock();
            match (&mut state.batch, &pending) {
                (
                    MetricBatch::Single { name, unit, values },
                    Pending::Single {
                        name: sent_name,
                        unit: sent_unit,
                        values: sent,
                    },
                ) if name == sent_name && unit == sent_unit && values.starts_with(sent) => {
                    values.drain(..sent.len());
                }
                (MetricBatch::Multi(points), Pending::Multi(sent)) if points.starts_with(sent) => {
                    points.drain(..sent.len());
                }
                _ => {}
            }
        }
        ok
    }

    /// Leave batch mode, discarding anything still queued.
    pub fn end_batch(&self) {
        self.state.lock().batch = MetricBatch::Idle;
    }

    /// Drop queued items while keeping the current mode.
    pub fn clear_batch(&self) {
        self.state.lock().batch.clear();
    }

    /// Number of queued items; `0` when idle.
    pub fn get_batch_size(&self) -> usize {
        self.state.lock().batch.len()
    }

    pub fn batch_kind(&self) -> BatchKind {
        self.state.lock().batch.kind()
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.state.lock().last_error.message.clone()
    }

    pub fn get_last_http_code(&self) -> Option<u16> {
        self.state.lock().last_error.http_code
    }

    fn finish(&self, delivery: &Delivery) -> bool {
        self.state.lock().last_error.record(delivery);
        delivery.ok
    }
}

impl fmt::Debug for BoundMetricsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundMetricsClient")
            .field("entity_id", &self.entity_id)
            .field("batch", &state.batch.kind())
            .field("batch_size", &state.batch.len())
            .finish_non_exhaustive()
    }
}
