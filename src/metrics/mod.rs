//! Metrics client and entity resolution.
//!
//! [`LogDotMetrics`] resolves entities by name and hands out
//! [`BoundMetricsClient`]s fixed to one entity id.

use std::fmt;

use parking_lot::Mutex;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::ClientConfig;
use crate::dispatch::{Delivery, Dispatcher};
use crate::error::{ConfigError, EntityError, LastError, UsageError};
use crate::payload::NewEntity;
use crate::tags::{Tags, ensure_finite};

mod bound;

pub use bound::BoundMetricsClient;


/// Characters escaped in a path segment: everything except RFC 3986
/// unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const STATUS_NOT_FOUND: u16 = 404;
const STATUS_CONFLICT: u16 = 409;

/// Server-side grouping that metrics attach to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Entity bodies arrive bare or wrapped in `{"data": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

fn parse_entity<T: DeserializeOwned>(body: Option<&str>) -> Result<T, EntityError> {
    let body = body.unwrap_or_default();
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(Envelope::Wrapped { data } | Envelope::Bare(data)) => Ok(data),
        Err(err) => Err(EntityError::InvalidResponse(err.to_string())),
    }
}

fn require_name(name: &str) -> Result<(), UsageError> {
    if name.trim().is_empty() {
        return Err(UsageError::InvalidArgument(
            "entity name must not be empty".into(),
        ));
    }
    Ok(())
}

/// Unbound metrics client.
pub struct LogDotMetrics {
    dispatcher: Dispatcher,
    last_error: Mutex<LastError>,
}

impl LogDotMetrics {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_dispatcher(Dispatcher::new(config))
    }

    /// Build a client from `LOGDOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(ClientConfig::from_env()?))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            last_error: Mutex::default(),
        }
    }

    /// Create an entity named `name`.
    ///
    /// # Errors
    ///
    /// [`EntityError::Duplicate`] when the name is taken (HTTP 409, not
    /// retried), [`EntityError::Delivery`] once retries are exhausted and
    /// [`EntityError::InvalidResponse`] for an unreadable body.
    pub fn create_entity(
        &self,
        name: &str,
        description: Option<&str>,
        metadata: Option<&Tags>,
    ) -> Result<Entity, EntityError> {
        require_name(name)?;
        if let Some(metadata) = metadata {
            ensure_finite(metadata)?;
        }
        let url = format!("{}/entities", self.dispatcher.config().metrics_url());
        let body = NewEntity {
            name,
            description,
            metadata,
        };
        let delivery = self
            .dispatcher
            .post_json_until(&url, &body, &[STATUS_CONFLICT])?;
        let last = self.record(&delivery);

        match delivery.http_code {
            _ if delivery.ok => parse_entity(delivery.body.as_deref()),
            Some(STATUS_CONFLICT) => Err(EntityError::Duplicate(name.to_owned())),
            _ => Err(EntityError::Delivery(last)),
        }
    }

    /// Look an entity up by name; `Ok(None)` when the service has none.
    pub fn get_entity_by_name(&self, name: &str) -> Result<Option<Entity>, EntityError> {
        require_name(name)?;
        let url = format!(
            "{}/entities/by-name/{}",
            self.dispatcher.config().metrics_url(),
            utf8_percent_encode(name, PATH_SEGMENT)
        );
        let delivery = self.dispatcher.get_until(&url, &[STATUS_NOT_FOUND]);
        let last = self.record(&delivery);

        match delivery.http_code {
            _ if delivery.ok => parse_entity(delivery.body.as_deref()).map(Some),
            Some(STATUS_NOT_FOUND) => Ok(None),
            _ => Err(EntityError::Delivery(last)),
        }
    }

    /// Return the entity named `name`, creating it if needed.
    ///
    /// A creation that loses a race with another creator falls back to a
    /// second lookup.
    pub fn get_or_create_entity(
        &self,
        name: &str,
        description: Option<&str>,
        metadata: Option<&Tags>,
    ) -> Result<Entity, EntityError> {
        if let Some(entity) = self.get_entity_by_name(name)? {
            return Ok(entity);
        }
        match self.create_entity(name, description, metadata) {
            Err(EntityError::Duplicate(_)) => self
                .get_entity_by_name(name)?
                .ok_or_else(|| EntityError::Duplicate(name.to_owned())),
            other => other,
        }
    }

    /// Bind a metrics client to `entity_id`. No request is made.
    pub fn for_entity(&self, entity_id: impl Into<String>) -> BoundMetricsClient {
        BoundMetricsClient::new(entity_id.into(), self.dispatcher.clone())
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.lock().message.clone()
    }

    pub fn get_last_http_code(&self) -> Option<u16> {
        self.last_error.lock().http_code
    }

    fn record(&self, delivery: &Delivery) -> LastError {
        let mut last = self.last_error.lock();
        last.record(delivery);
        last.clone()
    }
}

impl fmt::Debug for LogDotMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogDotMetrics")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
