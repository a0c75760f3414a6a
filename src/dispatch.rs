//! Retrying delivery of JSON payloads.
//!
//! The [`Dispatcher`] owns the shared configuration, a [`Transport`] and a
//! [`Sleeper`]. Every request is attempted `retry.attempts + 1` times at
//! most; before retry `k` it sleeps `min(base_delay * 2^(k-1), max_delay)`.
//! Only 2xx responses count as success.
//!
//! # Retry semantics
//!
//! - **2xx**: success, returned immediately.
//! - **terminal status** (declared per call): returned immediately as a
//!   failure without consuming the remaining budget.
//! - **other status / transport error**: retried after the backoff delay.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;

use crate::capture::CaptureGuard;
use crate::config::ClientConfig;
use crate::error::UsageError;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};

/// Longest response excerpt copied into error messages.
const ERROR_BODY_LIMIT: usize = 512;

/// Blocks the current thread between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Outcome of a delivery after retries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// `true` when the final attempt returned 2xx.
    pub ok: bool,
    /// Status of the final response, if any arrived.
    pub http_code: Option<u16>,
    /// Failure description; `None` on success.
    pub error: Option<String>,
    /// Raw body of the final response, if any arrived.
    pub body: Option<String>,
    /// Number of attempts made.
    pub attempts: u32,
}

impl Delivery {
    fn from_response(response: HttpResponse, attempts: u32) -> Self {
        let ok = response.is_success();
        let error = (!ok).then(|| {
            let excerpt = excerpt(&response.body);
            if excerpt.is_empty() {
                format!("HTTP {}", response.status)
            } else {
                format!("HTTP {}: {excerpt}", response.status)
            }
        });
        Self {
            ok,
            http_code: Some(response.status),
            error,
            body: Some(response.body),
            attempts,
        }
    }

    fn from_transport_error(message: String, attempts: u32) -> Self {
        Self {
            ok: false,
            http_code: None,
            error: Some(message),
            body: None,
            attempts,
        }
    }
}

fn excerpt(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Retrying HTTP dispatcher shared by all clients built from one config.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl Dispatcher {
    /// Dispatcher using [`UreqTransport`] and real sleeps.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }

    /// Dispatcher using a custom transport.
    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replace the sleeper used between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Serialise `payload` and POST it to `url`, retrying on failure.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Serialization`] before any attempt when the
    /// payload cannot be encoded. Delivery failures are reported through
    /// [`Delivery::ok`], never as `Err`.
    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<Delivery, UsageError> {
        self.post_json_until(url, payload, &[])
    }

    /// Like [`post_json`](Self::post_json), but stops retrying as soon as a
    /// status listed in `terminal` is received.
    pub fn post_json_until<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
        terminal: &[u16],
    ) -> Result<Delivery, UsageError> {
        let body = serde_json::to_string(payload)?;
        let request = self.request(HttpMethod::Post, url, Some(body));
        Ok(self.deliver_until(&request, terminal))
    }

    /// GET `url`, stopping early on any status listed in `terminal`.
    pub fn get_until(&self, url: &str, terminal: &[u16]) -> Delivery {
        let request = self.request(HttpMethod::Get, url, None);
        self.deliver_until(&request, terminal)
    }

    /// Build a request carrying the authentication and content headers.
    pub fn request(&self, method: HttpMethod, url: &str, body: Option<String>) -> HttpRequest {
        HttpRequest {
            method,
            url: url.to_owned(),
            headers: vec![
                (
                    "Authorization".to_owned(),
                    format!("Bearer {}", self.config.api_key()),
                ),
                ("Content-Type".to_owned(), "application/json".to_owned()),
                ("Accept".to_owned(), "application/json".to_owned()),
            ],
            body,
            timeout: self.config.timeout(),
        }
    }

    /// Deliver `request`, retrying every non-2xx status and transport error.
    pub fn deliver(&self, request: &HttpRequest) -> Delivery {
        self.deliver_until(request, &[])
    }

    /// Deliver `request`, retrying until success, a `terminal` status, or
    /// exhaustion of the retry budget.
    pub fn deliver_until(&self, request: &HttpRequest, terminal: &[u16]) -> Delivery {
        // Output emitted while delivering (ours or the HTTP stack's) must not
        // be captured back into a logger on this thread.
        let _guard = CaptureGuard::enter();
        let policy = self.config.retry();
        let total = policy.total_attempts();
        let mut outcome = Delivery::default();

        for attempt in 1..=total {
            if attempt > 1 {
                self.sleeper.sleep(policy.delay_for(attempt - 1));
            }
            self.trace_request(request, attempt, total);
            outcome = match self.transport.execute(request) {
                Ok(response) => {
                    self.trace_response(&response);
                    let status = response.status;
                    let delivery = Delivery::from_response(response, attempt);
                    if delivery.ok || terminal.contains(&status) {
                        return delivery;
                    }
                    delivery
                }
                Err(err) => {
                    if self.config.debug() {
                        debug!(target: "logdot", "{} {} failed: {err}", request.method.as_str(), request.url);
                    }
                    Delivery::from_transport_error(err.to_string(), attempt)
                }
            };
        }

        warn!(
            target: "logdot",
            "{} {} failed after {} attempt(s): {}",
            request.method.as_str(),
            request.url,
            outcome.attempts,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        outcome
    }

    fn trace_request(&self, request: &HttpRequest, attempt: u32, total: u32) {
        if !self.config.debug() {
            return;
        }
        debug!(
            target: "logdot",
            "{} {} (attempt {attempt}/{total}) payload: {}",
            request.method.as_str(),
            request.url,
            request.body.as_deref().unwrap_or("<empty>")
        );
    }

    fn trace_response(&self, response: &HttpResponse) {
        if self.config.debug() {
            debug!(target: "logdot", "response {}: {}", response.status, response.body);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
