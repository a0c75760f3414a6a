//! HTTP transport seam.
//!
//! The clients never talk to the network directly. They hand an
//! [`HttpRequest`] to a [`Transport`], which performs exactly one exchange
//! and reports either the response (whatever its status) or a
//! [`TransportError`] when no response was obtained. Retrying is the
//! [`Dispatcher`](crate::dispatch::Dispatcher)'s job.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use ureq::{Agent, AgentBuilder};

use crate::error::TransportError;

/// HTTP methods used by the clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A single HTTP exchange to perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON body; `None` for GET.
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and raw body of a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Capability to perform one HTTP exchange.
///
/// Implementations must return `Ok` for every response that arrived,
/// including 4xx and 5xx, and `Err` only when the exchange itself failed
/// (connection, DNS, TLS, timeout).
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a pooled `ureq` agent using native TLS.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let builder = AgentBuilder::new();
        let builder = match native_tls::TlsConnector::new() {
            Ok(connector) => builder.tls_connector(Arc::new(connector)),
            Err(err) => {
                warn!(target: "logdot", "native TLS unavailable ({err}); using default TLS");
                builder
            }
        };
        Self::with_agent(builder.build())
    }

    /// Wrap an existing agent, e.g. one configured with a proxy.
    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut req = self
            .agent
            .request(request.method.as_str(), &request.url)
            .timeout(request.timeout);
        for (key, value) in &request.headers {
            req = req.set(key, value);
        }
        let result = match &request.body {
            Some(body) => req.send_string(body),
            None => req.call(),
        };
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => return Err(TransportError(err.to_string())),
        };
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|err| TransportError(format!("failed to read response body: {err}")))?;
        Ok(HttpResponse { status, body })
    }
}
