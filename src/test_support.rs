//! In-memory doubles for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::dispatch::{Dispatcher, Sleeper};
use crate::error::TransportError;
use crate::transport::{HttpRequest, HttpResponse, Transport};

type Scripted = Result<HttpResponse, TransportError>;

#[derive(Default)]
struct Script {
    replies: VecDeque<Scripted>,
    requests: Vec<HttpRequest>,
}

/// Transport replaying scripted replies and recording every request.
///
/// The last scripted reply repeats once the script runs out; an empty
/// script answers `200 {}`.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn with_replies(replies: impl IntoIterator<Item = Scripted>) -> Self {
        let transport = Self::default();
        transport.script.lock().replies.extend(replies);
        transport
    }

    /// Reply with each status in turn, with a body of `{}` for 2xx and
    /// `error` otherwise.
    pub(crate) fn with_statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self::with_replies(statuses.into_iter().map(|status| {
            let body = if (200..300).contains(&status) {
                "{}"
            } else {
                "error"
            };
            Ok(response(status, body))
        }))
    }

    pub(crate) fn failing(err: TransportError) -> Self {
        Self::with_replies([Err(err)])
    }

    pub(crate) fn push(&self, reply: Scripted) {
        self.script.lock().replies.push_back(reply);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().requests.clone()
    }

    /// Bodies of the recorded requests parsed as JSON.
    pub(crate) fn bodies(&self) -> Vec<serde_json::Value> {
        self.requests()
            .iter()
            .filter_map(|r| r.body.as_deref())
            .map(|b| serde_json::from_str(b).expect("request body is JSON"))
            .collect()
    }
}

pub(crate) fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_owned(),
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut script = self.script.lock();
        script.requests.push(request.clone());
        let reply = if script.replies.len() > 1 {
            script.replies.pop_front()
        } else {
            script.replies.front().cloned()
        };
        reply.unwrap_or_else(|| Ok(response(200, "{}")))
    }
}

/// Sleeper that records requested delays instead of sleeping.
#[derive(Clone, Default)]
pub(crate) struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

pub(crate) const LOGS_URL: &str = "http://logs.logdot.test/api/v1";
pub(crate) const METRICS_URL: &str = "http://metrics.logdot.test/api/v1";

pub(crate) fn config_with_retries(attempts: u32) -> ClientConfig {
    ClientConfig::builder("test-key")
        .with_hostname("test-host")
        .with_retry_attempts(attempts)
        .with_logs_url(LOGS_URL)
        .with_metrics_url(METRICS_URL)
        .build()
        .expect("valid test config")
}

/// Dispatcher over `transport` that never sleeps.
pub(crate) fn dispatcher(transport: &ScriptedTransport, attempts: u32) -> Dispatcher {
    Dispatcher::with_transport(config_with_retries(attempts), transport.clone())
        .with_sleeper(RecordingSleeper::default())
}
