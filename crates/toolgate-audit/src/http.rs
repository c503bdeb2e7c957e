//! HTTP sink base plus thin URL/header wrappers (§4.5).
//!
//! Retry shape re-expresses `abp-host::retry`'s `RetryConfig`/
//! `compute_delay` idiom; the "lazily create, allow closing and
//! recreating" connection lifecycle matches `original_source/src/edictum/
//! sinks/_base.py`'s `HTTPSinkBase._get_session()`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::event::AuditEvent;
use crate::sink::Sink;

/// Retry behaviour for [`HttpSink`]. Defaults match §4.5: 3 attempts, 1s
/// base delay doubling, 10s total timeout per request.
#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    /// Number of attempts after the first (so `max_retries = 3` means up
    /// to 4 total POSTs).
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub base_delay: Duration,
    /// Total per-request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Callback invoked after retries are exhausted with the event body and
/// the last error's message.
pub type OnFailure = Arc<dyn Fn(&serde_json::Value, &str) + Send + Sync>;

/// POSTs each event as JSON, retrying with exponential backoff. Never
/// propagates an error to the pipeline; on final failure it logs and
/// invokes the optional `on_failure` callback.
pub struct HttpSink {
    url: String,
    headers: Vec<(String, String)>,
    config: HttpSinkConfig,
    client: Mutex<Option<reqwest::Client>>,
    on_failure: Option<OnFailure>,
}

impl HttpSink {
    /// A sink POSTing to `url` with no extra headers and default retry
    /// behaviour.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            config: HttpSinkConfig::default(),
            client: Mutex::new(None),
            on_failure: None,
        }
    }

    /// Attach an additional header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the retry/timeout configuration.
    #[must_use]
    pub fn with_config(mut self, config: HttpSinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the callback invoked after retries are exhausted.
    #[must_use]
    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = Some(on_failure);
        self
    }

    /// A sink shaped for Splunk HEC: bearer auth via `Authorization:
    /// Splunk <token>`.
    pub fn splunk_hec(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::new(url).with_header("Authorization", format!("Splunk {}", token.into()))
    }

    /// A sink shaped for Datadog logs intake: `DD-API-KEY` header.
    pub fn datadog(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new(url).with_header("DD-API-KEY", api_key.into())
    }

    /// A generic webhook sink with an optional bearer token.
    pub fn webhook(url: impl Into<String>, bearer_token: Option<String>) -> Self {
        let mut sink = Self::new(url);
        if let Some(token) = bearer_token {
            sink = sink.with_header("Authorization", format!("Bearer {token}"));
        }
        sink
    }

    /// Release the pooled connection. A subsequent `emit` lazily creates a
    /// fresh client, mirroring the Python base class's `_get_session()`.
    pub async fn close(&self) {
        *self.client.lock().await = None;
    }

    async fn client(&self) -> reqwest::Client {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return client.clone();
        }
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
            .unwrap_or_default();
        *guard = Some(client.clone());
        client
    }

    async fn send_with_retry(&self, body: &serde_json::Value) -> Result<(), String> {
        let client = self.client().await;
        let max_attempts = self.config.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let mut request = client.post(&self.url).json(body);
            for (name, value) in &self.headers {
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(());
                    }
                    last_error = format!("HTTP {}", response.status());
                }
                Err(err) => {
                    last_error = err.to_string();
                }
            }

            let is_last = attempt + 1 >= max_attempts;
            if is_last {
                break;
            }

            tracing::warn!(
                target: "toolgate.audit.http",
                attempt,
                error = %last_error,
                "retryable delivery failure, backing off"
            );
            let delay = self.config.base_delay * 2u32.saturating_pow(attempt);
            let deadline = Instant::now() + delay;
            tokio::time::sleep_until(deadline).await;
        }

        Err(last_error)
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn emit(&self, event: &AuditEvent) {
        let body = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(err) => {
                tracing::error!(target: "toolgate.audit.http", error = %err, "failed to serialize audit event");
                return;
            }
        };

        if let Err(last_error) = self.send_with_retry(&body).await {
            tracing::error!(
                target: "toolgate.audit.http",
                url = %self.url,
                error = %last_error,
                "audit event delivery failed after retries exhausted"
            );
            if let Some(on_failure) = &self.on_failure {
                on_failure(&body, &last_error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_event() -> AuditEvent {
        AuditEvent {
            call_id: uuid::Uuid::new_v4(),
            tool_name: "Bash".into(),
            action: crate::event::Action::CallAllow,
            reason: String::new(),
            timestamp: chrono::Utc::now(),
            policy_version: None,
            principal: None,
            decision_source: None,
            decision_name: None,
            hooks_evaluated: vec![],
            contracts_evaluated: vec![],
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = HttpSink::new(format!("{}/events", server.uri()));
        sink.emit(&sample_event()).await;
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = HttpSink::new(format!("{}/events", server.uri())).with_config(HttpSinkConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
        });
        sink.emit(&sample_event()).await;
    }

    #[tokio::test]
    async fn invokes_on_failure_after_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let sink = HttpSink::new(format!("{}/events", server.uri()))
            .with_config(HttpSinkConfig {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                request_timeout: Duration::from_secs(5),
            })
            .with_on_failure(Arc::new(move |_body, _err| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }));

        sink.emit(&sample_event()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_allows_subsequent_emits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = HttpSink::new(format!("{}/events", server.uri()));
        sink.emit(&sample_event()).await;
        sink.close().await;
        sink.emit(&sample_event()).await;
    }
}
