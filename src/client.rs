use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{ExecuteRequest, ImageRequest, Mode, RawTaskResponse, VoiceRequest};

// ── Errors ────────────────────────────────────────────────────────────────────

/// A backend request that did not produce a usable response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(timeout)
        } else {
            TransportError::Network(e)
        }
    }
}

// ── Backend seam ──────────────────────────────────────────────────────────────

/// The two calls the orchestration layer depends on. `Client` is the real
/// implementation; tests substitute a scripted one.
pub trait Backend: Send + Sync + 'static {
    /// Reachability probe. Never fails: every error maps to `false`.
    fn check_health(&self) -> impl Future<Output = bool> + Send;

    fn execute_task(
        &self,
        input: &str,
        auto_execute: bool,
        mode: Mode,
    ) -> impl Future<Output = Result<RawTaskResponse, TransportError>> + Send;
}

// ── Client ────────────────────────────────────────────────────────────────────

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

pub struct Client {
    http: reqwest::Client,
    pub base_url: String,
    request_timeout: Duration,
    health_timeout: Duration,
}

impl Client {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration, health_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(health_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "http client build failed, falling back to defaults");
                reqwest::Client::new()
            });
        Self {
            http,
            base_url: base_url.into(),
            request_timeout,
            health_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Send, check status, decode. Non-2xx bodies are kept for the log.
    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let resp = req
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "backend returned error status");
            return Err(TransportError::Status { status: status.as_u16(), body });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        debug!(path, "GET");
        self.send(self.http.get(self.url(path)), self.request_timeout).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, TransportError> {
        debug!(path, "POST");
        let mut req = self
            .http
            .post(self.url(path))
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }
        self.send(req, self.request_timeout).await
    }

    // ── Auxiliary queries (opaque JSON) ───────────────────────────────────────

    pub async fn get_history(&self) -> Result<Value, TransportError> {
        self.get_json("/api/history").await
    }

    pub async fn get_system_info(&self) -> Result<Value, TransportError> {
        self.get_json("/api/system-info").await
    }

    pub async fn get_active_processes(&self) -> Result<Value, TransportError> {
        self.get_json("/api/processes").await
    }

    pub async fn get_suggestions(&self) -> Result<Value, TransportError> {
        self.get_json("/api/suggestions").await
    }

    pub async fn update_preferences(&self, preferences: &Value) -> Result<Value, TransportError> {
        self.post_json("/api/preferences", Some(preferences)).await
    }

    pub async fn rollback_last_action(&self) -> Result<Value, TransportError> {
        self.post_json::<Value>("/api/rollback", None).await
    }

    /// `audio_data` is passed through untouched.
    pub async fn submit_voice(&self, audio_data: String) -> Result<Value, TransportError> {
        self.post_json("/api/voice", Some(&VoiceRequest { audio_data })).await
    }

    /// `image_data` is passed through untouched.
    pub async fn submit_image(&self, image_data: String) -> Result<Value, TransportError> {
        self.post_json("/api/image", Some(&ImageRequest { image_data })).await
    }
}

impl Backend for Client {
    async fn check_health(&self) -> bool {
        let resp = self
            .http
            .get(self.url("/api/system-info"))
            .timeout(self.health_timeout)
            .send()
            .await;
        match resp {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                debug!(error = %e, "health check failed");
                false
            }
        }
    }

    async fn execute_task(
        &self,
        input: &str,
        auto_execute: bool,
        mode: Mode,
    ) -> Result<RawTaskResponse, TransportError> {
        let body = ExecuteRequest {
            input: input.to_string(),
            auto_execute,
            mode,
        };
        debug!(auto_execute, %mode, "POST /api/execute");
        let req = self
            .http
            .post(self.url("/api/execute"))
            .header("Content-Type", "application/json")
            .json(&body);
        let value: Value = self.send(req, self.request_timeout).await?;
        Ok(RawTaskResponse::from_value(value))
    }
}


/// In-memory backend for exercising the monitor and the state machine.
#[cfg(test)]
pub mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::{Backend, TransportError};
    use crate::protocol::{ExecuteRequest, Mode, RawTaskResponse};

    #[derive(Default)]
    pub struct ScriptedBackend {
        healthy: AtomicBool,
        health_checks: AtomicUsize,
        responses: Mutex<VecDeque<Result<RawTaskResponse, TransportError>>>,
        calls: Mutex<Vec<ExecuteRequest>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self { healthy: AtomicBool::new(true), ..Default::default() }
        }

        pub fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        pub fn health_checks(&self) -> usize {
            self.health_checks.load(Ordering::SeqCst)
        }

        /// Queue a JSON response for the next `execute_task` call.
        pub fn push_json(&self, value: serde_json::Value) {
            let raw = RawTaskResponse::from_value(value);
            self.responses.lock().unwrap().push_back(Ok(raw));
        }

        pub fn push_err(&self, err: TransportError) {
            self.responses.lock().unwrap().push_back(Err(err));
        }

        pub fn calls(&self) -> Vec<ExecuteRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Backend for ScriptedBackend {
        async fn check_health(&self) -> bool {
            self.health_checks.fetch_add(1, Ordering::SeqCst);
            self.healthy.load(Ordering::SeqCst)
        }

        async fn execute_task(
            &self,
            input: &str,
            auto_execute: bool,
            mode: Mode,
        ) -> Result<RawTaskResponse, TransportError> {
            self.calls.lock().unwrap().push(ExecuteRequest {
                input: input.to_string(),
                auto_execute,
                mode,
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Decode("no scripted response".into())))
        }
    }
}
