//! Trigger events and a webhook listener that dispatches them to callbacks.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// An event delivered by the platform when a trigger fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(alias = "triggerName")]
    pub trigger_name: String,
    #[serde(default, alias = "appName")]
    pub app_name: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: Value,
}

impl TriggerEvent {
    /// Parse a webhook body. Accepts a bare event or one wrapped in `{"data": ...}`.
    pub fn from_webhook(body: Value) -> Result<Self, serde_json::Error> {
        let is_wrapped = body
            .get("data")
            .is_some_and(|d| d.get("trigger_name").is_some() || d.get("triggerName").is_some());
        if is_wrapped {
            serde_json::from_value(body["data"].clone())
        } else {
            serde_json::from_value(body)
        }
    }

    /// String field of the payload, empty when missing.
    pub fn payload_str(&self, key: &str) -> &str {
        self.payload.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

/// Which events a callback wants. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TriggerFilter {
    pub trigger_name: Option<String>,
    pub app_name: Option<String>,
}

impl TriggerFilter {
    pub fn trigger_name(name: impl Into<String>) -> Self {
        Self {
            trigger_name: Some(name.into()),
            app_name: None,
        }
    }

    pub fn with_app_name(mut self, app: impl Into<String>) -> Self {
        self.app_name = Some(app.into());
        self
    }

    pub fn matches(&self, event: &TriggerEvent) -> bool {
        let name_ok = self
            .trigger_name
            .as_deref()
            .map_or(true, |n| n.eq_ignore_ascii_case(&event.trigger_name));
        let app_ok = self
            .app_name
            .as_deref()
            .map_or(true, |a| a.eq_ignore_ascii_case(&event.app_name));
        name_ok && app_ok
    }
}

type Handler = Arc<dyn Fn(TriggerEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Registry of trigger callbacks plus the HTTP endpoint that feeds it.
#[derive(Clone, Default)]
pub struct TriggerListener {
    callbacks: Vec<(TriggerFilter, Handler)>,
}

impl TriggerListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events matching `filter`.
    pub fn callback<F, Fut>(&mut self, filter: TriggerFilter, handler: F)
    where
        F: Fn(TriggerEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |event| -> BoxFuture<'static, ()> { Box::pin(handler(event)) });
        self.callbacks.push((filter, handler));
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Spawn every matching callback on its own task.
    pub fn dispatch(&self, event: TriggerEvent) -> Vec<JoinHandle<()>> {
        let handles: Vec<JoinHandle<()>> = self
            .callbacks
            .iter()
            .filter(|(filter, _)| filter.matches(&event))
            .map(|(_, handler)| tokio::spawn(handler(event.clone())))
            .collect();

        tracing::debug!(
            trigger = %event.trigger_name,
            app = %event.app_name,
            matched = handles.len(),
            "Dispatched trigger event"
        );
        handles
    }

    /// Routes: `POST /trigger` for events, `GET /health`.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/trigger", post(receive_trigger))
            .with_state(self)
    }

    /// Serve the webhook until the process is stopped.
    pub async fn listen(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, callbacks = self.callbacks.len(), "Trigger listener started");
        axum::serve(listener, Arc::new(self).router().into_make_service()).await
    }
}

async fn receive_trigger(
    State(listener): State<Arc<TriggerListener>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match TriggerEvent::from_webhook(body) {
        Ok(event) => {
            let dispatched = listener.dispatch(event).len();
            (StatusCode::OK, Json(json!({ "dispatched": dispatched })))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejected malformed trigger event");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}
