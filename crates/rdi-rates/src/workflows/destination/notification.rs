use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    fn color(&self) -> &'static str {
        match self {
            Self::Error => "#e01e5a",
            Self::Success => "#2eb67d",
            Self::Warning => "#439fe0",
        }
    }
}

/// Operator-facing event describing one request outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub context: BTreeMap<String, Value>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, title, message)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Provenance of the inbound request. Only the notification router reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub origin: Option<String>,
    pub referer: Option<String>,
    pub page_context: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap, page_context_header: &str) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Self {
            origin: read(header::ORIGIN.as_str()),
            referer: read(header::REFERER.as_str()),
            page_context: read(page_context_header),
        }
    }

    /// Fills `page_context` from the body when no header carried it.
    pub fn with_payload_fallback(mut self, payload: &Value) -> Self {
        if self.page_context.is_none() {
            self.page_context = payload
                .get("page_context")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string);
        }
        self
    }
}

/// Decides whether a request's provenance qualifies for non-error notifications.
#[derive(Debug, Clone, Default)]
pub struct RoutePredicate {
    referer_marker: Option<String>,
    page_context_value: Option<String>,
    page_context_header: String,
}

impl RoutePredicate {
    pub fn new(
        referer_marker: Option<String>,
        page_context_value: Option<String>,
        page_context_header: impl Into<String>,
    ) -> Self {
        Self {
            referer_marker,
            page_context_value,
            page_context_header: page_context_header.into(),
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(
            config.referer_marker.clone(),
            config.page_context_value.clone(),
            config.page_context_header.clone(),
        )
    }

    pub fn page_context_header(&self) -> &str {
        &self.page_context_header
    }

    pub fn matches(&self, context: &RequestContext) -> bool {
        let referer_hit = match (&self.referer_marker, &context.referer) {
            (Some(marker), Some(referer)) => referer.contains(marker.as_str()),
            _ => false,
        };
        let page_hit = match (&self.page_context_value, &context.page_context) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        referer_hit || page_hit
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkDispatchError {
    #[error("notification client could not be built: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification sink rejected event with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound event sink (chat webhook or similar). Called at most once per event.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), SinkDispatchError>;
}

/// Routes events to the sink on a detached task so callers never wait on delivery.
pub struct NotificationRouter<S> {
    predicate: RoutePredicate,
    sink: Arc<S>,
}

impl<S> NotificationRouter<S>
where
    S: NotificationSink + 'static,
{
    pub fn new(predicate: RoutePredicate, sink: Arc<S>) -> Self {
        Self { predicate, sink }
    }

    pub fn predicate(&self) -> &RoutePredicate {
        &self.predicate
    }

    /// Errors always go out; everything else only for matching provenance.
    pub fn route(&self, event: &NotificationEvent, context: &RequestContext) -> bool {
        match event.kind {
            NotificationKind::Error => true,
            NotificationKind::Success | NotificationKind::Warning => {
                self.predicate.matches(context)
            }
        }
    }

    /// Spawns delivery when routed. The handle is only for callers that want to observe
    /// completion; dropping it leaves the task running.
    pub fn dispatch(
        &self,
        event: NotificationEvent,
        context: &RequestContext,
    ) -> Option<JoinHandle<()>> {
        if !self.route(&event, context) {
            debug!(title = %event.title, kind = ?event.kind, "notification filtered by route predicate");
            return None;
        }

        let sink = Arc::clone(&self.sink);
        Some(tokio::spawn(async move {
            if let Err(err) = sink.deliver(&event).await {
                warn!(error = %err, title = %event.title, "notification dispatch failed");
            }
        }))
    }
}

/// Posts attachment-style JSON to an incoming-webhook URL. No URL means no-op.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl WebhookSink {
    pub fn new(http: reqwest::Client, endpoint: Option<String>) -> Self {
        Self { http, endpoint }
    }

    /// Every delivery is bounded by the configured timeout so a stalled endpoint
    /// cannot pin dispatch tasks.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, SinkDispatchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(SinkDispatchError::ClientBuild)?;
        Ok(Self::new(http, config.webhook_url.clone()))
    }

    pub fn payload(event: &NotificationEvent) -> Value {
        let fields: Vec<Value> = event
            .context
            .iter()
            .map(|(key, value)| {
                json!({
                    "title": key,
                    "value": field_value(value),
                    "short": false,
                })
            })
            .collect();

        json!({
            "attachments": [{
                "color": event.kind.color(),
                "title": event.title,
                "text": event.message,
                "fields": fields,
                "footer": format!("RDI Checker • {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            }]
        })
    }
}

fn field_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), SinkDispatchError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(());
        };

        let response = self
            .http
            .post(endpoint)
            .json(&Self::payload(event))
            .send()
            .await?;

        let status = response.status();
        debug!(%status, "notification sink responded");
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkDispatchError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
