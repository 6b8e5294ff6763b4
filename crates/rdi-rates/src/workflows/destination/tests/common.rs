use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};

use crate::config::{IntegrationConfig, IntegrationMode};
use crate::workflows::destination::address::AddressRecord;
use crate::workflows::destination::notification::{
    NotificationEvent, NotificationRouter, NotificationSink, RoutePredicate, SinkDispatchError,
};
use crate::workflows::destination::service::DestinationService;
use crate::workflows::destination::verification::{
    AddressVerifier, ProviderError, VerificationResult,
};

pub(super) const STOREFRONT_ORIGIN: &str = "https://shop.example.com";
pub(super) const CHECKER_REFERER: &str = "https://shop.example.com/pages/rdi-check";

/// Provider double answering every call with one canned payload, or failing.
pub(super) struct ScriptedVerifier {
    payload: Option<Value>,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub(super) fn answering(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            calls: AtomicUsize::new(0),
        }
    }

    /// Behaves like a provider with no credential configured.
    pub(super) fn failing() -> Self {
        Self {
            payload: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressVerifier for ScriptedVerifier {
    async fn verify(&self, _address: &AddressRecord) -> Result<VerificationResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.payload {
            Some(payload) => Ok(VerificationResult::from_payload(payload.clone())),
            None => Err(ProviderError::MissingCredential),
        }
    }
}

#[derive(Default)]
pub(super) struct MemorySink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl MemorySink {
    pub(super) fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    /// Waits for detached dispatch tasks to land at least `count` events.
    pub(super) async fn wait_for(&self, count: usize) -> Vec<NotificationEvent> {
        for _ in 0..50 {
            let events = self.events();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), SinkDispatchError> {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(super) struct DownSink;

#[async_trait]
impl NotificationSink for DownSink {
    async fn deliver(&self, _event: &NotificationEvent) -> Result<(), SinkDispatchError> {
        Err(SinkDispatchError::Rejected {
            status: 503,
            body: "no_service".to_string(),
        })
    }
}

pub(super) fn predicate() -> RoutePredicate {
    RoutePredicate::new(
        Some("/pages/rdi-check".to_string()),
        Some("rdi-checker".to_string()),
        "x-page-context",
    )
}

pub(super) fn integration(mode: IntegrationMode) -> IntegrationConfig {
    IntegrationConfig {
        mode,
        allowed_origins: vec![STOREFRONT_ORIGIN.to_string()],
        auth_token: None,
    }
}

pub(super) type TestService = DestinationService<ScriptedVerifier, MemorySink>;

pub(super) fn build_service(
    mode: IntegrationMode,
    verifier: ScriptedVerifier,
) -> (Arc<TestService>, Arc<ScriptedVerifier>, Arc<MemorySink>) {
    build_service_with(integration(mode), verifier)
}

pub(super) fn build_service_with(
    integration: IntegrationConfig,
    verifier: ScriptedVerifier,
) -> (Arc<TestService>, Arc<ScriptedVerifier>, Arc<MemorySink>) {
    let verifier = Arc::new(verifier);
    let sink = Arc::new(MemorySink::default());
    let service = DestinationService::new(
        integration,
        Arc::clone(&verifier),
        NotificationRouter::new(predicate(), Arc::clone(&sink)),
    );
    (Arc::new(service), verifier, sink)
}

pub(super) fn detail_residential(residential: bool) -> Value {
    json!({
        "id": "adr_0001",
        "residential": !residential,
        "verifications": {
            "delivery": {
                "success": true,
                "errors": [],
                "details": { "residential": residential }
            }
        }
    })
}

pub(super) fn unflagged_verified() -> Value {
    json!({
        "id": "adr_0002",
        "verifications": { "delivery": { "success": true, "errors": [], "details": {} } }
    })
}

pub(super) fn undeliverable() -> Value {
    json!({
        "id": "adr_0003",
        "verifications": {
            "delivery": {
                "success": false,
                "errors": [{ "code": "E.ADDRESS.NOT_FOUND", "message": "Address not found" }]
            }
        }
    })
}

pub(super) fn quote_body(street: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "to_address": {
            "address1": street,
            "city": "Des Moines",
            "state": "IA",
            "zip": "50309"
        }
    }))
    .expect("body serializes")
}

pub(super) fn check_body(street: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "address1": street,
        "city": "Des Moines",
        "state": "IA",
        "zip": "50309"
    }))
    .expect("body serializes")
}

pub(super) fn storefront_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::ORIGIN,
        HeaderValue::from_static(STOREFRONT_ORIGIN),
    );
    headers
}

pub(super) fn checker_headers() -> HeaderMap {
    let mut headers = storefront_headers();
    headers.insert(
        axum::http::header::REFERER,
        HeaderValue::from_static(CHECKER_REFERER),
    );
    headers
}

pub(super) async fn read_json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Serves `router` on an ephemeral loopback port and returns its base URL.
pub(crate) async fn serve_locally(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("loopback listener binds");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("local server runs");
    });
    format!("http://{addr}")
}
