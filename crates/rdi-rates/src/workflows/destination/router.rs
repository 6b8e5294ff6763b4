use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde_json::json;
use tracing::debug;

use super::notification::NotificationSink;
use super::service::{DestinationService, PipelineStage};
use super::verification::AddressVerifier;
use crate::config::IntegrationMode;

pub const QUOTE_PATH: &str = "/api/asr-rates";
pub const CLASSIFICATION_PATH: &str = "/api/rdi-check";

const ALLOW_METHODS: &str = "POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Router exposing the single endpoint for the service's integration mode.
pub fn destination_router<V, S>(service: Arc<DestinationService<V, S>>) -> Router
where
    V: AddressVerifier + 'static,
    S: NotificationSink + 'static,
{
    let path = match service.mode() {
        IntegrationMode::Quote => QUOTE_PATH,
        IntegrationMode::Classification => CLASSIFICATION_PATH,
    };

    Router::new()
        .route(path, any(destination_handler::<V, S>))
        .with_state(service)
}

pub(crate) async fn destination_handler<V, S>(
    State(service): State<Arc<DestinationService<V, S>>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    V: AddressVerifier + 'static,
    S: NotificationSink + 'static,
{
    let mut response = match method {
        Method::OPTIONS => StatusCode::OK.into_response(),
        Method::POST => match service.mode() {
            IntegrationMode::Quote => service.quote(&headers, &body).await.into_response(),
            IntegrationMode::Classification => match service.check(&headers, &body).await {
                Ok(report) => (StatusCode::OK, Json(report)).into_response(),
                Err(err) => err.into_response(),
            },
        },
        _ => (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({ "error": "Method not allowed" })),
        )
            .into_response(),
    };

    apply_cors(response.headers_mut(), &headers, service.allowed_origins());
    debug!(
        stage = PipelineStage::Responded.label(),
        %method,
        status = %response.status(),
        "destination request answered"
    );
    response
}

/// Echoes an allow-listed `Origin`, otherwise answers with the wildcard.
pub(crate) fn apply_cors(target: &mut HeaderMap, request: &HeaderMap, allowed_origins: &[String]) {
    let echoed = request
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .filter(|origin| allowed_origins.iter().any(|allowed| allowed == origin))
        .and_then(|origin| HeaderValue::from_str(origin).ok());

    match echoed {
        Some(origin) => {
            target.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            target.insert(header::VARY, HeaderValue::from_static("Origin"));
        }
        None => {
            target.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
        }
    }
    target.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    target.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}
