use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::address::{normalize, parse_payload, AddressRecord, PayloadLayout, ValidationError};
use super::classification::{classify, Classification};
use super::notification::{NotificationEvent, NotificationRouter, NotificationSink, RequestContext};
use super::pricing::RateQuote;
use super::response::{outcome_message, quote_response, ClassificationReport, QuoteResponse};
use super::verification::{AddressVerifier, ProviderError, VerificationResult};
use crate::config::{IntegrationConfig, IntegrationMode};

/// Per-request pipeline position; errors record the stage they left from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Normalized,
    Verified,
    Classified,
    Priced,
    Responded,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Normalized => "normalized",
            Self::Verified => "verified",
            Self::Classified => "classified",
            Self::Priced => "priced",
            Self::Responded => "responded",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl DestinationError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            DestinationError::Validation(_) | DestinationError::Unauthorized => {
                PipelineStage::Received
            }
            DestinationError::Provider(ProviderError::Malformed(_)) => PipelineStage::Verified,
            DestinationError::Provider(_) => PipelineStage::Normalized,
        }
    }
}

impl IntoResponse for DestinationError {
    fn into_response(self) -> Response {
        match self {
            DestinationError::Validation(ValidationError::InvalidJson(_)) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid JSON body" })),
            )
                .into_response(),
            DestinationError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Missing required address fields" })),
            )
                .into_response(),
            DestinationError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            )
                .into_response(),
            DestinationError::Provider(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal Server Error", "details": err.to_string() })),
            )
                .into_response(),
        }
    }
}

/// Everything known about a destination once classification is done.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub address: AddressRecord,
    pub verification: VerificationResult,
    pub classification: Classification,
}

/// One pass through the pipeline, with the parsed body when parsing got that far.
struct Attempt {
    outcome: Result<Resolution, DestinationError>,
    context: RequestContext,
    payload: Option<Value>,
}

impl Attempt {
    fn rejected(err: DestinationError, context: RequestContext) -> Self {
        Self {
            outcome: Err(err),
            context,
            payload: None,
        }
    }
}

/// Composes normalizer, verifier, classifier and notification router for one deployment mode.
pub struct DestinationService<V, S> {
    integration: IntegrationConfig,
    verifier: Arc<V>,
    notifier: NotificationRouter<S>,
}

impl<V, S> DestinationService<V, S>
where
    V: AddressVerifier + 'static,
    S: NotificationSink + 'static,
{
    pub fn new(
        integration: IntegrationConfig,
        verifier: Arc<V>,
        notifier: NotificationRouter<S>,
    ) -> Self {
        Self {
            integration,
            verifier,
            notifier,
        }
    }

    pub fn mode(&self) -> IntegrationMode {
        self.integration.mode
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.integration.allowed_origins
    }

    pub fn request_context(&self, headers: &HeaderMap) -> RequestContext {
        RequestContext::from_headers(headers, self.notifier.predicate().page_context_header())
    }

    /// Bearer gate; open when no token is configured.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), DestinationError> {
        let Some(expected) = self.integration.auth_token.as_deref() else {
            return Ok(());
        };

        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim())
            .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim());

        if presented == Some(expected) {
            Ok(())
        } else {
            Err(DestinationError::Unauthorized)
        }
    }

    /// Verifies and classifies an already-normalized address.
    pub async fn resolve(&self, address: AddressRecord) -> Result<Resolution, ProviderError> {
        let verification = self.verifier.verify(&address).await?;
        let classification = classify(&verification, &address);
        info!(
            stage = PipelineStage::Classified.label(),
            address = %address.one_line(),
            verified = verification.success(),
            residential = classification.is_residential,
            source = classification.source.label(),
            "destination classified"
        );
        Ok(Resolution {
            address,
            verification,
            classification,
        })
    }

    /// Quote mode: always yields one quote; failures become a fallback quote.
    pub async fn quote(&self, headers: &HeaderMap, body: &[u8]) -> QuoteResponse {
        let Attempt {
            outcome, context, ..
        } = self.run(headers, body, PayloadLayout::Nested).await;
        let response = quote_response(&outcome);

        match &outcome {
            Ok(resolution) => {
                debug!(
                    stage = PipelineStage::Priced.label(),
                    service_code = %response.quote().service_code,
                    total_price = response.quote().total_price_cents,
                    "destination priced"
                );
                self.notify(quoted_event(resolution, response.quote()), &context);
            }
            Err(err) => {
                warn!(error = %err, stage = err.stage().label(), "issuing fallback quote");
                self.notify(fallback_event(err, response.quote()), &context);
            }
        }

        response
    }

    /// Classification mode: reports the determination or surfaces the failure.
    pub async fn check(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<ClassificationReport, DestinationError> {
        let Attempt {
            outcome,
            context,
            payload,
        } = self.run(headers, body, PayloadLayout::Flat).await;

        match outcome {
            Ok(resolution) => {
                self.notify(checked_event(&resolution), &context);
                Ok(ClassificationReport::from_resolution(&resolution))
            }
            Err(err) => {
                warn!(error = %err, stage = err.stage().label(), "destination check failed");
                self.notify(check_failed_event(&err, payload.as_ref()), &context);
                Err(err)
            }
        }
    }

    async fn run(&self, headers: &HeaderMap, body: &[u8], layout: PayloadLayout) -> Attempt {
        let context = self.request_context(headers);
        if let Err(err) = self.authorize(headers) {
            return Attempt::rejected(err, context);
        }

        let payload = match parse_payload(body) {
            Ok(payload) => payload,
            Err(err) => return Attempt::rejected(err.into(), context),
        };
        let context = context.with_payload_fallback(&payload);

        let outcome = match normalize(&payload, layout) {
            Ok(address) => self.resolve(address).await.map_err(DestinationError::from),
            Err(err) => Err(err.into()),
        };
        Attempt {
            outcome,
            context,
            payload: Some(payload),
        }
    }

    fn notify(&self, event: NotificationEvent, context: &RequestContext) {
        // Detached: the response never waits on delivery.
        let _ = self.notifier.dispatch(event, context);
    }
}

fn quoted_event(resolution: &Resolution, quote: &RateQuote) -> NotificationEvent {
    let event = if resolution.verification.success() {
        NotificationEvent::success("Shipping Rate Quoted", quote.service_name.clone())
    } else {
        NotificationEvent::warning(
            "Rate Quoted For Unverified Address",
            quote.service_name.clone(),
        )
    };
    with_resolution_context(event, resolution).with_context("total_price", quote.total_price_cents)
}

fn fallback_event(err: &DestinationError, quote: &RateQuote) -> NotificationEvent {
    NotificationEvent::error("Shipping Rate Fallback Applied", err.to_string())
        .with_context("stage", err.stage().label())
        .with_context("service_code", quote.service_code.clone())
        .with_context("timestamp", Utc::now().to_rfc3339())
}

fn checked_event(resolution: &Resolution) -> NotificationEvent {
    let verified = resolution.verification.success();
    let message = outcome_message(verified, &resolution.classification);
    let event = if verified {
        NotificationEvent::success("RDI Address Check Successful", message)
    } else {
        NotificationEvent::warning("RDI Address Verification Incomplete", message)
    };
    with_resolution_context(event, resolution)
}

fn check_failed_event(err: &DestinationError, payload: Option<&Value>) -> NotificationEvent {
    let event = match err {
        DestinationError::Validation(ValidationError::InvalidJson(detail)) => {
            NotificationEvent::error("Invalid JSON in RDI Request", detail.clone())
        }
        DestinationError::Validation(validation) => {
            ["address1", "city", "state", "zip"].into_iter().fold(
                NotificationEvent::error("Missing Required Address Fields", validation.to_string()),
                |event, key| {
                    let submitted = payload.and_then(|payload| payload.get(key)).cloned();
                    event.with_context(key, submitted.unwrap_or(Value::Null))
                },
            )
        }
        DestinationError::Unauthorized => {
            NotificationEvent::error("Unauthorized RDI Request", err.to_string())
        }
        DestinationError::Provider(provider) => {
            let address = payload
                .and_then(|payload| normalize(payload, PayloadLayout::Flat).ok())
                .map(|address| Value::from(address.one_line()))
                .unwrap_or(Value::Null);
            NotificationEvent::error("Address Provider Error", provider.to_string())
                .with_context("address", address)
                .with_context("timestamp", Utc::now().to_rfc3339())
        }
    };
    event.with_context("stage", err.stage().label())
}

fn with_resolution_context(event: NotificationEvent, resolution: &Resolution) -> NotificationEvent {
    event
        .with_context("address", resolution.address.one_line())
        .with_context("verified", resolution.verification.success())
        .with_context("residential", resolution.classification.is_residential)
        .with_context("source", resolution.classification.source.label())
}
