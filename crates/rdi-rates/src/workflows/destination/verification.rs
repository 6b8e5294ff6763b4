use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::address::AddressRecord;
use crate::config::ProviderConfig;

const DELIVERY_SUCCESS_POINTER: &str = "/verifications/delivery/success";

/// Where the provider put its residential indicator, if anywhere.
///
/// The provider reports the flag inside the delivery verification details for some
/// call modes and on the address object itself for others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "residential", rename_all = "snake_case")]
pub enum ResidentialShape {
    DeliveryDetailResidential(bool),
    TopLevelResidential(bool),
    Unverified,
}

type ShapeExtractor = fn(&Value) -> Option<ResidentialShape>;

/// Probed in order; the first extractor that finds a JSON boolean decides the shape.
const SHAPE_EXTRACTORS: [ShapeExtractor; 2] = [delivery_detail_flag, top_level_flag];

fn delivery_detail_flag(raw: &Value) -> Option<ResidentialShape> {
    raw.pointer("/verifications/delivery/details/residential")
        .and_then(Value::as_bool)
        .map(ResidentialShape::DeliveryDetailResidential)
}

fn top_level_flag(raw: &Value) -> Option<ResidentialShape> {
    raw.get("residential")
        .and_then(Value::as_bool)
        .map(ResidentialShape::TopLevelResidential)
}

impl ResidentialShape {
    pub fn from_payload(raw: &Value) -> Self {
        SHAPE_EXTRACTORS
            .iter()
            .find_map(|extract| extract(raw))
            .unwrap_or(ResidentialShape::Unverified)
    }
}

/// Provider answer for one address. Built once and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    success: bool,
    shape: ResidentialShape,
    raw: Value,
}

impl VerificationResult {
    pub fn from_payload(raw: Value) -> Self {
        let success = raw
            .pointer(DELIVERY_SUCCESS_POINTER)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let shape = ResidentialShape::from_payload(&raw);
        Self {
            success,
            shape,
            raw,
        }
    }

    /// Whether delivery verification succeeded.
    pub fn success(&self) -> bool {
        self.success
    }

    pub fn shape(&self) -> ResidentialShape {
        self.shape
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("address verification credential is not configured")]
    MissingCredential,
    #[error("address verification client could not be built: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("address verification request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("address verification response was not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// External address verification. Implementations must not retry.
#[async_trait]
pub trait AddressVerifier: Send + Sync {
    async fn verify(&self, address: &AddressRecord) -> Result<VerificationResult, ProviderError>;
}

/// EasyPost `addresses` endpoint with delivery verification requested.
#[derive(Debug, Clone)]
pub struct EasyPostVerifier {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl EasyPostVerifier {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::ClientBuild)?;
        Ok(Self::new(http, config.base_url.clone(), config.api_key.clone()))
    }

    fn addresses_url(&self) -> String {
        format!("{}/v2/addresses", self.base_url)
    }
}

#[async_trait]
impl AddressVerifier for EasyPostVerifier {
    async fn verify(&self, address: &AddressRecord) -> Result<VerificationResult, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential)?;

        let body = json!({
            "address": {
                "street1": address.street1,
                "city": address.city,
                "state": address.state,
                "zip": address.zip,
                "country": address.country,
            }
        });

        let response = self
            .http
            .post(self.addresses_url())
            .query(&[("verify[]", "delivery")])
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let raw: Value = serde_json::from_slice(&bytes)?;

        if !status.is_success() {
            warn!(%status, "address provider answered without verifying");
        }
        debug!(%status, payload = %raw, "address provider response");

        Ok(VerificationResult::from_payload(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::destination::tests::common::serve_locally;
    use axum::extract::RawQuery;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::{Html, IntoResponse};
    use axum::routing::post;
    use axum::{Json, Router};

    const TEST_KEY: &str = "EZTK_test";

    /// Answers 422 with a residential flag, but only for a correctly formed request.
    async fn unverified_answer(RawQuery(query): RawQuery, headers: HeaderMap) -> impl IntoResponse {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some("Bearer EZTK_test");
        let delivery_requested = query.as_deref() == Some("verify%5B%5D=delivery");
        if !(authorized && delivery_requested) {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad request" })));
        }

        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "residential": true,
                "verifications": { "delivery": { "success": false, "errors": [] } }
            })),
        )
    }

    async fn gateway_page() -> impl IntoResponse {
        (StatusCode::BAD_GATEWAY, Html("<html><body>502 Bad Gateway</body></html>"))
    }

    async fn verifier_against(router: Router) -> EasyPostVerifier {
        let base_url = serve_locally(router).await;
        EasyPostVerifier::from_config(&ProviderConfig {
            api_key: Some(TEST_KEY.to_string()),
            base_url,
            timeout: std::time::Duration::from_secs(5),
        })
        .expect("client builds")
    }

    #[test]
    fn detail_flag_wins_over_conflicting_top_level_flag() {
        let result = VerificationResult::from_payload(json!({
            "residential": false,
            "verifications": {
                "delivery": { "success": true, "details": { "residential": true } }
            }
        }));

        assert!(result.success());
        assert_eq!(
            result.shape(),
            ResidentialShape::DeliveryDetailResidential(true)
        );
    }

    #[test]
    fn top_level_flag_used_when_detail_missing_or_not_boolean() {
        let result = VerificationResult::from_payload(json!({
            "residential": true,
            "verifications": {
                "delivery": { "success": true, "details": { "residential": null } }
            }
        }));

        assert_eq!(result.shape(), ResidentialShape::TopLevelResidential(true));
    }

    #[test]
    fn provider_error_body_is_unverified() {
        let result = VerificationResult::from_payload(json!({
            "error": { "code": "ADDRESS.VERIFY.FAILURE", "message": "Unable to verify address." }
        }));

        assert!(!result.success());
        assert_eq!(result.shape(), ResidentialShape::Unverified);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let verifier = EasyPostVerifier::new(
            reqwest::Client::new(),
            "https://api.easypost.test/",
            None,
        );
        assert_eq!(
            verifier.addresses_url(),
            "https://api.easypost.test/v2/addresses"
        );
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let verifier = EasyPostVerifier::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
        let address = AddressRecord::new("1 Main St", "Ames", "IA", "50010");

        let err = verifier
            .verify(&address)
            .await
            .expect_err("no credential configured");
        assert!(matches!(err, ProviderError::MissingCredential));
    }

    #[tokio::test]
    async fn non_success_json_answer_is_a_degraded_result() {
        let verifier =
            verifier_against(Router::new().route("/v2/addresses", post(unverified_answer))).await;
        let address = AddressRecord::new("9 Elm Ln", "Ames", "IA", "50010");

        let result = verifier
            .verify(&address)
            .await
            .expect("422 with a JSON body is still an answer");
        assert!(!result.success());
        assert_eq!(result.shape(), ResidentialShape::TopLevelResidential(true));
    }

    #[tokio::test]
    async fn non_json_answer_is_malformed() {
        let verifier =
            verifier_against(Router::new().route("/v2/addresses", post(gateway_page))).await;
        let address = AddressRecord::new("9 Elm Ln", "Ames", "IA", "50010");

        let err = verifier
            .verify(&address)
            .await
            .expect_err("html body is not a provider answer");
        assert!(matches!(err, ProviderError::Malformed(_)), "{err:?}");
    }
}
