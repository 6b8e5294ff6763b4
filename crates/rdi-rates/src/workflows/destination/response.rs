use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use super::classification::Classification;
use super::pricing::{price, RateQuote};
use super::service::{DestinationError, Resolution};

const UNVERIFIED_NOTE: &str = " (address could not be verified)";

/// Quote-mode answer: always exactly one quote, whatever happened upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteResponse {
    pub status: StatusCode,
    pub quotes: [RateQuote; 1],
}

impl QuoteResponse {
    pub fn quote(&self) -> &RateQuote {
        &self.quotes[0]
    }
}

impl IntoResponse for QuoteResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.quotes)).into_response()
    }
}

/// Shapes the quote-mode response; failures become a fallback quote.
pub fn quote_response(outcome: &Result<Resolution, DestinationError>) -> QuoteResponse {
    match outcome {
        Ok(resolution) => QuoteResponse {
            status: StatusCode::OK,
            quotes: [priced_quote(resolution)],
        },
        Err(err) => {
            let status = match err {
                DestinationError::Validation(_) => StatusCode::BAD_REQUEST,
                DestinationError::Unauthorized => StatusCode::UNAUTHORIZED,
                DestinationError::Provider(_) => StatusCode::OK,
            };
            QuoteResponse {
                status,
                quotes: [RateQuote::fallback(&err.to_string())],
            }
        }
    }
}

fn priced_quote(resolution: &Resolution) -> RateQuote {
    let mut quote = price(&resolution.classification);
    if !resolution.verification.success() {
        quote.description.push_str(UNVERIFIED_NOTE);
    }
    quote
}

/// Classification-mode success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationReport {
    pub residential: bool,
    pub verification: bool,
    pub message: String,
}

impl ClassificationReport {
    pub fn from_resolution(resolution: &Resolution) -> Self {
        let verified = resolution.verification.success();
        Self {
            residential: resolution.classification.is_residential,
            verification: verified,
            message: outcome_message(verified, &resolution.classification).to_string(),
        }
    }
}

pub(crate) fn outcome_message(verified: bool, classification: &Classification) -> &'static str {
    match (verified, classification.is_residential) {
        (false, _) => "Unable to verify address",
        (true, true) => "Residential address detected",
        (true, false) => "Commercial address detected",
    }
}
