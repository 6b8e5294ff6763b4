//! Destination address checks: verification, residential/commercial classification,
//! residential-surcharge pricing, and provenance-filtered operator notifications.
//!
//! A request moves through `Received → Normalized → Verified → Classified → Priced →
//! Responded`. Quote deployments fold every failure back into a fallback quote;
//! classification deployments surface failures to the caller.

pub mod address;
pub mod classification;
pub mod notification;
pub mod pricing;
pub mod response;
pub mod router;
pub mod service;
pub mod verification;

#[cfg(test)]
mod tests;

pub use address::{normalize, parse_payload, AddressRecord, PayloadLayout, ValidationError};
pub use classification::{classify, Classification, ClassificationSource};
pub use notification::{
    NotificationEvent, NotificationKind, NotificationRouter, NotificationSink, RequestContext,
    RoutePredicate, SinkDispatchError, WebhookSink,
};
pub use pricing::{price, RateQuote, BASE_PRICE_CENTS, CURRENCY, RESIDENTIAL_SURCHARGE_CENTS};
pub use response::{ClassificationReport, QuoteResponse};
pub use router::{destination_router, CLASSIFICATION_PATH, QUOTE_PATH};
pub use service::{DestinationError, DestinationService, PipelineStage, Resolution};
pub use verification::{
    AddressVerifier, EasyPostVerifier, ProviderError, ResidentialShape, VerificationResult,
};
