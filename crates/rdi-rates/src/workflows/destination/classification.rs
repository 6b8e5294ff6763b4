use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use super::address::AddressRecord;
use super::verification::{ResidentialShape, VerificationResult};

/// Which tier of the resolution chain produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    ProviderDetail,
    ProviderTopLevel,
    HeuristicRegex,
    Default,
}

impl ClassificationSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProviderDetail => "provider_detail",
            Self::ProviderTopLevel => "provider_top_level",
            Self::HeuristicRegex => "heuristic_regex",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Classification {
    pub is_residential: bool,
    pub source: ClassificationSource,
}

impl Classification {
    pub const fn commercial_default() -> Self {
        Self {
            is_residential: false,
            source: ClassificationSource::Default,
        }
    }
}

type Resolver = fn(&VerificationResult, &AddressRecord) -> Option<Classification>;

const RESOLVERS: [Resolver; 3] = [from_delivery_detail, from_top_level, from_street_tokens];

/// Residential/commercial decision for one destination; first tier with an answer wins,
/// otherwise commercial.
pub fn classify(result: &VerificationResult, address: &AddressRecord) -> Classification {
    RESOLVERS
        .iter()
        .find_map(|resolve| resolve(result, address))
        .unwrap_or_else(Classification::commercial_default)
}

fn from_delivery_detail(result: &VerificationResult, _: &AddressRecord) -> Option<Classification> {
    match result.shape() {
        ResidentialShape::DeliveryDetailResidential(is_residential) => Some(Classification {
            is_residential,
            source: ClassificationSource::ProviderDetail,
        }),
        _ => None,
    }
}

fn from_top_level(result: &VerificationResult, _: &AddressRecord) -> Option<Classification> {
    match result.shape() {
        ResidentialShape::TopLevelResidential(is_residential) => Some(Classification {
            is_residential,
            source: ClassificationSource::ProviderTopLevel,
        }),
        _ => None,
    }
}

fn from_street_tokens(_: &VerificationResult, address: &AddressRecord) -> Option<Classification> {
    street_looks_residential(&address.street1).then_some(Classification {
        is_residential: true,
        source: ClassificationSource::HeuristicRegex,
    })
}

fn residential_tokens() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    TOKENS.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:apt|apartment|unit|suite|ste|road|rd|lane|ln|drive|dr|court|ct|circle|cir|terrace|trail|place|way)\b|#\s*\w",
        )
        .expect("residential token pattern is valid")
    })
}

pub(crate) fn street_looks_residential(street: &str) -> bool {
    residential_tokens().is_match(street)
}
