use serde::{Deserialize, Serialize};

use super::classification::Classification;

/// Minor currency units (cents).
pub const BASE_PRICE_CENTS: u32 = 1000;
pub const RESIDENTIAL_SURCHARGE_CENTS: u32 = 1000;
pub const CURRENCY: &str = "USD";

pub const COMMERCIAL_SERVICE_CODE: &str = "STD";
pub const RESIDENTIAL_SERVICE_CODE: &str = "RES_STD";
pub const FALLBACK_SERVICE_CODE: &str = "STD_FALLBACK";

/// Carrier-rate line item. Field names follow the carrier callback contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub service_name: String,
    pub service_code: String,
    #[serde(rename = "total_price")]
    pub total_price_cents: u32,
    pub description: String,
    pub currency: String,
}

impl RateQuote {
    /// Quote issued when no classification could be made. Charges the base price.
    pub fn fallback(reason: &str) -> Self {
        let reason = reason.trim();
        let description = if reason.is_empty() {
            "Rate unavailable, standard rate applied".to_string()
        } else {
            reason.to_string()
        };

        Self {
            service_name: "Standard Shipping".to_string(),
            service_code: FALLBACK_SERVICE_CODE.to_string(),
            total_price_cents: BASE_PRICE_CENTS,
            description,
            currency: CURRENCY.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.service_code == FALLBACK_SERVICE_CODE
    }
}

pub fn price(classification: &Classification) -> RateQuote {
    if classification.is_residential {
        RateQuote {
            service_name: "Standard (Residential Fee Applied)".to_string(),
            service_code: RESIDENTIAL_SERVICE_CODE.to_string(),
            total_price_cents: BASE_PRICE_CENTS + RESIDENTIAL_SURCHARGE_CENTS,
            description: format!(
                "Includes {} residential delivery fee",
                dollars(RESIDENTIAL_SURCHARGE_CENTS)
            ),
            currency: CURRENCY.to_string(),
        }
    } else {
        RateQuote {
            service_name: "Standard Shipping".to_string(),
            service_code: COMMERCIAL_SERVICE_CODE.to_string(),
            total_price_cents: BASE_PRICE_CENTS,
            description: "Commercial address, no residential fee".to_string(),
            currency: CURRENCY.to_string(),
        }
    }
}

fn dollars(cents: u32) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
