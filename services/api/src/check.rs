use crate::infra::destination_service;
use clap::Args;
use rdi_rates::config::AppConfig;
use rdi_rates::error::AppError;
use rdi_rates::telemetry;
use rdi_rates::workflows::destination::{
    normalize, price, AddressRecord, ClassificationReport, PayloadLayout, RateQuote,
    ValidationError,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// Street line of the destination
    #[arg(long)]
    pub(crate) address1: String,
    #[arg(long)]
    pub(crate) city: String,
    #[arg(long)]
    pub(crate) state: String,
    #[arg(long)]
    pub(crate) zip: String,
    /// ISO country code
    #[arg(long, default_value = "US")]
    pub(crate) country: String,
    /// Include the provider's raw response in the output
    #[arg(long)]
    pub(crate) raw: bool,
}

impl CheckArgs {
    /// Same trimming and required-field rules as a flat request body.
    fn address(&self) -> Result<AddressRecord, ValidationError> {
        let payload = json!({
            "address1": self.address1,
            "city": self.city,
            "state": self.state,
            "zip": self.zip,
            "country": self.country,
        });
        normalize(&payload, PayloadLayout::Flat)
    }
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    address: AddressRecord,
    classification_source: &'static str,
    #[serde(flatten)]
    report: ClassificationReport,
    quote: RateQuote,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_response: Option<Value>,
}

pub(crate) async fn run_check(args: CheckArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let address = args.address()?;
    let service = destination_service(&config)?;

    let resolution = service.resolve(address).await?;
    let output = CheckOutput {
        classification_source: resolution.classification.source.label(),
        report: ClassificationReport::from_resolution(&resolution),
        quote: price(&resolution.classification),
        provider_response: args.raw.then(|| resolution.verification.raw().clone()),
        address: resolution.address,
    };

    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("{rendered}");
    Ok(())
}
