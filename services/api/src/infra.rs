use metrics_exporter_prometheus::PrometheusHandle;
use rdi_rates::config::AppConfig;
use rdi_rates::error::AppError;
use rdi_rates::workflows::destination::{
    DestinationService, EasyPostVerifier, NotificationRouter, RoutePredicate, WebhookSink,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type LiveDestinationService = DestinationService<EasyPostVerifier, WebhookSink>;

/// Wires the production verifier and webhook sink from configuration.
pub(crate) fn destination_service(config: &AppConfig) -> Result<LiveDestinationService, AppError> {
    if config.provider.api_key.is_none() {
        warn!("EASYPOST_API_KEY is not set; every verification will fail");
    }
    if config.notifications.webhook_url.is_none() {
        warn!("WEBHOOK_URL is not set; notifications are disabled");
    }

    let verifier = Arc::new(EasyPostVerifier::from_config(&config.provider)?);
    let sink = Arc::new(WebhookSink::from_config(&config.notifications)?);
    let notifier = NotificationRouter::new(
        RoutePredicate::from_config(&config.notifications),
        sink,
    );

    Ok(DestinationService::new(
        config.integration.clone(),
        verifier,
        notifier,
    ))
}
