use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_dossier_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use cnaps_intake::config::AppConfig;
use cnaps_intake::error::AppError;
use cnaps_intake::telemetry;
use cnaps_intake::workflows::dossier::{
    poller, DocumentStore, DossierService, DossierServiceError, JsonFileRepository, SmtpNotifier,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(
        JsonFileRepository::open(&config.storage.dossier_path)
            .map_err(DossierServiceError::from)?,
    );
    let documents = Arc::new(
        DocumentStore::open(&config.storage.upload_dir).map_err(DossierServiceError::from)?,
    );
    let notifier = Arc::new(SmtpNotifier::from_config(&config.smtp)?);
    let service = Arc::new(DossierService::new(repository, documents, notifier));

    poller::spawn(service.clone(), config.cnaps.poll_interval_secs);

    let app = with_dossier_routes(service, config.admin.shared_secret.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "dossier intake service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
