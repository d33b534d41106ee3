use crate::cli::ServeArgs;
use crate::infra::{load_catalog, AppState, Screenings, Services};
use crate::routes::with_platform_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use credentialing::config::AppConfig;
use credentialing::error::AppError;
use credentialing::telemetry::{self, LogFormat};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(
        &config.telemetry,
        LogFormat::for_environment(config.environment),
    )?;

    let catalog = load_catalog(&config.catalog)?;
    let services = Services::in_memory(catalog, config.screening);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    spawn_expiry_sweep(
        services.screenings.clone(),
        Duration::from_secs(args.sweep_interval_secs.max(1)),
    );

    let app = with_platform_routes(&services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "credentialing service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically expires processes whose access token is past its deadline.
fn spawn_expiry_sweep(screenings: Arc<Screenings>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match screenings.expire_stale(Utc::now()) {
                Ok(expired) if !expired.is_empty() => {
                    info!(count = expired.len(), "stale screening processes expired");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "screening expiry sweep failed"),
            }
        }
    });
}
