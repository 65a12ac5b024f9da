use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    fallback::FallbackGenerator,
    handlers::{self, AppState, GENERATE_ENDPOINT},
    metrics,
    observability::{spawn_cleanup_task, CleanupConfig, LogDb},
    providers::GeminiClient,
    signals::shutdown_signal,
};

/// Start the proxy server
///
/// This function:
/// 1. Initializes metrics
/// 2. Connects the log database and runs migrations
/// 3. Builds the Gemini adapter and fallback chain
/// 4. Binds to the configured address
/// 5. Serves requests until SIGINT/SIGTERM
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let db = LogDb::connect(&config.database).await?;
    info!(url = %config.database.url, "Log database ready");

    if let Some(retention_days) = config.database.retention_days {
        spawn_cleanup_task(db.clone(), CleanupConfig::new(retention_days));
        info!(retention_days, "Log retention cleanup enabled");
    }

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;
    let client = GeminiClient::new(http_client, Arc::new(config.gemini.clone()));
    let generator = FallbackGenerator::new(Arc::new(client), config.gemini.candidate_models());

    let app_state = AppState {
        generator,
        store: Arc::new(db),
    };

    let app = create_router(app_state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting Gemini proxy on {}", addr);
    info!(
        "Configuration: {} candidate models ({}), upstream {}",
        config.gemini.models.len(),
        config.gemini.candidate_models().join(" -> "),
        config.gemini.base_url
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(app_state: AppState, metrics_handle: Arc<PrometheusHandle>) -> Router {
    let app_routes = Router::new()
        .route(GENERATE_ENDPOINT, post(handlers::handle_generate))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(app_state);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(app_routes)
        // Limit request body size to 10MB
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
}
