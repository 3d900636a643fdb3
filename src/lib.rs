pub mod catalog;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalize;
pub mod openapi;
pub mod query;
pub mod refresh;
pub mod settings;
pub mod store;
pub mod upstream;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use handlers::{healthcheck, healthz_live, list_class_types, list_classes, list_clubs, root};
use tokio_util::sync::CancellationToken;
use tower_http::LatencyUnit;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::catalog::Catalog;
use crate::normalize::Normalizer;
use crate::openapi::ApiDoc;
use crate::refresh::RefreshScheduler;
use crate::settings::Settings;
use crate::store::{CatalogStore, MemoryCatalog, SqliteCatalog};
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub catalog: Catalog,
    pub refresh: Arc<RefreshScheduler>,
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let tz = settings.timezone()?;
    let store: Arc<dyn CatalogStore> = match &settings.database_path {
        Some(path) => Arc::new(SqliteCatalog::open(path)?),
        None => Arc::new(MemoryCatalog::new()),
    };
    let source = UpstreamClient::new(
        settings.upstream_url.clone(),
        settings.club_codes(),
        settings.upstream_timeout(),
    )?;
    let refresh = Arc::new(RefreshScheduler::new(
        Arc::new(source),
        store.clone(),
        Normalizer::new(tz),
        settings.refresh_interval(),
    ));

    info!("Running initial catalog refresh");
    if refresh.run_cycle().await.is_err() {
        warn!("Initial refresh failed; serving the stored catalog until the next cycle");
    }

    let cancel = CancellationToken::new();
    let refresh_task = refresh.clone().spawn(cancel.clone());

    let state = AppState {
        settings: settings.clone(),
        catalog: Catalog::new(store, tz),
        refresh,
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!("Starting Fitness Timetable API on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    refresh_task.await?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/classes", get(list_classes))
        .route("/classes/", get(list_classes))
        .route("/classtypes", get(list_class_types))
        .route("/classtypes/", get(list_class_types))
        .route("/clubs", get(list_clubs))
        .route("/healthcheck", get(healthcheck))
        .route("/healthcheck/", get(healthcheck))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthcheck))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(trace_layer)
}
