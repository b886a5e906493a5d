use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use poetry_family::{
    app_state::{AppState, UploadLimits},
    config::AppConfig,
    cors_layer,
    db::{self, MemoryStore, PgStore, PoetryStore, UserStore},
    routes,
    services::{
        auth::{ensure_admin, TokenService},
        enrichment::EnrichmentPipeline,
        storage::{ImageStore, LocalImageStore, R2ImageStore, LOCAL_PUBLIC_PREFIX},
    },
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!("Initializing poetry-family server");

    let prometheus_handle = Arc::new(PrometheusBuilder::new().install_recorder()?);
    routes::metrics::describe_metrics();

    let (poetry, users): (Arc<dyn PoetryStore>, Arc<dyn UserStore>) = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(url).await?;
            tracing::info!("Running database migrations");
            db::run_migrations(&pool).await?;
            let store = Arc::new(PgStore::new(pool));
            let poetry: Arc<dyn PoetryStore> = store.clone();
            let users: Arc<dyn UserStore> = store;
            (poetry, users)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data will not survive a restart");
            let store = Arc::new(MemoryStore::new());
            let poetry: Arc<dyn PoetryStore> = store.clone();
            let users: Arc<dyn UserStore> = store;
            (poetry, users)
        }
    };

    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        ensure_admin(users.as_ref(), username, password.expose()).await?;
    }

    let images: Arc<dyn ImageStore> = match config.r2() {
        Some(r2) => {
            tracing::info!(bucket = %r2.bucket, "Storing images in R2");
            Arc::new(R2ImageStore::new(&r2)?)
        }
        None => {
            tracing::info!(dir = %config.upload_dir.display(), "Storing images on local disk");
            tokio::fs::create_dir_all(&config.upload_dir).await?;
            Arc::new(LocalImageStore::new(config.upload_dir.clone()))
        }
    };

    let enrichment_config = config.enrichment();
    let (enrichment, worker) =
        EnrichmentPipeline::new(&enrichment_config, poetry.clone(), images.clone())?;
    let (stop_worker, worker_stopped) = oneshot::channel::<()>();
    let worker_handle = tokio::spawn(worker.run(async move {
        let _ = worker_stopped.await;
    }));

    let state = AppState::new(
        poetry,
        users,
        images,
        enrichment,
        TokenService::new(config.jwt_secret.expose(), config.jwt_ttl()),
        UploadLimits {
            max_file_size: config.max_file_size,
            max_files: config.max_upload_files,
            body_limit: config.body_limit(),
        },
    );

    let app = Router::new()
        .merge(routes::api_router(state))
        .nest_service(LOCAL_PUBLIC_PREFIX, ServeDir::new(&config.upload_dir))
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.cors_origins))
        .layer(RequestBodyLimitLayer::new(config.body_limit()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, waiting for enrichment jobs");
    let _ = stop_worker.send(());
    match worker_handle.await {
        Ok(report) => tracing::info!(jobs = report.total(), "Enrichment worker drained"),
        Err(e) => tracing::error!(error = %e, "Enrichment worker task failed"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
