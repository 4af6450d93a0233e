//! Vanish Server
//!
//! Accepts large files as independently uploaded chunks, assembles them and
//! serves them back with byte-range support.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vanish_server::config::Config;
use vanish_server::routes;
use vanish_server::state::AppState;
use vanish_server::storage::{BlobStore, S3Client};
use vanish_server::upload::UPLOAD_ID_HEADER;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "vanish_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Starting Vanish Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Upload dir: {}", config.upload.upload_dir.display());
    tracing::info!("Chunk dir: {}", config.upload.temp_dir.display());

    if config.auth.tokens.is_empty() {
        tracing::warn!("AUTH_TOKENS is empty; every authenticated request will be rejected");
    }

    // Remote storage, constructed once and shared through the state
    let blob_store: Option<Arc<dyn BlobStore>> = match &config.storage {
        Some(storage) => {
            tracing::info!("S3 endpoint: {}", storage.endpoint);
            tracing::info!("S3 bucket: {}", storage.bucket);
            Some(Arc::new(
                S3Client::new(storage)
                    .await
                    .context("Failed to initialize S3 client")?,
            ))
        }
        None => {
            tracing::warn!("S3_ENDPOINT not set, artifacts stay in the upload directory");
            None
        }
    };

    let app_state = AppState::new(config.clone(), blob_store)
        .await
        .context("Failed to create upload directories")?;
    let sweeper = app_state.start_session_sweeper();

    // Build CORS layer
    let origin = match &config.server.cors_origin {
        Some(origin) => AllowOrigin::exact(
            HeaderValue::from_str(origin).context("Invalid CORS_ORIGIN")?,
        ),
        None => AllowOrigin::from(Any),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::CONTENT_RANGE,
            header::RANGE,
            HeaderName::from_static(UPLOAD_ID_HEADER),
        ]);

    // Build router
    let app = routes::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server with graceful shutdown
    let ip = config
        .server
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid SERVER_HOST: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    tracing::info!("Vanish Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
