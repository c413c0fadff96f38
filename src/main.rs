//! Stash Server
//!
//! Self-hosted chunked file host: streams come in over HTTP or the raw
//! socket protocol, get hashed and deduplicated, and land in durable
//! storage behind stable item ids.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stash_server::config::Config;
use stash_server::db::{self, SqliteItemStore};
use stash_server::hooks::HookBus;
use stash_server::media::MediaService;
use stash_server::routes;
use stash_server::socket;
use stash_server::state::AppState;
use stash_server::upload::{sweep_stale_temp_files, StreamRegistry, UploadService};
use stash_server::web::PageRenderer;

/// Uploads arrive as raw request bodies of arbitrary chunk size.
const MAX_CHUNK_BODY: usize = 256 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stash_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Starting Stash Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Upload directory: {}", config.storage.upload_dir);
    tracing::info!("Database: {}", config.database.url);

    // Temp files from streams that died with a previous process
    let swept = sweep_stale_temp_files(Path::new(&config.storage.upload_dir))
        .await
        .context("Failed to sweep stale temp files")?;
    if swept > 0 {
        tracing::info!(count = swept, "Cleaned up after previous run");
    }

    // Initialize database
    let pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    let store = Arc::new(SqliteItemStore::new(pool));

    // Wire up the engine
    let hooks = HookBus::default();
    let registry = StreamRegistry::new(
        &config.storage.upload_dir,
        config.upload.idle_timeout(),
        hooks.clone(),
    )
    .await
    .context("Failed to initialize stream registry")?;
    let _sweeper = registry.start_sweeper();

    let uploads = UploadService::new(
        registry,
        store,
        hooks.clone(),
        config.upload.id_length,
        config.upload.max_extension_length,
    );

    let pages = PageRenderer::new(&config.web, &config.storage.web_root);
    let media = MediaService::new(&config.storage.thumbnail_dir)
        .await
        .context("Failed to initialize thumbnail directory")?;

    let state = AppState::new(config.clone(), uploads.clone(), pages, media, hooks);

    // Duplex-socket binding on its own port
    let socket_addr = format!("{}:{}", config.server.host, config.socket.port);
    let socket_listener = TcpListener::bind(&socket_addr)
        .await
        .with_context(|| format!("Failed to bind socket listener on {}", socket_addr))?;
    tracing::info!("Socket binding listening on {}", socket_addr);
    tokio::spawn(socket::serve(
        socket_listener,
        uploads,
        config.socket.max_frame,
    ));

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_CHUNK_BODY))
        .with_state(state);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Stash Server listening on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
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
