mod cleanup;
mod config;
mod routes;
mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use deaddrop_db::Database;
use deaddrop_engine::{DiskStorage, LifecycleEngine};

use crate::config::Config;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "deaddrop=debug,deaddrop_engine=debug,deaddrop_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };

    // Init DB and storage
    let db = Arc::new(Database::open(&config.db_path)?);
    let storage = Arc::new(
        DiskStorage::new(
            config.storage_dir.clone(),
            &config.signing_secret,
            &config.public_url,
        )
        .await?,
    );
    let engine = LifecycleEngine::new(db, storage.clone(), config.engine_config());

    tokio::spawn(cleanup::run_cleanup_loop(
        engine.clone(),
        config.cleanup_interval_secs,
    ));

    if config.cron_secret.is_none() {
        info!("DEADDROP_CRON_SECRET unset, cron cleanup endpoint disabled");
    }

    let state = AppState {
        engine,
        storage,
        cron_secret: config.cron_secret.clone(),
        http: reqwest::Client::new(),
    };

    // Uploaders and downloaders are anonymous browsers on any origin.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-delete-token"),
        ])
        .allow_credentials(false);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Deaddrop server listening on {}", addr);
    info!(
        "Retention: {} hours, purge grace {}s, grant TTL {}s",
        config.retention_hours, config.purge_grace_secs, config.access_ttl_secs
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
