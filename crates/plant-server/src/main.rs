mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use plant_api::{AppState, AppStateInner};
use plant_db::{Database, SqliteDocumentStore};
use plant_storage::firebase::{Endpoints, FirebaseStorage, Firestore};
use plant_storage::local::LocalObjectStore;

use crate::config::{Backend, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "plant_server=debug,plant_api=debug,plant_storage=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    let state = build_state(&config.backend).await?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let app = plant_api::router(state, config.max_upload_bytes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Plant Share server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_state(backend: &Backend) -> anyhow::Result<AppState> {
    let state = match backend {
        Backend::Firebase {
            bucket,
            project_id,
            storage_host,
            poll_interval,
        } => {
            let http = reqwest::Client::new();
            let endpoints = Endpoints {
                download: storage_host.clone(),
                ..Endpoints::default()
            };
            info!("Using Firebase bucket {} in project {}", bucket, project_id);

            AppStateInner::new(
                Arc::new(FirebaseStorage::new(http.clone(), bucket.as_str(), endpoints.clone())),
                Arc::new(Firestore::new(http, project_id.as_str(), endpoints, *poll_interval)),
            )
        }
        Backend::Local {
            bucket,
            dir,
            db_path,
            public_url,
        } => {
            let objects =
                LocalObjectStore::new(dir.clone(), bucket.as_str(), public_url.as_str()).await?;
            let db = Database::open(db_path)?;
            info!("Using local backend; retrieval URLs served from {}", public_url);

            AppStateInner::with_local_objects(Arc::new(objects), Arc::new(SqliteDocumentStore::new(db)))
        }
    };

    Ok(Arc::new(state))
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
                warn!("Could not install SIGTERM handler: {}", e);
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
