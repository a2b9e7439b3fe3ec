//! Service entry point: wire the storage and engine adapters into the
//! lifecycle controller and serve the REST surface.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use covenant_ai::{ClauseEngine, OnnxEncoder};
use covenant_core::{Lifecycle, TextEncoder};
use covenant_server::{AppState, Config, build_router};
use covenant_store::{FsArtifactStore, LanceIndex, SqliteRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "covenant=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let repo = Arc::new(SqliteRepository::open(&config.data_dir.join("covenant.db")).await?);
    let artifacts = Arc::new(FsArtifactStore::new(config.data_dir.join("artifacts")));

    let encoder: Arc<dyn TextEncoder> = Arc::new(OnnxEncoder::load(&config.model_dir)?);
    let index = Arc::new(LanceIndex::open(&config.data_dir.join("embeddings"), encoder.dim()).await?);
    let engine = Arc::new(ClauseEngine::load(encoder.clone()).await?);

    let lifecycle = Arc::new(Lifecycle::new(
        repo,
        index,
        artifacts,
        engine,
        encoder,
        config.policy(),
    ));

    let app = build_router(AppState {
        lifecycle,
        default_user: config.default_user.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, "covenant v{}", env!("CARGO_PKG_VERSION"));
    axum::serve(listener, app).await?;
    Ok(())
}
