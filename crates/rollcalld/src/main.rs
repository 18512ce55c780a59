use anyhow::Result;
use rollcall_core::gallery;
use rollcall_core::{Identify, ModelPaths, ReferenceMatcher, Threshold};
use rollcall_ledger::Ledger;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        images = %config.images_dir.display(),
        ledger = %config.ledger_path.display(),
        models = %config.model_dir.display(),
        threshold = config.distance_threshold,
        "rollcalld starting"
    );

    if gallery::ensure_dir(&config.images_dir)? {
        tracing::warn!(path = %config.images_dir.display(), "created missing reference directory");
    }
    gallery::purge_cache_artifacts(&config.images_dir)?;

    let ledger = Ledger::open(&config.ledger_path)?;

    // Load models synchronously (fail-fast)
    let models = ModelPaths::in_dir(&config.model_dir);
    let matcher = ReferenceMatcher::load(&models, &config.images_dir)?;
    tracing::info!(references = matcher.reference_count(), "models loaded");

    let engine = engine::spawn_engine(
        Box::new(matcher),
        ledger,
        Threshold(config.distance_threshold),
    );

    let app = http::create_router(http::AppState { engine }, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "rollcalld ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("rollcalld shutting down");
    Ok(())
}
