// ============================
// studyroom-gateway/src/main.rs
// ============================
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use studyroom_gateway_lib::{
    conference::StaticIssuer,
    config,
    storage::FlatFileStorage,
    ws_router, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = config::load_settings()?;

    // Initialize tracing; RUST_LOG overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let storage = Arc::new(FlatFileStorage::new(&settings.data_dir)?);
    let credentials = Arc::new(StaticIssuer::new(settings.conference_endpoint.clone()));

    let bind_addr = settings.bind_addr;
    let state = Arc::new(AppState::new(storage, credentials, settings));

    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "gateway listening");

    axum::serve(listener, app).await?;

    Ok(())
}
