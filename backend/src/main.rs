use anyhow::Context;
use loan_gateway::{Directory, Gateway, GATEWAY_NAME};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use colend_backend::{config::Settings, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().context("failed to load settings")?;

    // The registry and ledger trust whatever principal the directory
    // resolves under the gateway name, so register it before bootstrapping.
    let mut directory = Directory::new(settings.admin_id);
    directory.register(settings.admin_id, GATEWAY_NAME, Uuid::new_v4())?;
    let gateway = Gateway::bootstrap(&directory, settings.admin_id, settings.operator_id)?;

    let state = AppState::new(gateway, settings.jwt_secret.clone());
    let app = routes::app(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, operator = %settings.operator_id, "colend backend listening");
    axum::serve(listener, app).await?;
    Ok(())
}
