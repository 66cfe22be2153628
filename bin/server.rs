// PaymentX - Web Server
// REST API with Axum over the sqlite transaction store

use anyhow::Context;
use paymentx::api::{run_server, AppState};
use paymentx::{AppConfig, Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paymentx=info,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env().context("Failed to read configuration")?;

    let db = Database::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    tracing::info!(
        database = %config.database.display(),
        salted = config.identity_salt.is_some(),
        page_limit = config.page_limit,
        "PaymentX server starting"
    );

    let state = AppState::new(db, &config);
    run_server(state, &config).await
}
