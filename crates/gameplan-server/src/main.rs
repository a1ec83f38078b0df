mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use gameplan_api::{AppState, AppStateInner};
use gameplan_auth::AuthService;
use gameplan_upstream::{HttpBillingProvider, HttpReplyGenerator, LogMailer};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gameplan=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = gameplan_db::Database::open(&PathBuf::from(&config.db_path))?;

    // Shared state
    let billing = HttpBillingProvider::new(config.billing.clone())
        .map_err(|e| anyhow::anyhow!("billing provider init failed: {e}"))?;
    let replies = HttpReplyGenerator::new(config.reply.clone())
        .map_err(|e| anyhow::anyhow!("reply generator init failed: {e}"))?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        auth: AuthService::new(config.auth.clone()),
        billing: Arc::new(billing),
        replies: Arc::new(replies),
        mailer: Arc::new(LogMailer),
    });

    let app = gameplan_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Gameplan server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
