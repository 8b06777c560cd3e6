use tokio_util::sync::CancellationToken;

mod app;
mod auth;
mod config;
mod conversions;
mod convert;
mod db;
mod intake;
mod state;
mod storage;
mod sweeper;

use crate::sweeper::Sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "convertly=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    let cancel = CancellationToken::new();
    let sweeper = Sweeper::from_config(app_state.converter.areas(), &app_state.config.storage)
        .spawn(cancel.clone());

    let app = app::build_app(app_state);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        tracing::info!("shutting down");
    };
    let served = app::serve(app, shutdown).await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "sweeper task ended abnormally");
    }
    served
}
