use std::sync::Arc;

use user_directory::{app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "user_directory=debug,axum=info,tower_http=info".to_string());
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

    let config = Arc::new(AppConfig::from_env()?);
    let db = AppState::connect(&config).await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }

    let addr = config.listen_addr()?;
    let app = app::build_app(AppState::new(config, db));
    app::serve(app, addr).await
}
