use std::net::SocketAddr;

use anyhow::Context;
use greenlight::{app, config::AppConfig, db, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "greenlight=debug,tower_http=info".to_string());
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

    let config = AppConfig::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("APP_HOST/APP_PORT do not form a socket address")?;

    let pool = db::connect(&config.db).await?;
    tracing::info!("database connection pool established");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("run migrations")?;

    let env = config.env.clone();
    let state = AppState::from_pool(pool, config)?;
    state.limiter.spawn_sweeper();

    app::serve(app::build_app(state), addr, &env).await
}
