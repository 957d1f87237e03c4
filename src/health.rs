use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub system_info: SystemInfo,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/healthcheck", get(healthcheck))
}

pub async fn healthcheck(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "available",
        system_info: SystemInfo {
            environment: state.config.env.clone(),
            version: VERSION,
        },
    })
}
