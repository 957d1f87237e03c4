use axum::Router;

use crate::state::AppState;

mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod runtime;

pub fn router() -> Router<AppState> {
    handlers::movie_routes()
}
