use axum::Router;

use crate::{
    config::{AppConfig, AuthScheme},
    state::AppState,
};

pub mod dto;
pub mod handlers;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod tokens;

use jwt::JwtKeys;

/// How authentication credentials are minted and checked.
#[derive(Clone)]
pub enum Credentials {
    /// Opaque tokens held in the token store; revocable.
    Opaque,
    /// Signed JWTs; valid until expiry even after a password reset.
    Jwt(JwtKeys),
}

impl Credentials {
    pub fn from_config(config: &AppConfig) -> Self {
        match config.auth_scheme {
            AuthScheme::Token => Credentials::Opaque,
            AuthScheme::Jwt => Credentials::Jwt(JwtKeys::from_config(&config.jwt)),
        }
    }
}

pub fn router() -> Router<AppState> {
    handlers::token_routes()
}
