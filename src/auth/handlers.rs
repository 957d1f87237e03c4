use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{
    dto::{AuthenticationTokenResponse, CredentialsRequest, EmailRequest, IssuedToken, MessageResponse},
    tokens::{Scope, ACTIVATION_TTL, AUTHENTICATION_TTL, PASSWORD_RESET_TTL},
    Credentials,
};
use crate::{
    error::{AppError, StoreError},
    json::JsonBody,
    mailer::templates,
    state::AppState,
    users::repo_types::User,
    validation::{validate_email, validate_password_plaintext, Validator},
};

pub fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tokens/authentication", post(create_authentication_token))
        .route("/v1/tokens/activation", post(create_activation_token))
        .route("/v1/tokens/password-reset", post(create_password_reset_token))
}

#[instrument(skip(state, payload))]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthenticationTokenResponse>), AppError> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let user = match state.users.get_by_email(&payload.email).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            warn!("login with unknown email");
            return Err(AppError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    if !user.password.matches(&payload.password)? {
        warn!(user_id = user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let issued = match &state.credentials {
        Credentials::Opaque => {
            let token = state
                .tokens
                .issue(user.id, AUTHENTICATION_TTL, Scope::Authentication)
                .await?;
            IssuedToken {
                token: token.plaintext,
                expiry: token.expiry,
            }
        }
        Credentials::Jwt(keys) => {
            let (token, expiry) = keys.sign(user.id)?;
            IssuedToken { token, expiry }
        }
    };

    info!(user_id = user.id, "authentication token issued");
    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenResponse {
            authentication_token: issued,
        }),
    ))
}

/// Looks up the account behind a token request; unknown emails are a field error.
async fn user_for_email(state: &AppState, email: &str) -> Result<User, AppError> {
    let mut v = Validator::new();
    validate_email(&mut v, email);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    match state.users.get_by_email(email).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(AppError::field("email", "no matching email address found")),
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state, payload))]
pub async fn create_activation_token(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<EmailRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let user = user_for_email(&state, &payload.email).await?;
    if user.activated {
        return Err(AppError::field("email", "user has already been activated"));
    }

    let token = state
        .tokens
        .issue(user.id, ACTIVATION_TTL, Scope::Activation)
        .await?;

    let mailer = state.mailer.clone();
    state.background("token_activation_mail", async move {
        let data = json!({ "activationToken": token.plaintext });
        mailer.send(&user.email, templates::TOKEN_ACTIVATION, &data).await
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "an email will be sent to you containing activation instructions",
        )),
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_password_reset_token(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<EmailRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let user = user_for_email(&state, &payload.email).await?;
    if !user.activated {
        return Err(AppError::field("email", "user account must be activated"));
    }

    let token = state
        .tokens
        .issue(user.id, PASSWORD_RESET_TTL, Scope::PasswordReset)
        .await?;

    let mailer = state.mailer.clone();
    state.background("token_password_reset_mail", async move {
        let data = json!({ "passwordResetToken": token.plaintext });
        mailer.send(&user.email, templates::TOKEN_PASSWORD_RESET, &data).await
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "an email will be sent to you containing password reset instructions",
        )),
    ))
}
