use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument};

use super::{
    dto::{ActivateRequest, RegisterRequest, ResetPasswordRequest, UserEnvelope},
    repo_types::{validate_user, NewUser},
};
use crate::{
    auth::{
        dto::MessageResponse,
        identity::AuthenticatedUser,
        password::Password,
        tokens::{validate_token_plaintext, Scope, ACTIVATION_TTL},
    },
    error::{AppError, StoreError},
    json::JsonBody,
    mailer::templates,
    permissions::MOVIE_READ,
    state::AppState,
    validation::{validate_password_plaintext, Validator},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(register))
        .route("/v1/users/activated", put(activate))
        .route("/v1/users/password", put(reset_password))
        .route("/v1/users/me", get(me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<UserEnvelope>), AppError> {
    let mut v = Validator::new();
    validate_user(&mut v, &payload.name, &payload.email);
    validate_password_plaintext(&mut v, &payload.password);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let password = Password::set(&payload.password)?;
    let user = match state
        .users
        .insert(NewUser {
            name: payload.name,
            email: payload.email,
            password,
            activated: false,
        })
        .await
    {
        Ok(u) => u,
        Err(StoreError::DuplicateEmail) => {
            return Err(AppError::field("email", "a user with this email already exists"))
        }
        Err(e) => return Err(e.into()),
    };

    state.permissions.add_for_user(user.id, &[MOVIE_READ]).await?;

    let token = state
        .tokens
        .issue(user.id, ACTIVATION_TTL, Scope::Activation)
        .await?;

    let mailer = state.mailer.clone();
    let (user_id, email) = (user.id, user.email.clone());
    state.background("user_welcome_mail", async move {
        let data = json!({ "activationToken": token.plaintext, "userID": user_id });
        mailer.send(&email, templates::USER_WELCOME, &data).await
    });

    info!(user_id = user.id, "user registered");
    Ok((StatusCode::ACCEPTED, Json(UserEnvelope { user })))
}

#[instrument(skip(state, payload))]
pub async fn activate(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ActivateRequest>,
) -> Result<Json<UserEnvelope>, AppError> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &payload.token);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let mut user = match state.tokens.verify(Scope::Activation, &payload.token).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            return Err(AppError::field("token", "invalid or expired activation token"))
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    let user = state.users.update(&user).await?;
    state.tokens.revoke_all(Scope::Activation, user.id).await?;

    info!(user_id = user.id, "user activated");
    Ok(Json(UserEnvelope { user }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let mut v = Validator::new();
    validate_password_plaintext(&mut v, &payload.password);
    validate_token_plaintext(&mut v, &payload.token);
    if !v.valid() {
        return Err(AppError::FailedValidation(v.into_errors()));
    }

    let mut user = match state.tokens.verify(Scope::PasswordReset, &payload.token).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            return Err(AppError::field("token", "invalid or expired password reset token"))
        }
        Err(e) => return Err(e.into()),
    };

    user.password = Password::set(&payload.password)?;
    let user = state.users.update(&user).await?;

    // Outstanding sessions were opened with the old password.
    state.tokens.revoke_all(Scope::PasswordReset, user.id).await?;
    state.tokens.revoke_all(Scope::Authentication, user.id).await?;

    info!(user_id = user.id, "password reset");
    Ok(Json(MessageResponse::new("your password was successfully reset")))
}

#[instrument(skip_all)]
pub async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Json<UserEnvelope> {
    Json(UserEnvelope { user })
}
