use std::marker::PhantomData;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{
    error::AppError,
    permissions::{PermissionStore, MOVIE_READ, MOVIE_WRITE},
    state::AppState,
    users::repo_types::User,
};

/// Caller resolved by the authenticate middleware. Always present in request
/// extensions once that middleware has run.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }
}

/// Reads the identity bound by the authenticate middleware.
///
/// Panics when it is absent: that only happens if a route is mounted outside
/// the middleware, which no client input can cause.
pub fn identity(parts: &Parts) -> &Identity {
    match parts.extensions.get::<Identity>() {
        Some(identity) => identity,
        None => panic!("request identity missing: authenticate middleware is not installed"),
    }
}

pub fn require_authenticated(identity: &Identity) -> Result<&User, AppError> {
    match identity {
        Identity::User(user) => Ok(user),
        Identity::Anonymous => Err(AppError::AuthenticationRequired),
    }
}

pub fn require_activated(identity: &Identity) -> Result<&User, AppError> {
    let user = require_authenticated(identity)?;
    if !user.activated {
        return Err(AppError::InactiveAccount);
    }
    Ok(user)
}

/// Full gate: authenticated, then activated, then holding `code`.
pub async fn require_permission<'a>(
    store: &dyn PermissionStore,
    identity: &'a Identity,
    code: &str,
) -> Result<&'a User, AppError> {
    let user = require_activated(identity)?;
    let permissions = store.get_all_for_user(user.id).await?;
    if !permissions.include(code) {
        return Err(AppError::NotPermitted);
    }
    Ok(user)
}

/// Any non-anonymous caller.
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        require_authenticated(identity(parts)).map(|u| AuthenticatedUser(u.clone()))
    }
}

pub trait PermissionCode: Send + Sync + 'static {
    const CODE: &'static str;
}

pub struct MovieRead;
pub struct MovieWrite;

impl PermissionCode for MovieRead {
    const CODE: &'static str = MOVIE_READ;
}

impl PermissionCode for MovieWrite {
    const CODE: &'static str = MOVIE_WRITE;
}

/// An activated caller holding permission `P`.
pub struct Permitted<P: PermissionCode> {
    pub user: User,
    _code: PhantomData<P>,
}

#[async_trait]
impl<P: PermissionCode> FromRequestParts<AppState> for Permitted<P> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = require_permission(state.permissions.as_ref(), identity(parts), P::CODE).await?;
        Ok(Permitted {
            user: user.clone(),
            _code: PhantomData,
        })
    }
}
