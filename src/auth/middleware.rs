use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::{identity::Identity, tokens::Scope, Credentials};
use crate::{error::AppError, error::StoreError, state::AppState};

/// Resolves the caller from `Authorization: Bearer <token>` and binds an
/// [`Identity`] into request extensions. A missing header means anonymous;
/// anything else that fails to verify is rejected here.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let mut response = match resolve(&state, request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    };
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

fn bearer(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::InvalidAuthenticationToken)?;

    let mut segments = value.split(' ');
    match (segments.next(), segments.next(), segments.next()) {
        (Some("Bearer"), Some(token), None) => Ok(Some(token)),
        _ => Err(AppError::InvalidAuthenticationToken),
    }
}

async fn resolve(state: &AppState, headers: &HeaderMap) -> Result<Identity, AppError> {
    let Some(token) = bearer(headers)? else {
        return Ok(Identity::Anonymous);
    };

    let found = match &state.credentials {
        Credentials::Opaque => state.tokens.verify(Scope::Authentication, token).await,
        Credentials::Jwt(keys) => match keys.verify(token) {
            Ok(user_id) => state.users.get(user_id).await,
            Err(e) => {
                debug!(error = %e, "jwt rejected");
                Err(StoreError::NotFound)
            }
        },
    };

    match found {
        Ok(user) => Ok(Identity::User(user)),
        Err(StoreError::NotFound) => {
            warn!("invalid authentication token");
            Err(AppError::InvalidAuthenticationToken)
        }
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            identity::AuthenticatedUser,
            tokens::AUTHENTICATION_TTL,
        },
        auth::password::Password,
        config::AppConfig,
        users::repo_types::NewUser,
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn whoami(identity: axum::Extension<Identity>) -> String {
        match identity.0 {
            Identity::Anonymous => "anonymous".into(),
            Identity::User(u) => u.email,
        }
    }

    async fn me(AuthenticatedUser(user): AuthenticatedUser) -> String {
        user.email
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/me", get(me))
            .layer(middleware::from_fn_with_state(state.clone(), authenticate))
            .with_state(state)
    }

    fn get_with(path: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn seeded() -> (AppState, String) {
        let state = AppState::in_memory(AppConfig::for_tests());
        let user = state
            .users
            .insert(NewUser {
                name: "Eve".into(),
                email: "eve@example.com".into(),
                password: Password::from_hash("hash".into()),
                activated: true,
            })
            .await
            .unwrap();
        let token = state
            .tokens
            .issue(user.id, AUTHENTICATION_TTL, Scope::Authentication)
            .await
            .unwrap();
        (state, token.plaintext)
    }

    #[tokio::test]
    async fn missing_header_is_anonymous() {
        let (state, _) = seeded().await;
        let res = app(state).oneshot(get_with("/whoami", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::VARY], "Authorization");
    }

    #[tokio::test]
    async fn anonymous_hitting_authenticated_route_is_forbidden() {
        let (state, _) = seeded().await;
        let res = app(state).oneshot(get_with("/me", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn valid_token_resolves_user() {
        let (state, token) = seeded().await;
        let res = app(state)
            .oneshot(get_with("/me", Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_and_unknown_tokens_get_same_rejection() {
        let (state, token) = seeded().await;
        let cases = [
            format!("Token {token}"),
            format!("Bearer {token} extra"),
            "Bearer".to_string(),
            "Bearer short".to_string(),
            format!("Bearer {}", "A".repeat(26)),
        ];
        for header_value in cases {
            let res = app(state.clone())
                .oneshot(get_with("/whoami", Some(&header_value)))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{header_value}");
            assert_eq!(res.headers()[header::WWW_AUTHENTICATE], "Bearer");
            assert_eq!(res.headers()[header::VARY], "Authorization");
        }
    }

    #[tokio::test]
    async fn jwt_scheme_verifies_signed_tokens() {
        let mut config = AppConfig::for_tests();
        config.auth_scheme = crate::config::AuthScheme::Jwt;
        let state = AppState::in_memory(config);
        let user = state
            .users
            .insert(NewUser {
                name: "Fay".into(),
                email: "fay@example.com".into(),
                password: Password::from_hash("hash".into()),
                activated: true,
            })
            .await
            .unwrap();
        let Credentials::Jwt(keys) = &state.credentials else {
            panic!("expected jwt credentials");
        };
        let (jwt, _) = keys.sign(user.id).unwrap();

        let res = app(state.clone())
            .oneshot(get_with("/me", Some(&format!("Bearer {jwt}"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app(state)
            .oneshot(get_with("/me", Some("Bearer not.a.jwt")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
