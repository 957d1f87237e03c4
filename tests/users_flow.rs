mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, PASSWORD};
use greenlight::{
    auth::tokens::{Scope, ACTIVATION_TTL},
    mailer::templates,
    permissions::{PermissionStore, MOVIE_READ},
};
use serde_json::json;

#[tokio::test]
async fn register_activate_and_reuse_fails() {
    let app = TestApp::new();

    let res = app
        .call(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({"name": "Alice", "email": "alice@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.body["user"]["activated"], false);
    assert!(res.body["user"].get("password").is_none());
    let user_id = res.body["user"]["id"].as_i64().unwrap();

    // New accounts may read movies.
    let perms = app.state.permissions.get_all_for_user(user_id).await.unwrap();
    assert!(perms.include(MOVIE_READ));

    let mail = app.wait_for_mail(1).await;
    assert_eq!(mail[0].template, templates::USER_WELCOME);
    assert_eq!(mail[0].recipient, "alice@example.com");
    assert_eq!(mail[0].data["userID"], user_id);
    let token = mail[0].data["activationToken"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 26);

    let res = app
        .call(Method::PUT, "/v1/users/activated", None, Some(json!({"token": token})))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["activated"], true);
    assert_eq!(res.body["user"]["version"], 2);

    let res = app
        .call(Method::PUT, "/v1/users/activated", None, Some(json!({"token": token})))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["token"], "invalid or expired activation token");
}

#[tokio::test]
async fn activation_revokes_sibling_tokens() {
    let app = TestApp::new();
    let user = app.seed_user("sib@example.com", false, &[], false).await;

    let first = app
        .state
        .tokens
        .issue(user.id, ACTIVATION_TTL, Scope::Activation)
        .await
        .unwrap();
    let second = app
        .state
        .tokens
        .issue(user.id, ACTIVATION_TTL, Scope::Activation)
        .await
        .unwrap();

    let res = app
        .call(Method::PUT, "/v1/users/activated", None, Some(json!({"token": first.plaintext})))
        .await;
    assert_eq!(res.status, StatusCode::OK);

    assert!(app
        .state
        .tokens
        .verify(Scope::Activation, &second.plaintext)
        .await
        .is_err());
}

#[tokio::test]
async fn registration_validation_and_duplicates() {
    let app = TestApp::new();

    let res = app
        .call(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({"name": "", "email": "nope", "password": "short"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["name"], "must be provided");
    assert_eq!(res.body["error"]["email"], "must be a valid email address");
    assert_eq!(res.body["error"]["password"], "must be at least 8 bytes long");

    app.seed_user("taken@example.com", false, &[], false).await;
    let res = app
        .call(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({"name": "Bob", "email": "taken@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["email"], "a user with this email already exists");
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let app = TestApp::new();

    let res = app
        .call(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({"name": "A", "email": "a@example.com", "password": PASSWORD, "admin": true})),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "body contains unknown key \"admin\"");

    let res = app.call(Method::POST, "/v1/users", None, None).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "body must not be empty");
}

#[tokio::test]
async fn login_and_me() {
    let app = TestApp::new();
    app.seed_user("carol@example.com", true, &[], true).await;

    let res = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({"email": "carol@example.com", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "invalid authentication credentials");

    let res = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({"email": "nobody@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({"email": "carol@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let token = res.body["authentication_token"]["token"].as_str().unwrap().to_string();
    assert!(res.body["authentication_token"]["expiry"].is_string());

    let res = app.call(Method::GET, "/v1/users/me", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["email"], "carol@example.com");

    let res = app.call(Method::GET, "/v1/users/me", None, None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["error"], "you must be authenticated to access this resource");
}

#[tokio::test]
async fn password_reset_revokes_sessions() {
    let app = TestApp::new();
    let user = app.seed_user("dave@example.com", true, &[], true).await;
    let session = app.auth_token(user.id).await;

    let res = app
        .call(
            Method::POST,
            "/v1/tokens/password-reset",
            None,
            Some(json!({"email": "dave@example.com"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::ACCEPTED);

    let mail = app.wait_for_mail(1).await;
    assert_eq!(mail[0].template, templates::TOKEN_PASSWORD_RESET);
    let reset = mail[0].data["passwordResetToken"].as_str().unwrap().to_string();

    let res = app
        .call(
            Method::PUT,
            "/v1/users/password",
            None,
            Some(json!({"password": "n3w-pa55word", "token": reset})),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "your password was successfully reset");

    let res = app.call(Method::GET, "/v1/users/me", Some(&session), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({"email": "dave@example.com", "password": "n3w-pa55word"})),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
}

#[tokio::test]
async fn token_requests_check_account_state() {
    let app = TestApp::new();
    app.seed_user("active@example.com", true, &[], false).await;
    app.seed_user("pending@example.com", false, &[], false).await;

    let res = app
        .call(Method::POST, "/v1/tokens/activation", None, Some(json!({"email": "active@example.com"})))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["email"], "user has already been activated");

    let res = app
        .call(Method::POST, "/v1/tokens/password-reset", None, Some(json!({"email": "pending@example.com"})))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .call(Method::POST, "/v1/tokens/activation", None, Some(json!({"email": "ghost@example.com"})))
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(res.body["error"]["email"], "no matching email address found");

    let res = app
        .call(Method::POST, "/v1/tokens/activation", None, Some(json!({"email": "pending@example.com"})))
        .await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    let mail = app.wait_for_mail(1).await;
    assert_eq!(mail[0].template, templates::TOKEN_ACTIVATION);
}
