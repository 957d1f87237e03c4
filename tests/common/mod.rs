#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use greenlight::{
    app::build_app,
    auth::{
        password::Password,
        tokens::{Scope, AUTHENTICATION_TTL},
    },
    config::AppConfig,
    mailer::{Delivered, LogMailer},
    permissions::PermissionStore,
    state::AppState,
    users::{
        repo::UserStore,
        repo_types::{NewUser, User},
    },
};
use serde_json::Value;
use tower::ServiceExt;

pub const PASSWORD: &str = "pa55word";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub mailer: Arc<LogMailer>,
    pub peer: SocketAddr,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::for_tests())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let mailer = Arc::new(LogMailer::recording());
        let state = AppState::in_memory(config).with_mailer(mailer.clone());
        let router = build_app(state.clone());
        Self {
            state,
            router,
            mailer,
            peer: SocketAddr::from(([127, 0, 0, 1], 40_000)),
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.call_with(method, uri, token, body, &[]).await
    }

    pub async fn call_with(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(self.peer));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let res = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request builds"))
            .await
            .expect("router is infallible");

        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is JSON")
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Inserts a user directly. The stored hash is a placeholder unless
    /// `with_password` is set, so only those users can log in.
    pub async fn seed_user(
        &self,
        email: &str,
        activated: bool,
        permissions: &[&str],
        with_password: bool,
    ) -> User {
        let password = if with_password {
            Password::set(PASSWORD).expect("hash")
        } else {
            Password::from_hash("placeholder".into())
        };
        let user = self
            .state
            .users
            .insert(NewUser {
                name: "Test User".into(),
                email: email.into(),
                password,
                activated,
            })
            .await
            .expect("insert user");
        self.state
            .permissions
            .add_for_user(user.id, permissions)
            .await
            .expect("grant permissions");
        user
    }

    pub async fn auth_token(&self, user_id: i64) -> String {
        self.state
            .tokens
            .issue(user_id, AUTHENTICATION_TTL, Scope::Authentication)
            .await
            .expect("issue token")
            .plaintext
    }

    /// Waits for background mail; it is sent after the response.
    pub async fn wait_for_mail(&self, count: usize) -> Vec<Delivered> {
        for _ in 0..200 {
            let sent = self.mailer.delivered();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} mail(s), got {}", self.mailer.delivered().len());
    }
}
