pub mod cors;
pub mod rate_limit;
pub mod recover;

use std::time::Duration;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;

/// Rewrites the router's bare 405 into the JSON envelope, keeping `Allow`.
pub async fn method_not_allowed(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let res = next.run(request).await;
    if res.status() != StatusCode::METHOD_NOT_ALLOWED {
        return res;
    }

    let allow = res.headers().get(header::ALLOW).cloned();
    let mut rewritten = AppError::MethodNotAllowed(method).into_response();
    if let Some(allow) = allow {
        rewritten.headers_mut().insert(header::ALLOW, allow);
    }
    rewritten
}

/// Upper bound on producing a response, matching the server's write deadline.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sits directly outside `TimeoutLayer` and turns its empty 408 into JSON.
pub async fn request_timeout(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if res.status() == StatusCode::REQUEST_TIMEOUT {
        return AppError::RequestTimeout.into_response();
    }
    res
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}
