use std::any::Any;

use anyhow::anyhow;
use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::error::AppError;

/// Converts a handler panic into the 500 envelope and asks the client to
/// drop the connection.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut res = AppError::Internal(anyhow!("handler panicked: {detail}")).into_response();
    res.headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    res
}
