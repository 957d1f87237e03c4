use std::collections::HashMap;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{request::Parts, StatusCode},
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::{error::AppError, validation::Validator};

/// Request bodies larger than this are rejected before decoding.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// JSON body extractor whose failures render as the standard 400 envelope
/// with a message describing what was wrong with the body.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::BadRequest(format!("body must not be larger than {MAX_BODY_BYTES} bytes"))
            } else {
                AppError::BadRequest(rejection.body_text())
            }
        })?;
        decode(&bytes).map(JsonBody)
    }
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest("body must not be empty".into()));
    }
    serde_json::from_slice(bytes).map_err(|e| AppError::BadRequest(describe(&e)))
}

/// Custom deserializer messages carry serde_json's position suffix; clients
/// get the message alone.
fn without_position(msg: &str) -> &str {
    match msg.rfind(" at line ") {
        Some(idx) => &msg[..idx],
        None => msg,
    }
}

fn describe(err: &serde_json::Error) -> String {
    let msg = err.to_string();
    match err.classify() {
        Category::Eof => "body contains badly-formed JSON".into(),
        Category::Syntax if msg.starts_with("trailing characters") => {
            "body must only contain a single JSON value".into()
        }
        Category::Syntax => format!(
            "body contains badly-formed JSON (at line {} column {})",
            err.line(),
            err.column()
        ),
        Category::Data => {
            if let Some(rest) = msg.strip_prefix("unknown field `") {
                let field = rest.split('`').next().unwrap_or_default();
                format!("body contains unknown key \"{field}\"")
            } else if msg.starts_with("invalid type") {
                format!(
                    "body contains incorrect JSON type (at line {} column {})",
                    err.line(),
                    err.column()
                )
            } else {
                without_position(&msg).to_string()
            }
        }
        Category::Io => msg,
    }
}

/// Parses a path id. Anything that is not a positive integer is a 404.
pub fn parse_id(raw: &str) -> Result<i64, AppError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}

/// `:id` path segment as a positive integer. Undecodable segments are 404s
/// like any other bad id.
#[derive(Debug, Clone, Copy)]
pub struct PathId(pub i64);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PathId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::NotFound)?;
        parse_id(&raw).map(PathId)
    }
}

pub fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(v) if !v.is_empty() => v.clone(),
        _ => default.to_string(),
    }
}

pub fn read_csv(qs: &HashMap<String, String>, key: &str) -> Vec<String> {
    match qs.get(key) {
        Some(v) if !v.is_empty() => v.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Integer query value; a non-integer records a validation failure and
/// yields `default`.
pub fn read_int(qs: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match qs.get(key) {
        Some(raw) if !raw.is_empty() => raw.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
        _ => default,
    }
}
