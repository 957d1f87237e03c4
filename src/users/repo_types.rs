use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::{
    auth::password::Password,
    validation::{validate_email, Validator},
};

/// User record. `password` has no `Serialize` impl and must stay skipped.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    pub version: i32,
}

/// Fields supplied at registration; id, timestamp and version come from the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Password,
    pub activated: bool,
}

#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub created_at: OffsetDateTime,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
    pub version: i32,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            created_at: r.created_at,
            name: r.name,
            email: r.email,
            password: Password::from_hash(r.password_hash),
            activated: r.activated,
            version: r.version,
        }
    }
}

pub fn validate_user(v: &mut Validator, name: &str, email: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, email);
}
