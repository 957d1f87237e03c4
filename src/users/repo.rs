use async_trait::async_trait;
use sqlx::PgPool;

use super::repo_types::{NewUser, User, UserRow};
use crate::{db::bounded, error::StoreError};

const EMAIL_UNIQUE: &str = "users_email_key";

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get(&self, id: i64) -> Result<User, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;
    /// Applies `user` only if the stored version still equals `user.version`,
    /// returning the row with its version bumped by one.
    async fn update(&self, user: &User) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn duplicate_email(err: StoreError) -> StoreError {
    match err {
        StoreError::Database(sqlx::Error::Database(ref db))
            if db.constraint() == Some(EMAIL_UNIQUE) =>
        {
            StoreError::DuplicateEmail
        }
        other => other,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let row = bounded(
            sqlx::query_as::<_, UserRow>(
                r#"
                INSERT INTO users (name, email, password_hash, activated)
                VALUES ($1, $2, $3, $4)
                RETURNING id, created_at, name, email, password_hash, activated, version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.password.hash())
            .bind(user.activated)
            .fetch_one(&self.db),
        )
        .await
        .map_err(duplicate_email)?;
        Ok(row.into())
    }

    async fn get(&self, id: i64) -> Result<User, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let row = bounded(
            sqlx::query_as::<_, UserRow>(
                r#"
                SELECT id, created_at, name, email, password_hash, activated, version
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_one(&self.db),
        )
        .await?;
        Ok(row.into())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = bounded(
            sqlx::query_as::<_, UserRow>(
                r#"
                SELECT id, created_at, name, email, password_hash, activated, version
                FROM users
                WHERE lower(email) = lower($1)
                "#,
            )
            .bind(email)
            .fetch_one(&self.db),
        )
        .await?;
        Ok(row.into())
    }

    async fn update(&self, user: &User) -> Result<User, StoreError> {
        let row = bounded(
            sqlx::query_as::<_, UserRow>(
                r#"
                UPDATE users
                SET name = $1, email = $2, password_hash = $3, activated = $4,
                    version = version + 1
                WHERE id = $5 AND version = $6
                RETURNING id, created_at, name, email, password_hash, activated, version
                "#,
            )
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.password.hash())
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.db),
        )
        .await
        .map_err(duplicate_email)?;

        // No row means the version moved (or the user vanished) since it was read.
        row.map(User::from).ok_or(StoreError::EditConflict)
    }
}
