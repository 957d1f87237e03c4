//! Flat permission codes granted per user. Codes are opaque strings compared
//! by exact equality; there is no hierarchy or wildcard matching.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{db::bounded, error::StoreError};

pub const MOVIE_READ: &str = "movie:read";
pub const MOVIE_WRITE: &str = "movie:write";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for Permissions {
    fn from(codes: Vec<String>) -> Self {
        Self(codes)
    }
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError>;
    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgPermissionStore {
    db: PgPool,
}

impl PgPermissionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let codes = bounded(
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT permissions.code
                FROM permissions
                INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                WHERE users_permissions.user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.db),
        )
        .await?;
        Ok(Permissions(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        bounded(
            sqlx::query(
                r#"
                INSERT INTO users_permissions (user_id, permission_id)
                SELECT $1, permissions.id FROM permissions
                WHERE permissions.code = ANY($2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(codes)
            .execute(&self.db),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_is_exact_match() {
        let perms = Permissions::from(vec![MOVIE_READ.to_string()]);
        assert!(perms.include("movie:read"));
        assert!(!perms.include("movie:write"));
        assert!(!perms.include("movie:*"));
        assert!(!perms.include("movie"));
    }
}
