use std::{fmt, sync::Arc};

use async_trait::async_trait;
use data_encoding::BASE32_NOPAD;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{
    db::bounded,
    error::StoreError,
    users::repo_types::{User, UserRow},
    validation::Validator,
};

/// Length of the base-32 plaintext produced from 16 random bytes.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

pub const AUTHENTICATION_TTL: Duration = Duration::hours(24);
pub const ACTIVATION_TTL: Duration = Duration::days(3);
pub const PASSWORD_RESET_TTL: Duration = Duration::minutes(45);

/// The operation class a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
            Scope::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued token. Only `token` and `expiry` ever reach a client, and
/// only once; storage keeps the digest.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
    #[serde(skip)]
    pub scope: Scope,
}

pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

pub fn generate_token(user_id: i64, ttl: Duration, scope: Scope) -> Token {
    let mut random = [0u8; 16];
    OsRng.fill_bytes(&mut random);
    let plaintext = BASE32_NOPAD.encode(&random);
    let hash = hash_plaintext(&plaintext);

    Token {
        plaintext,
        hash,
        user_id,
        expiry: OffsetDateTime::now_utc() + ttl,
        scope,
    }
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;
    /// Owner of the non-expired token with this digest and scope.
    async fn get_user_for_token(
        &self,
        scope: Scope,
        hash: &[u8],
        now: OffsetDateTime,
    ) -> Result<User, StoreError>;
    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError>;
}

/// Issues, verifies and revokes opaque bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub async fn issue(&self, user_id: i64, ttl: Duration, scope: Scope) -> Result<Token, StoreError> {
        let token = generate_token(user_id, ttl, scope);
        self.store.insert(&token).await?;
        debug!(user_id, %scope, "token issued");
        Ok(token)
    }

    /// Resolves the owner of `plaintext`. Unknown, expired, wrong-scope and
    /// malformed tokens are all `NotFound`.
    pub async fn verify(&self, scope: Scope, plaintext: &str) -> Result<User, StoreError> {
        if plaintext.len() != TOKEN_PLAINTEXT_LEN {
            return Err(StoreError::NotFound);
        }
        let hash = hash_plaintext(plaintext);
        self.store
            .get_user_for_token(scope, &hash, OffsetDateTime::now_utc())
            .await
    }

    pub async fn revoke_all(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        self.store.delete_all_for_user(scope, user_id).await?;
        debug!(user_id, %scope, "tokens revoked");
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgTokenStore {
    db: PgPool,
}

impl PgTokenStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        bounded(
            sqlx::query(
                r#"
                INSERT INTO tokens (hash, user_id, expiry, scope)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&token.hash)
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.db),
        )
        .await?;
        Ok(())
    }

    async fn get_user_for_token(
        &self,
        scope: Scope,
        hash: &[u8],
        now: OffsetDateTime,
    ) -> Result<User, StoreError> {
        let row = bounded(
            sqlx::query_as::<_, UserRow>(
                r#"
                SELECT users.id, users.created_at, users.name, users.email,
                       users.password_hash, users.activated, users.version
                FROM users
                INNER JOIN tokens ON users.id = tokens.user_id
                WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expiry > $3
                "#,
            )
            .bind(hash)
            .bind(scope.as_str())
            .bind(now)
            .fetch_one(&self.db),
        )
        .await?;
        Ok(row.into())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        bounded(
            sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND scope = $2")
                .bind(user_id)
                .bind(scope.as_str())
                .execute(&self.db),
        )
        .await?;
        Ok(())
    }
}
