use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use sqlx::PgPool;
use tracing::error;

use crate::{
    auth::{
        tokens::{PgTokenStore, TokenService},
        Credentials,
    },
    config::AppConfig,
    mailer::{create_mailer, DynMailer, LogMailer},
    memory::MemoryStore,
    metrics::Metrics,
    middleware::rate_limit::RateLimiter,
    movies::repo::{MovieStore, PgMovieStore},
    permissions::{PermissionStore, PgPermissionStore},
    users::repo::{PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: TokenService,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
    pub mailer: DynMailer,
    pub limiter: Arc<RateLimiter>,
    pub credentials: Credentials,
    pub metrics: Arc<Metrics>,
    /// Pool handle for `/debug/vars`; absent for in-memory state.
    pub db: Option<PgPool>,
}

impl AppState {
    /// Postgres-backed state for the running server.
    pub fn from_pool(db: PgPool, config: AppConfig) -> anyhow::Result<Self> {
        let mailer = create_mailer(config.smtp.as_ref())?;
        Ok(Self {
            users: Arc::new(PgUserStore::new(db.clone())),
            tokens: TokenService::new(Arc::new(PgTokenStore::new(db.clone()))),
            permissions: Arc::new(PgPermissionStore::new(db.clone())),
            movies: Arc::new(PgMovieStore::new(db.clone())),
            mailer,
            limiter: Arc::new(RateLimiter::from_config(&config.limiter)),
            credentials: Credentials::from_config(&config),
            metrics: Arc::new(Metrics::new()),
            db: Some(db),
            config: Arc::new(config),
        })
    }

    /// Every store backed by one [`MemoryStore`]; mail is only logged.
    pub fn in_memory(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            tokens: TokenService::new(store.clone()),
            permissions: store.clone(),
            movies: store,
            mailer: Arc::new(LogMailer::new()),
            limiter: Arc::new(RateLimiter::from_config(&config.limiter)),
            credentials: Credentials::from_config(&config),
            metrics: Arc::new(Metrics::new()),
            db: None,
            config: Arc::new(config),
        }
    }

    pub fn with_mailer(mut self, mailer: DynMailer) -> Self {
        self.mailer = mailer;
        self
    }

    /// Runs `task` detached from the request. Errors and panics are logged
    /// and go no further; the task may be lost on abrupt shutdown.
    pub fn background<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(task = name, error = ?e, "background task failed"),
                Err(_) => error!(task = name, "background task panicked"),
            }
        });
    }
}
