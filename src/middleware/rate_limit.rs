use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::anyhow;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use crate::{config::LimiterConfig, error::AppError, state::AppState};

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const STALE_AFTER: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone)]
struct Client {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Per-IP token bucket. One instance is built at startup and shared through
/// [`AppState`]; a single lock covers both request checks and the sweep.
pub struct RateLimiter {
    rps: f64,
    burst: u32,
    clients: Mutex<HashMap<IpAddr, Client>>,
}

impl RateLimiter {
    pub fn new(rps: f64, burst: u32) -> Self {
        Self {
            rps,
            burst,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(cfg: &LimiterConfig) -> Self {
        Self::new(cfg.rps, cfg.burst)
    }

    /// Takes one token for `ip`, creating a full bucket on first sight.
    #[must_use]
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let burst = f64::from(self.burst);

        let mut clients = self.clients.lock();
        let client = clients.entry(ip).or_insert_with(|| Client {
            tokens: burst,
            last_refill: now,
            last_seen: now,
        });
        client.last_seen = now;

        let elapsed = now.duration_since(client.last_refill).as_secs_f64();
        client.tokens = (client.tokens + elapsed * self.rps).min(burst);
        client.last_refill = now;

        if client.tokens >= 1.0 {
            client.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drops clients idle for longer than [`STALE_AFTER`]; returns how many.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, c| now.duration_since(c.last_seen) <= STALE_AFTER);
        before - clients.len()
    }

    /// Background eviction loop. Safe to abort at any point.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = limiter.sweep();
                if evicted > 0 {
                    debug!(evicted, remaining = limiter.client_count(), "rate limiter sweep");
                }
            }
        })
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.limiter.enabled {
        return Ok(next.run(request).await);
    }

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .ok_or_else(|| AppError::Internal(anyhow!("peer address unavailable for rate limiting")))?;

    if !state.limiter.check(ip) {
        warn!(client = %ip, "rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}
