use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::{health::VERSION, state::AppState};

/// Process-wide request counters, published on `/debug/vars`.
#[derive(Debug, Default)]
pub struct Metrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    responses_by_status: Mutex<BTreeMap<u16, u64>>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Counters {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    #[serde(rename = "total_processing_time_μs")]
    pub total_processing_time_us: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, status: StatusCode, elapsed: Duration) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.processing_time_us.fetch_add(micros, Ordering::Relaxed);
        *self
            .responses_by_status
            .lock()
            .entry(status.as_u16())
            .or_default() += 1;
    }

    pub fn counters(&self) -> Counters {
        Counters {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
            total_responses_sent_by_status: self
                .responses_by_status
                .lock()
                .iter()
                .map(|(status, n)| (status.to_string(), *n))
                .collect(),
        }
    }
}

/// Outermost layer: counts the request on the way in and the response,
/// whatever produced it, on the way out.
pub async fn track(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    state.metrics.record_request();
    let res = next.run(request).await;
    state.metrics.record_response(res.status(), started.elapsed());
    res
}

#[derive(Debug, Serialize)]
pub struct PoolStats {
    pub max_open_connections: u32,
    pub open_connections: u32,
    pub idle: usize,
    pub in_use: usize,
}

#[derive(Debug, Serialize)]
pub struct Vars {
    pub version: &'static str,
    pub tasks: usize,
    pub database: Option<PoolStats>,
    pub timestamp: i64,
    #[serde(flatten)]
    pub counters: Counters,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/debug/vars", get(debug_vars))
}

pub async fn debug_vars(State(state): State<AppState>) -> Json<Vars> {
    let database = state.db.as_ref().map(|pool| {
        let open = pool.size();
        let idle = pool.num_idle();
        PoolStats {
            max_open_connections: state.config.db.max_connections,
            open_connections: open,
            idle,
            in_use: (open as usize).saturating_sub(idle),
        }
    });

    Json(Vars {
        version: VERSION,
        tasks: tokio::runtime::Handle::current().metrics().num_alive_tasks(),
        database,
        timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        counters: state.metrics.counters(),
    })
}
