use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    http::{Request, Response},
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use tokio::{net::TcpListener, sync::oneshot};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn, Span};

use crate::{
    auth::{self, middleware::authenticate},
    health,
    json::MAX_BODY_BYTES,
    metrics,
    middleware::{
        cors::cors_layer, method_not_allowed, not_found, rate_limit::rate_limit,
        recover::panic_response, request_timeout, REQUEST_TIMEOUT,
    },
    movies,
    state::AppState,
    users,
};

/// How long in-flight requests get to finish after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

/// Routes plus the middleware chain. Outermost first: metrics, trace, panic
/// recovery, CORS, request timeout, rate limit, authenticate.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(users::router())
        .merge(auth::router())
        .merge(movies::router())
        .merge(metrics::router())
        .fallback(not_found)
        .layer(from_fn(method_not_allowed))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(from_fn(request_timeout))
        .layer(cors_layer(&state.config.cors_trusted_origins))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    if status.is_server_error() {
                        tracing::error!(%status, ?latency, "response");
                    } else {
                        tracing::info!(%status, ?latency, "response");
                    }
                }),
        )
        .layer(from_fn_with_state(state.clone(), metrics::track))
        .with_state(state)
}

/// Serves until SIGINT/SIGTERM, then drains for up to [`SHUTDOWN_GRACE`].
pub async fn serve(app: Router, addr: SocketAddr, env: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, env, "starting server");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = stop_rx.await;
        })
        .await
    });

    tokio::select! {
        joined = &mut server => {
            joined??;
            return Ok(());
        }
        signal = shutdown_signal() => info!(signal, "shutting down server"),
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(grace = ?SHUTDOWN_GRACE, "requests still in flight, forcing shutdown"),
    }

    info!(%addr, "stopped server");
    Ok(())
}

async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
