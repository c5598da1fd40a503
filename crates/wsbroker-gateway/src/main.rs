//! wsBroker gateway binary.
//!
//! - WebSocket endpoint on `gateway.listen` (raw TCP, path `gateway.path`)
//! - Ops endpoints on `ops.listen`: /healthz, /readyz, /metrics
//! - Ctrl-C: mark draining, stop accepting, send 1001 to every session, wait
//!   for them to close (bounded), then stop the ops server

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use wsbroker_core::error::{Result, WsBrokerError};
use wsbroker_core::protocol::close::CloseCode;
use wsbroker_gateway::{app_state::AppState, config, router, transport::listener};

const DRAIN_GRACE: Duration = Duration::from_secs(5);

fn parse_addr(value: &str, field: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| WsBrokerError::Config(format!("{field} must be a socket address: {e}")))
}

async fn wait_drained(state: &AppState, grace: Duration) -> bool {
    let broker = state.broker();
    let drained = async {
        while broker.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::time::timeout(grace, drained).await.is_ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = config::load_default()?;
    let ws_addr = parse_addr(&cfg.gateway.listen, "gateway.listen")?;
    let ops_addr = parse_addr(&cfg.ops.listen, "ops.listen")?;

    let state = AppState::new(cfg);
    let ws_listener = TcpListener::bind(ws_addr).await?;
    let ops_listener = TcpListener::bind(ops_addr).await?;
    tracing::info!(%ws_addr, %ops_addr, "wsbroker-gateway starting");

    let (accept_stop, accept_rx) = watch::channel(false);
    let (ops_stop, mut ops_rx) = watch::channel(false);

    let ws_task = tokio::spawn(listener::serve(state.clone(), ws_listener, accept_rx));
    let ops_app = router::build_ops_router(state.clone());
    let ops_task = tokio::spawn(async move {
        axum::serve(ops_listener, ops_app)
            .with_graceful_shutdown(async move {
                let _ = ops_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining");
    state.set_draining();
    let _ = accept_stop.send(true);

    let notified = state.broker().close_all(CloseCode::GOING_AWAY);
    let drained = wait_drained(&state, DRAIN_GRACE).await;
    tracing::info!(notified, drained, remaining = state.broker().session_count(), "sessions drained");

    let _ = ops_stop.send(true);

    ws_task
        .await
        .map_err(|e| WsBrokerError::Internal(format!("listener task: {e}")))??;
    ops_task
        .await
        .map_err(|e| WsBrokerError::Internal(format!("ops task: {e}")))??;

    tracing::info!("wsbroker-gateway stopped");
    Ok(())
}
