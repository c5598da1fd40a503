//! Raw TCP accept loop for the WebSocket endpoint.
//!
//! Connections are never routed through an HTTP framework: each accepted
//! socket goes straight to `ws::serve_connection`, which reads the request
//! head itself and keeps the stream for the frame layer.

use tokio::net::TcpListener;
use tokio::sync::watch;

use wsbroker_core::error::Result;

use crate::app_state::AppState;
use crate::transport::ws;

async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Accept until `shutdown` flips to `true`. Connections already running are
/// left to finish on their own.
pub async fn serve(
    app: AppState,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(%local, path = %app.cfg().gateway.path, "accepting websocket connections");

    loop {
        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = stopped(&mut shutdown) => break,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "set_nodelay failed");
        }

        tokio::spawn(ws::serve_connection(app.clone(), stream, peer.to_string()));
    }

    tracing::info!("listener stopped");
    Ok(())
}
