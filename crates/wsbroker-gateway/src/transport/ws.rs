//! Per-connection session loop.
//!
//! Responsibilities:
//! - Read the upgrade request off the raw stream and answer the handshake
//! - Own the `Session` for the lifetime of the connection
//! - Control frames: close -> normal-closure reply + force-close, ping -> empty
//!   pong, pong -> ignored
//! - Data frames carry broker commands; replies go to this session only
//! - On termination: force-close and deregister from the broker
//!
//! The loop is an explicit `Handshaking -> FrameLoop -> Terminated` machine so
//! teardown runs exactly once, on the single edge out of `FrameLoop`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::Instrument;

use wsbroker_core::error::{Result, WsBrokerError};
use wsbroker_core::protocol::close::CloseCode;
use wsbroker_core::protocol::frame::{Frame, Opcode};

use crate::app_state::AppState;
use crate::transport::handshake::{perform_handshake, read_request_head, write_http_error};
use crate::transport::session::{Session, SessionId};

const FRAGMENTED_REPLY: &str = "Error parsing command: fragmented messages are not supported";

enum LoopState<S> {
    Handshaking(BufReader<S>),
    FrameLoop(Session<BufReader<S>>),
    Terminated,
}

enum Step {
    Continue,
    Stop,
}

/// Serve one accepted connection to completion, inside a `session` span.
pub async fn serve_connection<S>(app: AppState, stream: S, peer: String)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = app.broker().next_session_id();
    let span = tracing::info_span!("session", session_id = id, peer = %peer);
    run_connection(app, id, stream).instrument(span).await;
}

/// Drive the connection state machine until `Terminated`.
pub async fn run_connection<S>(app: AppState, id: SessionId, stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let idle = (app.cfg().session.idle_timeout_ms > 0)
        .then(|| Duration::from_millis(app.cfg().session.idle_timeout_ms));

    let mut state = LoopState::Handshaking(BufReader::new(stream));
    loop {
        state = match state {
            LoopState::Handshaking(reader) => handshake(&app, id, reader).await,
            LoopState::FrameLoop(mut session) => match next_frame(&app, &mut session, idle).await {
                Step::Continue => LoopState::FrameLoop(session),
                Step::Stop => {
                    terminate(&app, session).await;
                    LoopState::Terminated
                }
            },
            LoopState::Terminated => break,
        };
    }
}

async fn handshake<S>(app: &AppState, id: SessionId, mut reader: BufReader<S>) -> LoopState<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let metrics = app.metrics();
    let gw = &app.cfg().gateway;

    let rejected = match read_request_head(&mut reader, gw.max_header_bytes).await {
        Err(e) => Some(("400 Bad Request", e)),
        Ok(_) if app.is_draining() => Some((
            "503 Service Unavailable",
            WsBrokerError::BadRequest("server is draining".into()),
        )),
        Ok(head) if head.route() != gw.path => Some((
            "404 Not Found",
            WsBrokerError::NotFound(format!("no websocket endpoint at {}", head.route())),
        )),
        // Frame bytes pipelined behind the head stay in the BufReader.
        Ok(head) => perform_handshake(&head, reader.get_mut())
            .await
            .err()
            .map(|e| ("400 Bad Request", e)),
    };

    if let Some((status, err)) = rejected {
        metrics
            .handshake_rejections
            .inc(&[("reason", err.client_code().as_str())]);
        tracing::info!(status, error = %err, "handshake rejected");
        if let Err(e) = write_http_error(reader.get_mut(), status, &err.to_string()).await {
            tracing::debug!(error = %e, "failed to write rejection");
        }
        return LoopState::Terminated;
    }

    let session = Session::new(id, reader, app.session_opts());
    app.broker().register(session.handle().clone());
    metrics.ws_upgrades.inc(&[]);
    metrics.sessions_active.inc(&[]);
    tracing::info!("session opened");
    LoopState::FrameLoop(session)
}

/// `None` when the idle limit elapsed before a full frame arrived.
async fn read_with_idle<S>(session: &mut Session<S>, idle: Option<Duration>) -> Option<Result<Frame>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    match idle {
        Some(limit) => tokio::time::timeout(limit, session.read_frame()).await.ok(),
        None => Some(session.read_frame().await),
    }
}

async fn next_frame<S>(app: &AppState, session: &mut Session<S>, idle: Option<Duration>) -> Step
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let metrics = app.metrics();

    let frame = match read_with_idle(session, idle).await {
        None => {
            tracing::info!("idle timeout");
            if let Err(e) = session.handle().try_send_close(CloseCode::GOING_AWAY) {
                tracing::debug!(error = %e, "close frame not queued");
            }
            return Step::Stop;
        }
        Some(Ok(frame)) => frame,
        Some(Err(WsBrokerError::Closed)) => return Step::Stop,
        Some(Err(e)) => {
            metrics
                .decode_errors
                .inc(&[("code", e.client_code().as_str())]);
            match e {
                WsBrokerError::TruncatedStream(_) => tracing::debug!(error = %e, "peer went away"),
                _ => tracing::warn!(error = %e, "read failed"),
            }
            return Step::Stop;
        }
    };

    let opcode = frame.opcode();
    metrics.frames_in.inc(&[("opcode", opcode.as_str())]);

    let reply = match opcode {
        Opcode::Close => {
            tracing::debug!("close frame received");
            if let Err(e) = session.send_close(CloseCode::NORMAL_CLOSURE).await {
                tracing::debug!(error = %e, "close reply not queued");
            }
            session.force_close();
            return Step::Stop;
        }
        Opcode::Ping => Frame::pong(),
        Opcode::Pong => return Step::Continue,
        Opcode::Continuation => Frame::text(FRAGMENTED_REPLY),
        Opcode::Text | Opcode::Binary if !frame.header.fin => Frame::text(FRAGMENTED_REPLY),
        Opcode::Text | Opcode::Binary => {
            let text = app
                .dispatcher()
                .dispatch_payload(session.id(), &frame.payload)
                .await;
            Frame::text(text)
        }
    };

    match session.send_frame(reply).await {
        Ok(()) => Step::Continue,
        Err(WsBrokerError::Closed) => Step::Stop,
        Err(e) => {
            tracing::warn!(error = %e, "reply dropped");
            Step::Continue
        }
    }
}

async fn terminate<S>(app: &AppState, session: Session<S>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    session.force_close();
    let removed = app.broker().remove_session(session.id());
    session.shutdown().await;
    app.metrics().sessions_active.dec(&[]);
    tracing::info!(topic_entries = removed, "session closed");
}
