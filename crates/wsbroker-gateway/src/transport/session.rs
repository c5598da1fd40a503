//! Connection session: one hijacked stream, one reader, one writer task.
//!
//! Lifecycle (`SessionState`, held in a `watch` channel):
//! - `Open`: sends are accepted and reads are attempted
//! - `Closing`: a close frame was queued; further sends are rejected
//! - `Closed`: the writer drains what is already queued (for at most
//!   `CLOSE_GRACE`), then releases the stream
//!
//! A write error moves the session to `Closing`; it reaches `Closed` once the
//! writer has let go of the stream.
//!
//! Every outbound frame goes through the bounded queue; the writer task is the
//! only code that touches the write half, so frames are written whole and in
//! enqueue order no matter how many producers there are.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use wsbroker_core::error::{Result, WsBrokerError};
use wsbroker_core::protocol::frame::{Frame, Opcode};

use crate::config::{Backpressure, SessionSection};
use crate::transport::codec;

/// How long a closed session's writer may keep flushing frames queued before
/// the close. A peer that stops reading cannot hold the stream past this.
pub const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Process-unique session identifier (assigned by the broker registry).
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// Per-session knobs resolved from `session:` config.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub queue_capacity: usize,
    pub max_payload: u64,
    pub backpressure: Backpressure,
    pub enqueue_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl SessionOptions {
    pub fn from_config(cfg: &SessionSection) -> Self {
        Self {
            queue_capacity: cfg.outbound_queue.max(1),
            max_payload: cfg.max_payload_bytes,
            backpressure: cfg.backpressure,
            enqueue_timeout: millis(cfg.enqueue_timeout_ms),
            write_timeout: millis(cfg.write_timeout_ms),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&SessionSection::default())
    }
}

async fn until_not_open(rx: &mut watch::Receiver<SessionState>) {
    let _ = rx.wait_for(|s| *s != SessionState::Open).await;
}

async fn until_closed(rx: &mut watch::Receiver<SessionState>) {
    let _ = rx.wait_for(|s| *s == SessionState::Closed).await;
}

/// Resolves `grace` after the session reaches `Closed`.
async fn release_after_close(mut rx: watch::Receiver<SessionState>, grace: Duration) {
    until_closed(&mut rx).await;
    tokio::time::sleep(grace).await;
}

/// `Open -> Closing`; no-op from any other state.
fn mark_closing(state: &watch::Sender<SessionState>) -> bool {
    state.send_if_modified(|s| {
        if *s == SessionState::Open {
            *s = SessionState::Closing;
            true
        } else {
            false
        }
    })
}

/// Any state -> `Closed`. Returns the state left behind, or `None` when the
/// session was already closed.
fn mark_closed(state: &watch::Sender<SessionState>) -> Option<SessionState> {
    let mut prev = None;
    state.send_if_modified(|s| {
        if *s == SessionState::Closed {
            false
        } else {
            prev = Some(*s);
            *s = SessionState::Closed;
            true
        }
    });
    prev
}

/// Cloneable producer side of a session: the queue sender plus its lifecycle.
///
/// Holding a handle does not keep the stream alive; once the session closes,
/// every send fails with `Closed`.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::Sender<Frame>,
    state: Arc<watch::Sender<SessionState>>,
    backpressure: Backpressure,
    enqueue_timeout: Option<Duration>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Queue a frame for the writer. Only accepted while `Open`.
    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        if !self.is_open() {
            return Err(WsBrokerError::Closed);
        }
        self.enqueue(frame).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_frame(Frame::text(text)).await
    }

    /// Queue a close frame carrying `code`, then move to `Closing`.
    pub async fn send_close(&self, code: u16) -> Result<()> {
        if !self.is_open() {
            return Err(WsBrokerError::Closed);
        }
        let res = self.enqueue(Frame::close(code)).await;
        self.begin_closing();
        res
    }

    /// Non-blocking `send_close`, for teardown paths that must not wait on a
    /// slow peer.
    pub fn try_send_close(&self, code: u16) -> Result<()> {
        if !self.is_open() {
            return Err(WsBrokerError::Closed);
        }
        let res = self.tx.try_send(Frame::close(code)).map_err(map_try_send);
        self.begin_closing();
        res
    }

    /// Stop the writer and release the stream. Returns `false` when the
    /// session was already closed.
    pub fn force_close(&self) -> bool {
        match mark_closed(&self.state) {
            Some(prev) => {
                tracing::debug!(session_id = self.id, from = prev.as_str(), "session force-closed");
                true
            }
            None => false,
        }
    }

    /// Resolves once the session reaches `Closed`.
    pub async fn closed(&self) {
        until_closed(&mut self.state.subscribe()).await;
    }

    fn begin_closing(&self) -> bool {
        mark_closing(&self.state)
    }

    async fn enqueue(&self, frame: Frame) -> Result<()> {
        match self.backpressure {
            Backpressure::Block => match self.enqueue_timeout {
                Some(limit) => timeout(limit, self.send_while_open(frame))
                    .await
                    .map_err(|_| WsBrokerError::QueueFull)?,
                None => self.send_while_open(frame).await,
            },
            Backpressure::Drop => self.tx.try_send(frame).map_err(map_try_send),
        }
    }

    /// Wait for queue space, giving up as soon as the session leaves `Open`.
    async fn send_while_open(&self, frame: Frame) -> Result<()> {
        let mut state_rx = self.state.subscribe();
        tokio::select! {
            biased;
            res = self.tx.send(frame) => res.map_err(|_| WsBrokerError::Closed),
            _ = until_not_open(&mut state_rx) => Err(WsBrokerError::Closed),
        }
    }
}

fn map_try_send(e: mpsc::error::TrySendError<Frame>) -> WsBrokerError {
    match e {
        mpsc::error::TrySendError::Full(_) => WsBrokerError::QueueFull,
        mpsc::error::TrySendError::Closed(_) => WsBrokerError::Closed,
    }
}

/// Owner of one hijacked stream.
pub struct Session<S> {
    handle: SessionHandle,
    reader: BufReader<ReadHalf<S>>,
    max_payload: u64,
    writer: Option<JoinHandle<()>>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Take ownership of `stream` and start its writer task.
    pub fn new(id: SessionId, stream: S, opts: &SessionOptions) -> Self {
        let (rd, wr) = split(stream);
        let (tx, rx) = mpsc::channel(opts.queue_capacity.max(1));
        let (state_tx, _) = watch::channel(SessionState::Open);
        let state = Arc::new(state_tx);

        let writer = tokio::spawn(write_loop(
            id,
            BufWriter::new(wr),
            rx,
            Arc::clone(&state),
            opts.write_timeout,
        ));

        Self {
            handle: SessionHandle {
                id,
                tx,
                state,
                backpressure: opts.backpressure,
                enqueue_timeout: opts.enqueue_timeout,
            },
            reader: BufReader::new(rd),
            max_payload: opts.max_payload,
            writer: Some(writer),
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Producer handle for the broker and other senders.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Read one frame. Any failure closes the session (with a close frame
    /// first when the error carries a status code).
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let mut state_rx = self.handle.state.subscribe();
        if *state_rx.borrow() != SessionState::Open {
            return Err(WsBrokerError::Closed);
        }

        let res = tokio::select! {
            res = codec::read_frame(&mut self.reader, self.max_payload) => res,
            _ = until_not_open(&mut state_rx) => Err(WsBrokerError::Closed),
        };

        if let Err(e) = &res {
            self.fail(e);
        }
        res
    }

    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        self.handle.send_frame(frame).await
    }

    pub async fn send_close(&self, code: u16) -> Result<()> {
        self.handle.send_close(code).await
    }

    /// Idempotent.
    pub fn force_close(&self) {
        self.handle.force_close();
    }

    /// Force-close and wait for the writer to release the stream.
    pub async fn shutdown(mut self) {
        self.handle.force_close();
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                tracing::warn!(session_id = self.handle.id, error = %e, "writer task failed");
            }
        }
    }

    fn fail(&self, err: &WsBrokerError) {
        if let Some(code) = err.close_code() {
            if let Err(e) = self.handle.try_send_close(code) {
                tracing::debug!(session_id = self.handle.id, error = %e, "close frame not queued");
            }
        }
        self.handle.force_close();
    }
}

impl<S> Drop for Session<S> {
    fn drop(&mut self) {
        self.handle.force_close();
    }
}

async fn write_with_deadline<W>(writer: &mut W, frame: &Frame, limit: Option<Duration>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match limit {
        Some(limit) => timeout(limit, codec::write_frame(writer, frame))
            .await
            .map_err(|_| WsBrokerError::Io(std::io::ErrorKind::TimedOut.into()))?,
        None => codec::write_frame(writer, frame).await,
    }
}

/// Sole consumer of the outbound queue.
async fn write_loop<W>(
    id: SessionId,
    mut writer: W,
    mut rx: mpsc::Receiver<Frame>,
    state: Arc<watch::Sender<SessionState>>,
    write_timeout: Option<Duration>,
) where
    W: AsyncWrite + Unpin,
{
    let mut state_rx = state.subscribe();
    let release = release_after_close(state.subscribe(), CLOSE_GRACE);
    tokio::pin!(release);
    let mut released = false;

    loop {
        // Drain queued frames before honoring `Closed`.
        let frame = tokio::select! {
            biased;
            maybe = rx.recv() => match maybe {
                Some(frame) => frame,
                None => break,
            },
            _ = until_closed(&mut state_rx) => break,
        };

        let res = tokio::select! {
            res = write_with_deadline(&mut writer, &frame, write_timeout) => res,
            _ = &mut release => {
                released = true;
                break;
            }
        };
        if let Err(e) = res {
            tracing::warn!(session_id = id, error = %e, "write failed, closing session");
            mark_closing(&state);
            break;
        }
        if frame.opcode() == Opcode::Close {
            tracing::debug!(session_id = id, "close frame written");
        }
    }

    rx.close();
    if released {
        tracing::debug!(session_id = id, "peer not draining, dropping stream");
    } else {
        match timeout(CLOSE_GRACE, writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(session_id = id, error = %e, "stream shutdown failed"),
            Err(_) => tracing::debug!(session_id = id, "stream shutdown timed out"),
        }
    }
    drop(writer);

    let prev = mark_closed(&state);
    tracing::debug!(
        session_id = id,
        from = prev.unwrap_or(SessionState::Closed).as_str(),
        "writer stopped"
    );
}
