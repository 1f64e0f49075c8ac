//! One framed connection over a raw byte stream.
//!
//! A spawned task owns the stream's read half, the frame decoder, the
//! heartbeat timer and the idle clock. A second task owns the write half and
//! drains the outbound queue. The [`Connection`] handle only enqueues frames
//! and requests close; everything the peer does comes back as a
//! [`ConnectionEvent`].

use super::TransportConfig;
use crate::error::{Error, Result};
use crate::protocol::{Delivery, Frame, FrameDecoder, FrameLimits, Outgoing};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Size of each read from the raw stream.
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Floor for the heartbeat period; a zero period would panic the timer.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle state of a connection. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Dialing or negotiating with a proxy.
    Connecting = 0,
    /// Frames may be sent and received.
    Open = 1,
    /// Stream destroyed, timers cancelled.
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// Why a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called on this side.
    Local,
    /// The peer closed the stream.
    Remote,
    /// Nothing was received for longer than the idle timeout.
    IdleTimeout,
    /// A decode, protocol or stream error; reported just before closing.
    Error,
}

/// Events emitted by a connection, in order.
///
/// `Open` is always first and `Closed` always last; `Closed` is sent exactly
/// once.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The connection is open.
    Open,
    /// A BINARY or MESSAGE frame arrived.
    Message(Delivery),
    /// The outbound queue emptied after `send` reported backpressure.
    Drained,
    /// A fatal error; `Closed` follows.
    Error(Error),
    /// The connection closed.
    Closed(CloseReason),
}

/// Result of queueing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Queued while unflushed bytes stay under the high-water mark.
    Flushed,
    /// Queued, but this many bytes are now waiting to be written. A
    /// [`ConnectionEvent::Drained`] follows once the queue empties.
    Pending(usize),
}

/// Receiving side of a connection's events.
#[derive(Debug)]
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionEvents {
    /// Next event, or `None` after `Closed` has been received.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }
}

/// State shared between the handle and the connection's tasks.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    buffered: AtomicUsize,
    backpressured: AtomicBool,
    close: Notify,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Subtract flushed bytes; returns the new estimate.
    fn flushed(&self, len: usize) -> usize {
        let previous = self
            .buffered
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| {
                Some(b.saturating_sub(len))
            })
            .unwrap_or(0);
        previous.saturating_sub(len)
    }
}

/// Handle to an open connection.
///
/// Cloning is cheap; every clone drives the same connection.
#[derive(Debug, Clone)]
pub struct Connection {
    peer: Arc<str>,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    limits: FrameLimits,
    high_water_mark: usize,
}

impl Connection {
    /// Wrap an established raw stream and start its tasks.
    ///
    /// Must be called from within a tokio runtime. The connection is `Open`
    /// when this returns. A zero `heartbeat_interval` is raised to 1ms here;
    /// [`TransportConfig::validate`] rejects it outright.
    pub fn open<S>(stream: S, peer: impl Into<String>, config: &TransportConfig) -> (Self, ConnectionEvents)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer: Arc<str> = Arc::from(peer.into());
        let shared = Arc::new(Shared {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            buffered: AtomicUsize::new(0),
            backpressured: AtomicBool::new(false),
            close: Notify::new(),
        });
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let (reader, writer) = tokio::io::split(stream);

        shared
            .state
            .store(ConnectionState::Open as u8, Ordering::SeqCst);
        let _ = event_tx.send(ConnectionEvent::Open);
        info!(peer = %peer, "Connection open");

        let writer_task = tokio::spawn(write_loop(
            writer,
            outbound_rx,
            shared.clone(),
            event_tx.clone(),
        ));

        tokio::spawn(read_loop(
            reader,
            writer_task,
            outbound_tx.clone(),
            shared.clone(),
            event_tx,
            peer.clone(),
            LoopConfig::from(config),
        ));

        let connection = Self {
            peer,
            shared,
            outbound: outbound_tx,
            limits: config.limits,
            high_water_mark: config.write_high_water_mark,
        };
        (connection, ConnectionEvents { rx: event_rx })
    }

    /// Send data to the peer.
    ///
    /// Bytes go out as a BINARY frame, anything else JSON-encoded as a
    /// MESSAGE frame. Never waits for the socket.
    pub fn send(&self, data: impl Into<Outgoing>) -> Result<WriteOutcome> {
        if self.state() != ConnectionState::Open {
            return Err(Error::NotOpen);
        }

        let frame = data.into().into_frame()?;
        if frame.payload.len() > self.limits.max_payload_bytes {
            return Err(Error::LimitExceeded(format!(
                "payload of {} bytes exceeds limit {}",
                frame.payload.len(),
                self.limits.max_payload_bytes
            )));
        }
        let bytes = frame.to_bytes()?;
        let len = bytes.len();

        let buffered = self.shared.buffered.fetch_add(len, Ordering::SeqCst) + len;
        if self.outbound.send(bytes).is_err() {
            self.shared.flushed(len);
            return Err(Error::NotOpen);
        }

        if buffered > self.high_water_mark {
            self.shared.backpressured.store(true, Ordering::SeqCst);
            Ok(WriteOutcome::Pending(buffered))
        } else {
            Ok(WriteOutcome::Flushed)
        }
    }

    /// JSON-encode a serializable value and send it as a MESSAGE frame.
    pub fn send_json<T: serde::Serialize + ?Sized>(&self, value: &T) -> Result<WriteOutcome> {
        self.send(Outgoing::json(value)?)
    }

    /// Close the connection. Safe to call more than once.
    pub fn close(&self) {
        let previous = self
            .shared
            .state
            .swap(ConnectionState::Closed as u8, Ordering::SeqCst);
        if ConnectionState::from_u8(previous) != ConnectionState::Closed {
            debug!(peer = %self.peer, "Close requested");
            self.shared.close.notify_one();
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether frames may be sent.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Estimated bytes queued but not yet flushed to the stream.
    pub fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::SeqCst)
    }

    /// Label of the remote end (`host:port`).
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Timing and limits the read loop needs.
#[derive(Debug, Clone, Copy)]
struct LoopConfig {
    heartbeat_interval: Duration,
    idle_timeout: Duration,
    limits: FrameLimits,
}

impl From<&TransportConfig> for LoopConfig {
    fn from(config: &TransportConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            idle_timeout: config.idle_timeout,
            limits: config.limits,
        }
    }
}

async fn read_loop<S>(
    mut reader: ReadHalf<S>,
    mut writer_task: tokio::task::JoinHandle<Result<()>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    peer: Arc<str>,
    config: LoopConfig,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut decoder = FrameDecoder::new(config.limits);
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut last_seen = Instant::now();

    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            _ = shared.close.notified() => break CloseReason::Local,

            read = reader.read(&mut buf) => match read {
                Ok(0) => break CloseReason::Remote,
                Ok(n) => {
                    last_seen = Instant::now();
                    match deliver(&mut decoder, &buf[..n], &events) {
                        Ok(()) => {}
                        Err(e) => {
                            warn!(peer = %peer, error = %e, "Dropping connection after decode error");
                            let _ = events.send(ConnectionEvent::Error(e));
                            break CloseReason::Error;
                        }
                    }
                }
                Err(e) => {
                    debug!(peer = %peer, error = %e, "Read failed");
                    let _ = events.send(ConnectionEvent::Error(Error::Io(e)));
                    break CloseReason::Error;
                }
            },

            written = &mut writer_task => {
                let e = match written {
                    Ok(Err(e)) => e,
                    Ok(Ok(())) => Error::NotOpen,
                    Err(join) => Error::Io(std::io::Error::other(join.to_string())),
                };
                debug!(peer = %peer, error = %e, "Write failed");
                let _ = events.send(ConnectionEvent::Error(e));
                break CloseReason::Error;
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > config.idle_timeout {
                    warn!(peer = %peer, idle_ms = last_seen.elapsed().as_millis() as u64, "Peer idle, closing");
                    break CloseReason::IdleTimeout;
                }
                match Frame::heartbeat().to_bytes() {
                    Ok(bytes) => {
                        shared.buffered.fetch_add(bytes.len(), Ordering::SeqCst);
                        let _ = outbound.send(bytes);
                    }
                    Err(e) => warn!(error = %e, "Failed to encode heartbeat"),
                }
            }
        }
    };

    // The write half goes with the task; dropping both halves destroys the stream.
    writer_task.abort();
    shared
        .state
        .store(ConnectionState::Closed as u8, Ordering::SeqCst);
    shared.buffered.store(0, Ordering::SeqCst);

    info!(peer = %peer, reason = ?reason, "Connection closed");
    let _ = events.send(ConnectionEvent::Closed(reason));
}

fn deliver(
    decoder: &mut FrameDecoder,
    chunk: &[u8],
    events: &mpsc::UnboundedSender<ConnectionEvent>,
) -> Result<()> {
    for frame in decoder.push(chunk)? {
        if let Some(delivery) = Delivery::from_frame(frame)? {
            let _ = events.send(ConnectionEvent::Message(delivery));
        }
    }
    Ok(())
}

async fn write_loop<S>(
    mut writer: WriteHalf<S>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    while let Some(bytes) = outbound.recv().await {
        writer.write_all(&bytes).await?;
        writer.flush().await?;

        if shared.flushed(bytes.len()) == 0 && shared.backpressured.swap(false, Ordering::SeqCst) {
            let _ = events.send(ConnectionEvent::Drained);
        }
    }
    Ok(())
}
