/*!
 * Framed Transport
 *
 * Owns one connected stream, one send arena and one receive arena. Frames
 * are read in two phases (length prefix, then body) by a single receive task
 * and written one at a time under the writer lock. Completion is reported
 * through the event channel handed back by [`Transport::new`].
 */

use super::codec::encode_header;
use super::state::{ReceiveAction, ReceiveMachine};
use super::types::{CloseReason, ReceivePhase, TransportError, TransportEvent};
use crate::arena::{ReserveSize, Segment, SegmentArena};
use crate::core::config::TransportConfig;
use crate::core::limits::HEADER_BYTES;
use crate::packet::Envelope;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Length-prefixed transport over one connected stream
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    peer: Option<SocketAddr>,
    send_arena: SegmentArena,
    receive_arena: SegmentArena,
    reader: parking_lot::Mutex<Option<BoxedReader>>,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    machine: parking_lot::Mutex<ReceiveMachine>,
    connected: AtomicBool,
    disconnect_emitted: AtomicBool,
    shutdown: watch::Sender<bool>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Transport {
    /// Wrap an already-connected stream
    pub fn new<S>(
        stream: S,
        config: &TransportConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_peer(stream, config, None)
    }

    /// Hand a connected TCP stream to a new transport
    pub fn from_tcp(
        stream: TcpStream,
        config: &TransportConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        stream.set_nodelay(config.nodelay)?;
        let peer = stream.peer_addr().ok();
        Self::with_peer(stream, config, peer)
    }

    fn with_peer<S>(
        stream: S,
        config: &TransportConfig,
        peer: Option<SocketAddr>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let send_arena = SegmentArena::from_config(&config.send_arena)?;
        let receive_arena = SegmentArena::from_config(&config.receive_arena)?;
        let max_frame_len = receive_arena.segment_size();

        let (reader, writer) = tokio::io::split(stream);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        info!(
            peer = ?peer,
            send_segments = send_arena.segment_count(),
            receive_segments = receive_arena.segment_count(),
            "Transport created"
        );

        let transport = Self {
            inner: Arc::new(TransportInner {
                peer,
                send_arena,
                receive_arena,
                reader: parking_lot::Mutex::new(Some(Box::new(reader))),
                writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
                machine: parking_lot::Mutex::new(ReceiveMachine::new(max_frame_len)),
                connected: AtomicBool::new(true),
                disconnect_emitted: AtomicBool::new(false),
                shutdown,
                events: events_tx,
            }),
        };

        Ok((transport, events_rx))
    }

    #[inline]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    #[inline]
    pub fn receive_phase(&self) -> ReceivePhase {
        self.inner.machine.lock().phase()
    }

    #[inline]
    pub fn send_arena(&self) -> &SegmentArena {
        &self.inner.send_arena
    }

    #[inline]
    pub fn receive_arena(&self) -> &SegmentArena {
        &self.inner.receive_arena
    }

    /// Spawn the receive loop. Frames arrive as [`TransportEvent::PacketReceived`]
    /// and the loop re-arms itself after each one while the connection lives.
    pub fn start_receiving(&self) -> Result<JoinHandle<()>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        let reader = self
            .inner
            .reader
            .lock()
            .take()
            .ok_or(TransportError::AlreadyReceiving)?;

        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move { inner.receive_loop(reader).await }))
    }

    /// Reserve a framed segment from the send arena
    pub fn reserve_send(&self) -> Result<Segment, TransportError> {
        Ok(self.inner.send_arena.reserve(ReserveSize::Framed)?)
    }

    /// Send `payload_len` bytes already written after the header slot of
    /// `segment`. The segment is released once the write finishes, whether it
    /// succeeded or not. Returns the bytes put on the wire.
    pub async fn send(&self, mut segment: Segment, payload_len: usize) -> Result<usize, TransportError> {
        if !segment.arena().same_arena(&self.inner.send_arena) {
            warn!(index = segment.index(), "Send with segment from a foreign arena");
        }
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        let index = segment.index();
        let frame = segment.view_for(payload_len)?;
        encode_header(frame)?;
        let frame_len = frame.len();

        let written = self.inner.write_frame(frame).await;
        if let Err(e) = segment.release() {
            warn!(index = index, error = %e, "Send segment release failed");
        }

        match written {
            Ok(()) => {
                trace!(index = index, bytes = frame_len, "Frame sent");
                let _ = self.inner.events.send(TransportEvent::PacketSent { bytes: frame_len });
                Ok(frame_len)
            }
            Err(e) => {
                warn!(peer = ?self.inner.peer, error = %e, "Send failed");
                let reason = match &e {
                    TransportError::Io(io) => CloseReason::Io(io.to_string()),
                    _ => CloseReason::LocalShutdown,
                };
                self.inner.close(reason).await;
                Err(e)
            }
        }
    }

    /// Send a serialized packet
    pub async fn send_envelope(&self, envelope: Envelope) -> Result<usize, TransportError> {
        let (segment, size_used) = envelope.into_parts();
        self.send(segment, size_used).await
    }

    /// Shut the connection down. Idempotent; the first call emits
    /// [`TransportEvent::Disconnected`].
    pub async fn disconnect(&self) {
        self.inner.close(CloseReason::LocalShutdown).await;
    }
}

impl TransportInner {
    #[inline]
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Write one frame; a concurrent close aborts the write
    async fn write_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return Err(TransportError::ConnectionClosed);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::ConnectionClosed)?;
        tokio::select! {
            written = async {
                writer.write_all(frame).await?;
                writer.flush().await
            } => Ok(written?),
            _ = shutdown.changed() => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&self, reason: CloseReason) {
        self.connected.store(false, Ordering::Release);
        self.machine.lock().disconnect();
        self.shutdown.send_replace(true);

        if !self.disconnect_emitted.swap(true, Ordering::AcqRel) {
            info!(peer = ?self.peer, reason = ?reason, "Transport disconnected");
            let _ = self.events.send(TransportEvent::Disconnected { reason });
        }

        // A blocked write sees the shutdown signal and gives the lock back
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Write half shutdown failed");
            }
        }
    }

    async fn receive_loop(self: Arc<Self>, mut reader: BoxedReader) {
        let mut shutdown = self.shutdown.subscribe();
        debug!(peer = ?self.peer, "Receive loop started");

        let reason = loop {
            if !self.is_connected() {
                break CloseReason::LocalShutdown;
            }

            match self.next_frame(&mut reader, &mut shutdown).await {
                Ok((segment, len)) => {
                    trace!(index = segment.index(), len = len, "Frame received");
                    if self
                        .events
                        .send(TransportEvent::PacketReceived { segment, len })
                        .is_err()
                    {
                        break CloseReason::EventsDropped;
                    }
                }
                Err(reason) => break reason,
            }
        };

        drop(reader);
        self.close(reason).await;
        debug!(peer = ?self.peer, "Receive loop stopped");
    }

    /// Drive the state machine through one frame
    async fn next_frame(
        &self,
        reader: &mut BoxedReader,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(Segment, usize), CloseReason> {
        let armed = self.machine.lock().arm();
        let mut action = armed.map_err(|_| CloseReason::LocalShutdown)?;

        loop {
            match action {
                ReceiveAction::ReadHeader => {
                    let mut header = self.reserve_receive(HEADER_BYTES, shutdown).await?;
                    let transferred = read_full(reader, &mut header, shutdown).await?;
                    action = self.machine.lock().complete(transferred, &header[..transferred]);
                    drop(header);
                }
                ReceiveAction::ReadBody(len) => {
                    let mut body = self.reserve_receive(len, shutdown).await?;
                    let transferred = read_full(reader, &mut body, shutdown).await?;
                    let next = self.machine.lock().complete(transferred, &body[..transferred]);
                    match next {
                        ReceiveAction::Deliver(len) => return Ok((body, len)),
                        other => action = other,
                    }
                }
                ReceiveAction::Deliver(len) => {
                    let body = self.reserve_receive(len, shutdown).await?;
                    return Ok((body, len));
                }
                ReceiveAction::Close(reason) => return Err(reason),
            }
        }
    }

    /// Reserve from the receive arena, pausing reads while it is full
    async fn reserve_receive(
        &self,
        len: usize,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Segment, CloseReason> {
        match self.receive_arena.reserve(ReserveSize::Exact(len)) {
            Ok(segment) => return Ok(segment),
            Err(e) if e.is_full() => {
                warn!(peer = ?self.peer, "Receive arena full; pausing reads until a frame is released");
            }
            Err(e) => return Err(CloseReason::Io(e.to_string())),
        }

        tokio::select! {
            reserved = self.receive_arena.reserve_wait(ReserveSize::Exact(len)) => {
                reserved.map_err(|e| CloseReason::Io(e.to_string()))
            }
            _ = shutdown.changed() => Err(CloseReason::LocalShutdown),
        }
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read.
/// An empty `buf` reads nothing.
async fn read_full(
    reader: &mut BoxedReader,
    buf: &mut [u8],
    shutdown: &mut watch::Receiver<bool>,
) -> Result<usize, CloseReason> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = tokio::select! {
            read = reader.read(&mut buf[filled..]) => read.map_err(|e| CloseReason::Io(e.to_string()))?,
            _ = shutdown.changed() => return Err(CloseReason::LocalShutdown),
        };
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.inner.peer)
            .field("connected", &self.is_connected())
            .field("phase", &self.receive_phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ArenaConfig;

    fn config() -> TransportConfig {
        TransportConfig::symmetric(ArenaConfig::new(1024, 64))
    }

    #[tokio::test]
    async fn test_send_writes_length_prefix() {
        let (local, mut remote) = tokio::io::duplex(256);
        let (transport, _events) = Transport::new(local, &config()).unwrap();

        let mut segment = transport.reserve_send().unwrap();
        segment[..4].copy_from_slice(b"ping");
        assert_eq!(transport.send(segment, 4).await.unwrap(), 6);

        let mut wire = [0u8; 6];
        remote.read_exact(&mut wire).await.unwrap();
        assert_eq!(&wire, &[4, 0, b'p', b'i', b'n', b'g']);
    }

    #[tokio::test]
    async fn test_send_releases_segment_after_write() {
        let (local, _remote) = tokio::io::duplex(256);
        let (transport, mut events) = Transport::new(local, &config()).unwrap();

        let segment = transport.reserve_send().unwrap();
        assert_eq!(transport.send_arena().stats().leased, 1);
        transport.send(segment, 0).await.unwrap();
        assert!(transport.send_arena().stats().is_idle());

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::PacketSent { bytes: 2 })
        ));
    }

    #[tokio::test]
    async fn test_oversized_send_rejected() {
        let (local, _remote) = tokio::io::duplex(256);
        let (transport, _events) = Transport::new(local, &config()).unwrap();
        let segment = transport.reserve_send().unwrap();
        let err = transport.send(segment, 63).await.unwrap_err();
        assert!(matches!(err, TransportError::Arena(_)));
        assert!(transport.send_arena().stats().is_idle());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (local, _remote) = tokio::io::duplex(256);
        let (transport, mut events) = Transport::new(local, &config()).unwrap();

        transport.disconnect().await;
        transport.disconnect().await;
        assert!(!transport.is_connected());
        assert_eq!(transport.receive_phase(), ReceivePhase::Disconnected);

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Disconnected {
                reason: CloseReason::LocalShutdown
            })
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_receiving_once() {
        let (local, _remote) = tokio::io::duplex(256);
        let (transport, _events) = Transport::new(local, &config()).unwrap();
        let _handle = transport.start_receiving().unwrap();
        assert!(matches!(
            transport.start_receiving(),
            Err(TransportError::AlreadyReceiving)
        ));
    }

    #[tokio::test]
    async fn test_invalid_geometry_rejected() {
        let (local, _remote) = tokio::io::duplex(256);
        let config = TransportConfig::symmetric(ArenaConfig::new(1024, 1));
        assert!(matches!(
            Transport::new(local, &config),
            Err(TransportError::Arena(_))
        ));
    }
}
