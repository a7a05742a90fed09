/*!
 * Session
 *
 * Per-peer record driving one transport: delivered frames are resolved
 * through the dispatch table, deserialized and executed; replies queued by
 * handlers are serialized and sent.
 */

use super::types::{SessionCommand, SessionContext, SessionSummary};
use crate::arena::Segment;
use crate::core::config::{SessionConfig, UnknownPacketPolicy};
use crate::packet::{deserialize, serialize_and_send, Dispatch, DispatchError, Packet};
use crate::transport::{Transport, TransportError, TransportEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One peer connection and its packet handling loop
pub struct Session {
    context: SessionContext,
    transport: Transport,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    dispatch: Arc<dyn Dispatch>,
    config: SessionConfig,
    summary: SessionSummary,
}

impl Session {
    pub fn new(
        transport: Transport,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        dispatch: Arc<dyn Dispatch>,
        config: SessionConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let context = SessionContext::new(Uuid::new_v4(), transport.peer(), commands_tx);

        Self {
            context,
            transport,
            events,
            commands: commands_rx,
            dispatch,
            config,
            summary: SessionSummary::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.context.id()
    }

    /// Handle for queueing packets from outside the session loop
    #[inline]
    pub fn context(&self) -> SessionContext {
        self.context.clone()
    }

    #[inline]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Run until the transport disconnects
    pub async fn run(mut self) -> Result<SessionSummary, TransportError> {
        let _receiver = self.transport.start_receiving()?;
        info!(session = %self.id(), peer = ?self.transport.peer(), "Session started");

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(TransportEvent::PacketReceived { segment, len }) => {
                        self.on_packet(segment, len).await;
                    }
                    Some(TransportEvent::PacketSent { bytes }) => {
                        self.summary.frames_sent += 1;
                        self.summary.bytes_sent += bytes as u64;
                    }
                    Some(TransportEvent::Disconnected { reason }) => {
                        self.summary.close_reason = Some(reason);
                        break;
                    }
                    None => break,
                },
                Some(command) = self.commands.recv() => match command {
                    SessionCommand::Send(mut packet) => self.send_packet(packet.as_mut()).await,
                    SessionCommand::Disconnect => self.transport.disconnect().await,
                },
            }
        }

        info!(
            session = %self.id(),
            received = self.summary.frames_received,
            sent = self.summary.frames_sent,
            reason = ?self.summary.close_reason,
            "Session ended"
        );
        Ok(self.summary)
    }

    async fn on_packet(&mut self, segment: Segment, len: usize) {
        self.summary.frames_received += 1;

        let payload = segment.get(..len).unwrap_or_default();
        let mut handler = match self.dispatch.resolve_payload(payload) {
            Ok(handler) => handler,
            Err(e) => {
                match e {
                    DispatchError::UnknownPacketId(_) => self.summary.unknown_packets += 1,
                    DispatchError::MissingPacketId(_) => self.summary.malformed_frames += 1,
                }
                warn!(session = %self.id(), error = %e, len = len, "Dropping undispatchable frame");
                drop(segment);
                if self.config.unknown_packet == UnknownPacketPolicy::Disconnect {
                    self.transport.disconnect().await;
                }
                return;
            }
        };

        if let Err(e) = deserialize(handler.as_mut(), segment, len) {
            self.summary.handler_failures += 1;
            warn!(session = %self.id(), id = handler.id(), error = %e, "Packet deserialization failed");
            return;
        }

        if let Err(e) = handler.execute(&self.context) {
            self.summary.handler_failures += 1;
            warn!(session = %self.id(), id = handler.id(), error = %e, "Packet handler failed");
        }
    }

    async fn send_packet(&mut self, packet: &mut dyn Packet) {
        let mut attempt = 0;
        loop {
            match serialize_and_send(packet, &self.transport).await {
                Ok(bytes) => {
                    debug!(session = %self.id(), id = packet.id(), bytes = bytes, "Reply sent");
                    return;
                }
                Err(e) if e.is_backpressure() && attempt < self.config.send_retries => {
                    attempt += 1;
                    debug!(session = %self.id(), attempt = attempt, "Send arena full, retrying");
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                Err(e) => {
                    self.summary.send_failures += 1;
                    warn!(session = %self.id(), id = packet.id(), error = %e, "Reply dropped");
                    return;
                }
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("transport", &self.transport)
            .field("summary", &self.summary)
            .finish()
    }
}
