/*!
 * Session Types
 * Handler-facing context and run summaries
 */

use crate::packet::{Packet, PacketError};
use crate::transport::CloseReason;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use uuid::Uuid;

pub(crate) enum SessionCommand {
    Send(Box<dyn Packet>),
    Disconnect,
}

/// What packet handlers see of their session
#[derive(Clone)]
pub struct SessionContext {
    id: Uuid,
    peer: Option<SocketAddr>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionContext {
    pub(crate) fn new(
        id: Uuid,
        peer: Option<SocketAddr>,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self { id, peer, commands }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Queue a packet for the session to serialize and send
    pub fn reply<P: Packet + 'static>(&self, packet: P) -> Result<(), PacketError> {
        self.send_boxed(Box::new(packet))
    }

    pub fn send_boxed(&self, packet: Box<dyn Packet>) -> Result<(), PacketError> {
        self.commands
            .send(SessionCommand::Send(packet))
            .map_err(|_| PacketError::Handler(format!("session {} has ended", self.id)))
    }

    /// Ask the session to close its transport
    pub fn disconnect(&self) {
        let _ = self.commands.send(SessionCommand::Disconnect);
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Counters collected over a session's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionSummary {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub unknown_packets: u64,
    pub malformed_frames: u64,
    pub handler_failures: u64,
    pub send_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<CloseReason>,
}
