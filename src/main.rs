/*!
 * Segnet Echo Server
 *
 * Accepts TCP peers and echoes every packet with id 1 back to its sender.
 */

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use segnet::{
    init_tracing, Packet, PacketRegistry, Session, SessionConfig, SessionContext, Transport,
    TransportConfig,
};
use segnet::packet::PacketError;

const ENV_ECHO_ADDR: &str = "SEGNET_ECHO_ADDR";
const DEFAULT_ECHO_ADDR: &str = "127.0.0.1:7070";
const ECHO_PACKET_ID: u16 = 1;

#[derive(Debug, Default)]
struct EchoPacket {
    body: Vec<u8>,
}

impl Packet for EchoPacket {
    fn id(&self) -> u16 {
        ECHO_PACKET_ID
    }

    fn fill_into_buffer(&mut self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let available = buf.len();
        let target = buf
            .get_mut(..self.body.len())
            .ok_or(PacketError::BufferTooSmall {
                needed: self.body.len(),
                available,
            })?;
        target.copy_from_slice(&self.body);
        Ok(self.body.len())
    }

    fn fill_from_peer_bytes(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        self.body = bytes.to_vec();
        Ok(())
    }

    fn execute(&mut self, ctx: &SessionContext) -> Result<(), PacketError> {
        ctx.reply(EchoPacket {
            body: std::mem::take(&mut self.body),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = TransportConfig::from_env().context("invalid transport configuration")?;
    let addr = std::env::var(ENV_ECHO_ADDR).unwrap_or_else(|_| DEFAULT_ECHO_ADDR.to_string());

    let registry = PacketRegistry::new();
    registry.register(ECHO_PACKET_ID, || Box::new(EchoPacket::default()));
    let registry = Arc::new(registry);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(
        addr = %addr,
        segment_size = config.receive_arena.segment_size,
        "Echo server listening"
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                };

                let (transport, events) = match Transport::from_tcp(stream, &config) {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(peer = %peer, error = %e, "Transport setup failed");
                        continue;
                    }
                };

                let session = Session::new(transport, events, registry.clone(), SessionConfig::default());
                tokio::spawn(async move {
                    match session.run().await {
                        Ok(summary) => match serde_json::to_string(&summary) {
                            Ok(json) => info!(peer = %peer, summary = %json, "Peer finished"),
                            Err(_) => info!(peer = %peer, summary = ?summary, "Peer finished"),
                        },
                        Err(e) => warn!(peer = %peer, error = %e, "Session failed"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    Ok(())
}
