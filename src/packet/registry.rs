/*!
 * Packet Registry
 * Packet-id to handler-factory dispatch table
 */

use super::traits::Packet;
use super::types::DispatchError;
use crate::core::types::PacketId;
use crate::transport::codec;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a fresh handler for one received packet
pub type PacketFactory = Arc<dyn Fn() -> Box<dyn Packet> + Send + Sync>;

/// Injected lookup from packet id to handler
pub trait Dispatch: Send + Sync {
    fn resolve(&self, id: PacketId) -> Result<Box<dyn Packet>, DispatchError>;

    /// Resolve by the id at the front of `payload`
    fn resolve_payload(&self, payload: &[u8]) -> Result<Box<dyn Packet>, DispatchError> {
        let id = codec::read_packet_id(payload)
            .ok_or(DispatchError::MissingPacketId(payload.len()))?;
        self.resolve(id)
    }
}

/// Concurrent dispatch table
#[derive(Clone, Default)]
pub struct PacketRegistry {
    factories: Arc<DashMap<PacketId, PacketFactory, RandomState>>,
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    /// Register a factory, returning the one it replaced
    pub fn register<F>(&self, id: PacketId, factory: F) -> Option<PacketFactory>
    where
        F: Fn() -> Box<dyn Packet> + Send + Sync + 'static,
    {
        debug!(id = id, "Packet handler registered");
        self.factories.insert(id, Arc::new(factory))
    }

    pub fn unregister(&self, id: PacketId) -> Option<PacketFactory> {
        self.factories.remove(&id).map(|(_, factory)| factory)
    }

    #[inline]
    pub fn contains(&self, id: PacketId) -> bool {
        self.factories.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Dispatch for PacketRegistry {
    fn resolve(&self, id: PacketId) -> Result<Box<dyn Packet>, DispatchError> {
        let factory = self
            .factories
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DispatchError::UnknownPacketId(id))?;
        Ok(factory())
    }
}

impl std::fmt::Debug for PacketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<PacketId> = self.factories.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        f.debug_struct("PacketRegistry").field("ids", &ids).finish()
    }
}
