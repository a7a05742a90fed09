/*!
 * Packets
 *
 * Packet lifecycle contract and id-based dispatch:
 * - `Packet`: id plus fill hooks each message type implements
 * - `lifecycle`: serialize/send and receive/deserialize orchestration
 * - `PacketRegistry`: packet-id to handler-factory table
 */

mod lifecycle;
mod registry;
mod traits;
mod types;

pub use lifecycle::{
    deserialize, fill_segment, read_packet_id, serialize, serialize_and_send, Envelope,
};
pub use registry::{Dispatch, PacketFactory, PacketRegistry};
pub use traits::Packet;
pub use types::{DispatchError, PacketError};
