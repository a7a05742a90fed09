/*!
 * Framed Transport
 *
 * Length-prefixed framing over a connected byte stream, backed by one send
 * and one receive segment arena per connection.
 *
 * Wire format:
 *
 * ```text
 * frame   := u16_le(payload_len) || payload
 * payload := u16_le(packet_id)   || packet_fields
 * ```
 */

pub mod codec;
mod framed;
mod state;
mod types;

pub use framed::Transport;
pub use state::{ReceiveAction, ReceiveMachine};
pub use types::{CloseReason, ReceivePhase, TransportError, TransportEvent};
