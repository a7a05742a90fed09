/*!
 * Receive State Machine
 *
 * Pure framing logic: which read to issue next and what a completion means.
 * The async driver performs the I/O; this type only sees byte counts, so a
 * read that finished inline and one that finished later look the same.
 */

use super::codec::decode_header;
use super::types::{CloseReason, ReceivePhase, TransportError};
use crate::core::limits::HEADER_BYTES;

/// Next step for the receive driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveAction {
    /// Reserve `HEADER_BYTES` and read the length prefix
    ReadHeader,
    /// Reserve exactly `len` bytes and read the body
    ReadBody(usize),
    /// Hand a `len`-byte frame to the packet handler
    Deliver(usize),
    /// Stop receiving
    Close(CloseReason),
}

#[derive(Debug)]
pub struct ReceiveMachine {
    phase: ReceivePhase,
    max_frame_len: usize,
}

impl ReceiveMachine {
    /// `max_frame_len` is the largest body a receive segment can hold
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            phase: ReceivePhase::Idle,
            max_frame_len,
        }
    }

    #[inline]
    pub fn phase(&self) -> ReceivePhase {
        self.phase
    }

    #[inline]
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Idle -> AwaitingHeader
    pub fn arm(&mut self) -> Result<ReceiveAction, TransportError> {
        match self.phase {
            ReceivePhase::Idle => {
                self.phase = ReceivePhase::AwaitingHeader;
                Ok(ReceiveAction::ReadHeader)
            }
            ReceivePhase::Disconnected => Err(TransportError::ConnectionClosed),
            ReceivePhase::AwaitingHeader | ReceivePhase::AwaitingBody { .. } => {
                Err(TransportError::AlreadyReceiving)
            }
        }
    }

    /// Feed a read completion of `transferred` bytes; `bytes` is what was read
    pub fn complete(&mut self, transferred: usize, bytes: &[u8]) -> ReceiveAction {
        match self.phase {
            ReceivePhase::Disconnected => ReceiveAction::Close(CloseReason::LocalShutdown),
            // Nothing outstanding; a stray completion cannot revive the chain
            ReceivePhase::Idle => self.close(CloseReason::Truncated {
                expected: 0,
                received: transferred,
            }),
            _ if transferred == 0 => self.close(CloseReason::PeerClosed),
            ReceivePhase::AwaitingHeader => self.complete_header(transferred, bytes),
            ReceivePhase::AwaitingBody { len } if transferred == len => {
                self.phase = ReceivePhase::Idle;
                ReceiveAction::Deliver(len)
            }
            ReceivePhase::AwaitingBody { len } => self.close(CloseReason::Truncated {
                expected: len,
                received: transferred,
            }),
        }
    }

    fn complete_header(&mut self, transferred: usize, bytes: &[u8]) -> ReceiveAction {
        let len = match decode_header(bytes) {
            Some(len) if transferred == HEADER_BYTES => len,
            _ => {
                return self.close(CloseReason::Truncated {
                    expected: HEADER_BYTES,
                    received: transferred,
                })
            }
        };

        if len > self.max_frame_len {
            return self.close(CloseReason::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        if len == 0 {
            // An empty body needs no read; a zero-byte read would look like a close
            self.phase = ReceivePhase::Idle;
            return ReceiveAction::Deliver(0);
        }

        self.phase = ReceivePhase::AwaitingBody { len };
        ReceiveAction::ReadBody(len)
    }

    /// Enter the terminal phase
    pub fn disconnect(&mut self) {
        self.phase = ReceivePhase::Disconnected;
    }

    fn close(&mut self, reason: CloseReason) -> ReceiveAction {
        self.phase = ReceivePhase::Disconnected;
        ReceiveAction::Close(reason)
    }
}
