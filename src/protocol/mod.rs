//! # Media-Exchange Protocol
//!
//! Implements the duplex upload/response protocol spoken with embedded
//! clients over one persistent WebSocket connection.
//!
//! ## Wire Protocol:
//! 1. **Client → Server**, text: `"<image_size>,<audio_size>"` (decimal
//!    bytes; `image_size` may be `0`)
//! 2. **Client → Server**: binary chunks totaling `image_size` bytes (only
//!    if `image_size > 0`)
//! 3. **Client → Server**: binary chunks totaling `audio_size` bytes,
//!    optionally terminated early by the text `"EOF"`
//! 4. **Server → Client**, text: JSON `{status, message?, upload_size,
//!    image_received, audio_size?, sending_audio}`
//! 5. **Server → Client**, if `sending_audio`: paced binary chunks of the
//!    synthesized response (no explicit terminator)
//!
//! ## Key Components:
//! - **Frame classifier** (`frame`): tags inbound messages per stage and
//!    validates metadata and container headers
//! - **Payload assembler** (`assembler`): drives chunk reception against a
//!    declared size with adaptive per-chunk timeouts
//! - **Session coordinator** (`coordinator`): the per-connection state
//!    machine from handshake to response
//! - **Response transmitter** (`transmitter`): streams the synthesized
//!    audio back in paced, bounded chunks

pub mod assembler;
pub mod coordinator;
pub mod frame;
pub mod transmitter;

pub use assembler::{FrameSource, RecvEvent};
pub use coordinator::{SessionCoordinator, TransactionOutcome};
pub use frame::InboundFrame;
pub use transmitter::FrameSink;
