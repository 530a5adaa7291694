//! Wire protocol for ASCII-Chat: the framed binary packet format spoken
//! between server and clients, plus the typed payload bodies.
//!
//! Every packet is a fixed 20-byte network-byte-order header followed by
//! `payload_length` payload bytes. Once a session's handshake is complete,
//! payloads are sealed (`nonce || ciphertext || tag`) and the header's
//! `FLAG_ENCRYPTED` bit is set; the framing layer itself is unchanged.

pub mod codec;
pub mod error;
pub mod header;
pub mod messages;
pub mod types;

pub use codec::{encode_packet, try_decode, Packet};
pub use error::{FrameError, ProtocolError};
pub use header::{PacketHeader, DEFAULT_MAX_PAYLOAD, FLAG_ENCRYPTED, HEADER_SIZE, MAGIC};
pub use messages::WireMessage;
pub use types::{ClientId, PacketType};

/// Protocol version advertised in `ClientJoin`. A major mismatch is
/// rejected during admission.
pub const PROTOCOL_MAJOR: u16 = 1;
pub const PROTOCOL_MINOR: u16 = 0;
