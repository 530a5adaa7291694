//! The slot-level error funnel. Every failure a client's tasks can hit
//! collapses into one `SlotError`, classified so teardown can count it
//! and decide whether a termination packet is worth attempting.

use thiserror::Error;

use asciichat_crypto::handshake::HandshakeError;
use asciichat_crypto::transport::CryptoError;
use asciichat_proto::ProtocolError;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Rule violations above the frame layer (duplicate display name,
    /// handshake packet inside a ready session, version mismatch).
    #[error("protocol violation: {0}")]
    Violation(&'static str),

    #[error("timed out: {0}")]
    Timeout(&'static str),

    #[error("resource: {0}")]
    Resource(String),

    #[error("peer closed the connection")]
    PeerClosed,
}

/// Coarse classification used for stats and the shutdown summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectClass {
    Clean,
    Transport,
    Protocol,
    Crypto,
    Resource,
}

impl SlotError {
    pub fn class(&self) -> DisconnectClass {
        match self {
            SlotError::Transport(_) | SlotError::Timeout(_) => DisconnectClass::Transport,
            SlotError::Protocol(_) | SlotError::Violation(_) => DisconnectClass::Protocol,
            SlotError::Crypto(_) | SlotError::Handshake(_) => DisconnectClass::Crypto,
            SlotError::Resource(_) => DisconnectClass::Resource,
            SlotError::PeerClosed => DisconnectClass::Clean,
        }
    }

    /// Protocol-class failures get a termination packet before the socket
    /// closes; transport failures do not (the socket is already suspect).
    pub fn wants_termination_packet(&self) -> bool {
        matches!(self.class(), DisconnectClass::Protocol | DisconnectClass::Crypto)
    }
}
