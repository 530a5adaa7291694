//! Authenticated key exchange and per-packet transport encryption for
//! ASCII-Chat sessions.
//!
//! The handshake is an X25519 ephemeral exchange with mutual
//! authentication (pre-shared password HMAC or Ed25519 identity
//! signature), producing one ChaCha20-Poly1305 key per direction. The
//! state machines here are sans-I/O: they consume and produce
//! [`asciichat_proto::WireMessage`] values and leave socket handling to
//! the caller.

pub mod handshake;
pub mod identity;
pub mod known_hosts;
pub mod transport;
pub mod whitelist;

pub use handshake::{
    ClientAuth, ClientHandshake, HandshakeError, HandshakeErrorKind, HandshakeState,
    ServerAuthConfig, ServerHandshake, SessionKeys,
};
pub use transport::{CryptoError, OpenKey, SealKey, SessionCipher, NONCE_LEN, SEAL_OVERHEAD};
pub use whitelist::Whitelist;
