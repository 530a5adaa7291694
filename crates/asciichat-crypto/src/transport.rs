//! Per-packet payload sealing for READY sessions.
//!
//! Each direction has its own ChaCha20-Poly1305 key and a monotonically
//! increasing counter. The 12-byte nonce is four zero bytes followed by
//! the counter in network byte order, and the counter is carried in the
//! clear as the nonce so the receiver can enforce strict monotonicity —
//! a replayed or reordered packet never opens.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;

use crate::handshake::SessionKeys;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Bytes added to a payload by sealing.
pub const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("payload too short to carry a sealed frame ({0} bytes)")]
    ShortPayload(usize),

    #[error("AEAD open failed: bad key, nonce or tampered ciphertext")]
    OpenFailed,

    #[error("AEAD seal failed")]
    SealFailed,

    #[error("replayed or reordered counter: received {received}, last accepted {last}")]
    Replay { received: u64, last: u64 },

    #[error("send counter exhausted")]
    CounterExhausted,
}

/// Outbound half: seals payloads under the send key.
pub struct SealKey {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl SealKey {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            counter: 1,
        }
    }

    /// Next counter value that would be used (for stats/tests).
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.counter == u64::MAX {
            return Err(CryptoError::CounterExhausted);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce[4..].copy_from_slice(&self.counter.to_be_bytes());

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::SealFailed)?;
        self.counter += 1;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }
}

/// Inbound half: opens payloads under the receive key, enforcing a
/// strictly increasing counter.
pub struct OpenKey {
    cipher: ChaCha20Poly1305,
    last_accepted: u64,
}

impl OpenKey {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            last_accepted: 0,
        }
    }

    pub fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(CryptoError::ShortPayload(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let received = u64::from_be_bytes(nonce[4..].try_into().expect("8 nonce bytes"));
        if received <= self.last_accepted {
            return Err(CryptoError::Replay {
                received,
                last: self.last_accepted,
            });
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::OpenFailed)?;
        // Only advance after authentication: a forged counter must not
        // block the legitimate sender.
        self.last_accepted = received;
        Ok(plaintext)
    }
}

/// Both directions of a READY session.
pub struct SessionCipher {
    pub seal: SealKey,
    pub open: OpenKey,
}

impl SessionCipher {
    pub fn new(keys: &SessionKeys) -> Self {
        Self {
            seal: SealKey::new(&keys.send),
            open: OpenKey::new(&keys.recv),
        }
    }

    /// Split into halves so send and receive paths can own their side.
    pub fn into_halves(self) -> (SealKey, OpenKey) {
        (self.seal, self.open)
    }
}
