//! Long-term Ed25519 identity keys and their on-disk format.
//!
//! The key file is a small postcard-encoded record holding either the raw
//! 32-byte seed or, when a passphrase is supplied, the seed sealed with
//! ChaCha20-Poly1305 under a SHA-256-derived key. The passphrase comes
//! from [`passphrase_from_env`] so unattended servers never prompt.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Passphrase environment variable consumed instead of prompting.
pub const PASSPHRASE_ENV: &str = "ASCIICHAT_KEY_PASSPHRASE";

const KEY_FILE_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: u8,
    sealed: bool,
    /// Raw 32-byte seed, or nonce(12) ‖ ciphertext ‖ tag when sealed.
    data: Vec<u8>,
}

pub fn passphrase_from_env() -> Option<Zeroizing<String>> {
    std::env::var(PASSPHRASE_ENV).ok().map(Zeroizing::new)
}

pub fn generate() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

fn passphrase_key(passphrase: &str) -> Zeroizing<[u8; 32]> {
    let mut h = Sha256::new();
    h.update(b"asciichat-keyfile");
    h.update(passphrase.as_bytes());
    Zeroizing::new(h.finalize().into())
}

/// Write a key file, sealing the seed when a passphrase is given.
pub fn save_key(path: &Path, key: &SigningKey, passphrase: Option<&str>) -> Result<()> {
    let seed = Zeroizing::new(key.to_bytes());
    let file = match passphrase {
        Some(pw) => {
            let cipher = ChaCha20Poly1305::new(Key::from_slice(passphrase_key(pw).as_ref()));
            let mut nonce = [0u8; 12];
            OsRng.fill_bytes(&mut nonce);
            let ciphertext = cipher
                .encrypt(Nonce::from_slice(&nonce), seed.as_slice())
                .map_err(|_| anyhow::anyhow!("failed to seal key file"))?;
            let mut data = Vec::with_capacity(12 + ciphertext.len());
            data.extend_from_slice(&nonce);
            data.extend_from_slice(&ciphertext);
            KeyFile {
                version: KEY_FILE_VERSION,
                sealed: true,
                data,
            }
        }
        None => KeyFile {
            version: KEY_FILE_VERSION,
            sealed: false,
            data: seed.to_vec(),
        },
    };
    let bytes = postcard::to_allocvec(&file).context("failed to encode key file")?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Load a key file, consulting the passphrase for sealed files.
pub fn load_key(path: &Path, passphrase: Option<&str>) -> Result<SigningKey> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read key file {}", path.display()))?;
    let file: KeyFile = postcard::from_bytes(&bytes).context("malformed key file")?;
    if file.version != KEY_FILE_VERSION {
        bail!("unsupported key file version {}", file.version);
    }

    let seed: Zeroizing<[u8; 32]> = if file.sealed {
        let Some(pw) = passphrase else {
            bail!("key file is passphrase-protected; set {}", PASSPHRASE_ENV);
        };
        if file.data.len() < 12 {
            bail!("sealed key file truncated");
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(passphrase_key(pw).as_ref()));
        let (nonce, ciphertext) = file.data.split_at(12);
        let plain = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow::anyhow!("wrong passphrase or corrupted key file"))?;
        Zeroizing::new(
            plain
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("sealed key file has bad seed length"))?,
        )
    } else {
        Zeroizing::new(
            file.data
                .as_slice()
                .try_into()
                .map_err(|_| anyhow::anyhow!("key file has bad seed length"))?,
        )
    };

    Ok(SigningKey::from_bytes(&seed))
}

/// Load the key at `path`, generating and persisting a fresh one when the
/// file does not exist yet.
pub fn load_or_generate(path: &Path, passphrase: Option<&str>) -> Result<SigningKey> {
    if path.exists() {
        load_key(path, passphrase)
    } else {
        let key = generate();
        save_key(path, &key, passphrase)?;
        Ok(key)
    }
}
