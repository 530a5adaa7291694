//! Server-side whitelist of client identity keys permitted to
//! authenticate. Loaded once at startup from a JSON array of hex-encoded
//! Ed25519 public keys.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};

pub struct Whitelist {
    keys: HashSet<[u8; 32]>,
}

impl Whitelist {
    pub fn from_keys(keys: impl IntoIterator<Item = [u8; 32]>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Load from a JSON file: `["<hex pubkey>", ...]`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs_read(path)?;
        let entries: Vec<String> = serde_json::from_slice(&bytes)
            .with_context(|| format!("malformed whitelist file {}", path.display()))?;
        let mut keys = HashSet::with_capacity(entries.len());
        for entry in &entries {
            let raw = hex::decode(entry.trim())
                .with_context(|| format!("whitelist entry is not hex: {entry:?}"))?;
            let key: [u8; 32] = match raw.try_into() {
                Ok(k) => k,
                Err(_) => bail!("whitelist entry {entry:?} is not a 32-byte key"),
            };
            keys.insert(key);
        }
        Ok(Self { keys })
    }

    pub fn contains(&self, key: &[u8; 32]) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn fs_read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read whitelist {}", path.display()))
}
