//! Client-side known-hosts store: pins a server's long-term identity key
//! to its `host:port` on first contact and refuses silently substituted
//! keys afterwards.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::handshake::{HandshakeError, HandshakeErrorKind};

/// When set (to anything non-empty), key pinning is skipped entirely.
/// Intended for tests and CI, mirroring ssh's StrictHostKeyChecking=no.
pub const SKIP_ENV: &str = "ASCIICHAT_SKIP_KNOWN_HOSTS";

pub struct KnownHosts {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
    skip: bool,
}

fn host_key(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

impl KnownHosts {
    /// Open (or lazily create) the store at `path`. A missing file is an
    /// empty store, not an error.
    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let bytes = fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("malformed known-hosts file {}", path.display()))?
        } else {
            HashMap::new()
        };
        let skip = std::env::var(SKIP_ENV).map(|v| !v.is_empty()).unwrap_or(false);
        if skip {
            warn!("known-hosts verification disabled via {SKIP_ENV}");
        }
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            skip,
        })
    }

    /// The pinned key for `host:port`, if any.
    pub fn lookup(&self, host: &str, port: u16) -> Option<[u8; 32]> {
        let entries = self.entries.lock().expect("known-hosts lock");
        let hex_key = entries.get(&host_key(host, port))?;
        let bytes = hex::decode(hex_key).ok()?;
        bytes.try_into().ok()
    }

    /// First contact records the key; later contacts must match it.
    pub fn verify_or_record(
        &self,
        host: &str,
        port: u16,
        key: &[u8; 32],
    ) -> Result<(), HandshakeError> {
        if self.skip {
            return Ok(());
        }
        match self.lookup(host, port) {
            Some(pinned) if &pinned == key => Ok(()),
            Some(_) => Err(HandshakeError::new(
                HandshakeErrorKind::PeerIdentityChanged,
                format!("identity key for {host}:{port} does not match the pinned key"),
            )),
            None => {
                info!(host, port, "pinning server identity key on first contact");
                self.record(host, port, key);
                Ok(())
            }
        }
    }

    fn record(&self, host: &str, port: u16, key: &[u8; 32]) {
        {
            let mut entries = self.entries.lock().expect("known-hosts lock");
            entries.insert(host_key(host, port), hex::encode(key));
        }
        if let Err(e) = self.save() {
            warn!("failed to persist known-hosts file: {e:#}");
        }
    }

    fn save(&self) -> Result<()> {
        let entries = self.entries.lock().expect("known-hosts lock");
        let bytes = serde_json::to_vec_pretty(&*entries)?;
        fs::write(&self.path, bytes)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> KnownHosts {
        let mut p = std::env::temp_dir();
        p.push(format!("asciichat-kh-{}-{}.json", std::process::id(), name));
        let _ = fs::remove_file(&p);
        KnownHosts::open(p).unwrap()
    }

    #[test]
    fn first_contact_pins() {
        let store = temp_store("pin");
        let key = [7u8; 32];
        store.verify_or_record("example.org", 9001, &key).unwrap();
        assert_eq!(store.lookup("example.org", 9001), Some(key));
        let _ = fs::remove_file(&store.path);
    }

    #[test]
    fn matching_key_accepted() {
        let store = temp_store("match");
        let key = [8u8; 32];
        store.verify_or_record("h", 1, &key).unwrap();
        store.verify_or_record("h", 1, &key).unwrap();
        let _ = fs::remove_file(&store.path);
    }

    #[test]
    fn changed_key_rejected() {
        let store = temp_store("changed");
        store.verify_or_record("h", 1, &[1u8; 32]).unwrap();
        let err = store.verify_or_record("h", 1, &[2u8; 32]).unwrap_err();
        assert_eq!(err.kind, HandshakeErrorKind::PeerIdentityChanged);
        let _ = fs::remove_file(&store.path);
    }

    #[test]
    fn ports_pin_independently() {
        let store = temp_store("ports");
        store.verify_or_record("h", 1, &[1u8; 32]).unwrap();
        store.verify_or_record("h", 2, &[2u8; 32]).unwrap();
        assert_eq!(store.lookup("h", 1), Some([1u8; 32]));
        assert_eq!(store.lookup("h", 2), Some([2u8; 32]));
        let _ = fs::remove_file(&store.path);
    }

    #[test]
    fn persists_across_reopen() {
        let mut p = std::env::temp_dir();
        p.push(format!("asciichat-kh-{}-reopen.json", std::process::id()));
        let _ = fs::remove_file(&p);

        let store = KnownHosts::open(p.clone()).unwrap();
        store.verify_or_record("h", 1, &[9u8; 32]).unwrap();
        drop(store);

        let reopened = KnownHosts::open(p.clone()).unwrap();
        assert_eq!(reopened.lookup("h", 1), Some([9u8; 32]));
        let _ = fs::remove_file(&p);
    }
}
