//! The N-party mixer. Every client that sends audio registers a source;
//! every recipient's audio-render tick asks for the sum of all *other*
//! producing sources, saturated to the i16 sample range.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::ring::PcmRing;
use crate::{FRAME_SAMPLES, RING_CAPACITY};

/// A source is considered silent when no samples arrived within this
/// window, even if the peer never sent a stream-stop.
const STALE_AFTER_MS: u64 = 500;

/// One participant's inbound audio, owned by the mixer and fed by that
/// participant's receive path.
pub struct AudioSource {
    ring: Mutex<PcmRing>,
    producing: AtomicBool,
    /// Milliseconds since mixer epoch of the last submit.
    last_submit_ms: AtomicU64,
}

impl AudioSource {
    fn new() -> Self {
        Self {
            ring: Mutex::new(PcmRing::new(RING_CAPACITY)),
            producing: AtomicBool::new(false),
            last_submit_ms: AtomicU64::new(0),
        }
    }

    pub fn is_producing(&self) -> bool {
        self.producing.load(Ordering::Acquire)
    }
}

pub struct Mixer {
    sources: DashMap<u32, Arc<AudioSource>>,
    epoch: Instant,
    calls: AtomicU64,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            sources: DashMap::new(),
            epoch: Instant::now(),
            calls: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Add a participant. Idempotent per client id.
    pub fn register(&self, client_id: u32) -> Arc<AudioSource> {
        self.sources
            .entry(client_id)
            .or_insert_with(|| Arc::new(AudioSource::new()))
            .clone()
    }

    pub fn unregister(&self, client_id: u32) {
        self.sources.remove(&client_id);
        debug!(client_id, "mixer source removed");
    }

    /// Flip a source's producing flag (stream-start / stream-stop).
    pub fn set_producing(&self, client_id: u32, producing: bool) {
        if let Some(source) = self.sources.get(&client_id) {
            source.producing.store(producing, Ordering::Release);
            if !producing {
                source.ring.lock().clear();
            }
        }
    }

    /// Feed PCM from a participant. Single producer per source. A submit
    /// marks the source producing; an explicit stream-stop clears it.
    pub fn submit(&self, client_id: u32, samples: &[i16]) {
        if let Some(source) = self.sources.get(&client_id) {
            source.ring.lock().push_slice(samples);
            source.last_submit_ms.store(self.now_ms(), Ordering::Release);
            source.producing.store(true, Ordering::Release);
        }
    }

    /// Sum the most recent frame of every producing source except the
    /// recipient, saturating each output sample. Returns `None` when no
    /// other source is producing, so the caller can skip the emission.
    ///
    /// O(number of sources); safe to call concurrently from every
    /// recipient's render tick.
    pub fn mix_excluding(&self, recipient: u32) -> Option<[i16; FRAME_SAMPLES]> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let now = self.now_ms();

        let mut acc = [0i32; FRAME_SAMPLES];
        let mut frame = [0i16; FRAME_SAMPLES];
        let mut contributors = 0usize;

        for entry in self.sources.iter() {
            if *entry.key() == recipient {
                continue;
            }
            let source = entry.value();
            if !source.producing.load(Ordering::Acquire) {
                continue;
            }
            let last = source.last_submit_ms.load(Ordering::Acquire);
            if now.saturating_sub(last) > STALE_AFTER_MS {
                continue;
            }
            if !source.ring.lock().latest(&mut frame) {
                continue;
            }
            for (a, &s) in acc.iter_mut().zip(frame.iter()) {
                *a += s as i32;
            }
            contributors += 1;
        }

        if contributors == 0 {
            return None;
        }

        let mut out = [0i16; FRAME_SAMPLES];
        for (o, &a) in out.iter_mut().zip(acc.iter()) {
            *o = a.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }
        Some(out)
    }

    /// Sources currently registered.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Sources currently flagged producing.
    pub fn producing_count(&self) -> usize {
        self.sources
            .iter()
            .filter(|e| e.value().is_producing())
            .count()
    }

    /// Total mix calls, for the stats line.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}
