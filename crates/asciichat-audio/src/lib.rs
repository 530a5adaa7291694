//! Server-side audio plumbing: per-client PCM ring buffers and the
//! N-party mixer that builds each recipient's outbound mix.

pub mod mixer;
pub mod ring;

pub use mixer::{AudioSource, Mixer};
pub use ring::PcmRing;

/// Sample rate of the mixing contract. Inbound frames at other rates are
/// accepted on the wire but resampling is the capture side's job; the
/// mixer itself runs at this rate.
pub const SAMPLE_RATE: u32 = 44_100;

/// Mono throughout the mix path.
pub const CHANNELS: u8 = 1;

/// Samples per mixer tick. 256 samples at 44.1 kHz is ≈5.805 ms, the
/// audio render cadence.
pub const FRAME_SAMPLES: usize = 256;

/// Default per-source ring capacity: a quarter second of audio.
pub const RING_CAPACITY: usize = SAMPLE_RATE as usize / 4;
