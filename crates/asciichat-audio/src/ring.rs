//! Fixed-size PCM ring buffer with overwrite-oldest semantics.

/// A circular buffer of i16 samples. The writer never blocks: when the
/// ring is full the oldest samples are discarded to make room.
pub struct PcmRing {
    buf: Vec<i16>,
    /// Next write position.
    write_pos: usize,
    /// Valid samples currently stored (≤ capacity).
    len: usize,
    total_written: u64,
    overwritten: u64,
}

impl PcmRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            buf: vec![0; capacity],
            write_pos: 0,
            len: 0,
            total_written: 0,
            overwritten: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples discarded to make room for newer ones.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Total samples ever pushed.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Append samples, overwriting the oldest on overflow.
    pub fn push_slice(&mut self, samples: &[i16]) {
        let cap = self.buf.len();
        self.total_written += samples.len() as u64;

        // Only the tail fits if the input alone exceeds capacity.
        let src = if samples.len() > cap {
            self.overwritten += (samples.len() - cap) as u64;
            &samples[samples.len() - cap..]
        } else {
            samples
        };

        for &s in src {
            self.buf[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % cap;
            if self.len < cap {
                self.len += 1;
            } else {
                self.overwritten += 1;
            }
        }
    }

    /// Consume the oldest `out.len()` samples. Returns false (leaving the
    /// ring untouched) when fewer samples are stored.
    pub fn pop_frame(&mut self, out: &mut [i16]) -> bool {
        let n = out.len();
        if self.len < n {
            return false;
        }
        let cap = self.buf.len();
        let read_pos = (self.write_pos + cap - self.len) % cap;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.buf[(read_pos + i) % cap];
        }
        self.len -= n;
        true
    }

    /// Copy the newest `out.len()` samples without consuming anything.
    /// This is what the mixer reads: "the most recent frame".
    pub fn latest(&self, out: &mut [i16]) -> bool {
        let n = out.len();
        if self.len < n {
            return false;
        }
        let cap = self.buf.len();
        let start = (self.write_pos + cap - n) % cap;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.buf[(start + i) % cap];
        }
        true
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.write_pos = 0;
    }
}
