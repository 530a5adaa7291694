//! Per-client bounded buffers: the outbound audio packet queue
//! (drop-oldest) and the generation-counted double buffer used for both
//! the inbound image frame and the outbound rendered frame.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::shutdown::ShutdownToken;

/// Single-producer/single-consumer bounded queue of mixed audio frames.
///
/// Enqueue never fails: when full, the head (oldest frame) is discarded
/// and the drop counter bumped. Dequeue blocks until a frame, shutdown,
/// or slot teardown.
pub struct AudioPacketQueue {
    inner: Mutex<VecDeque<Vec<i16>>>,
    capacity: usize,
    notify: Notify,
    /// Mirror of the deque length, so stats never touch the lock.
    depth: AtomicUsize,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl AudioPacketQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            depth: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Drop-oldest enqueue; always succeeds.
    pub fn push(&self, frame: Vec<i16>) {
        {
            let mut q = self.inner.lock();
            if q.len() == self.capacity {
                q.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            q.push_back(frame);
            self.depth.store(q.len(), Ordering::Release);
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<Vec<i16>> {
        let mut q = self.inner.lock();
        let frame = q.pop_front();
        self.depth.store(q.len(), Ordering::Release);
        frame
    }

    /// Blocking dequeue with cancellation: resolves to `None` once the
    /// process is shutting down or the slot is being torn down.
    pub async fn pop(&self, shutdown: &ShutdownToken, slot_down: &AtomicBool) -> Option<Vec<i16>> {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.try_pop() {
                return Some(frame);
            }
            if shutdown.is_triggered() || slot_down.load(Ordering::Acquire) {
                return None;
            }
            tokio::select! {
                _ = notified => {}
                _ = shutdown.wait() => return None,
            }
        }
    }

    /// Wake a blocked consumer so it can observe teardown flags.
    pub fn wake(&self) {
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }
}

/// A single-producer/single-consumer double buffer.
///
/// The producer publishes a complete frame; publication is an atomic
/// swap plus a generation bump, so the consumer can ask "anything newer
/// than what I last sent?" and skip retransmission otherwise. The
/// consumer never observes a partially written frame.
pub struct FrameSwap<T> {
    current: Mutex<Option<Arc<T>>>,
    generation: AtomicU64,
    notify: Notify,
}

impl<T> Default for FrameSwap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameSwap<T> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Make `frame` the visible side; returns its generation.
    pub fn publish(&self, frame: T) -> u64 {
        let gen = {
            let mut current = self.current.lock();
            *current = Some(Arc::new(frame));
            self.generation.fetch_add(1, Ordering::AcqRel) + 1
        };
        self.notify.notify_waiters();
        gen
    }

    /// The newest frame, if it is newer than `last_gen`.
    pub fn acquire_if_newer(&self, last_gen: u64) -> Option<(u64, Arc<T>)> {
        let gen = self.generation.load(Ordering::Acquire);
        if gen <= last_gen {
            return None;
        }
        let current = self.current.lock();
        current.as_ref().map(|frame| (gen, Arc::clone(frame)))
    }

    /// Current newest frame regardless of generation.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.current.lock().as_ref().map(Arc::clone)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Resolves on the next publish after the call.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Enqueuing k > capacity distinct items must leave the last
    // `capacity` items in order, with k - capacity drops.
    #[test]
    fn drop_oldest_law() {
        let q = AudioPacketQueue::new(64);
        for i in 0..200i16 {
            q.push(vec![i; 4]);
        }
        assert_eq!(q.len(), 64);
        assert_eq!(q.dropped(), 136);
        assert_eq!(q.enqueued(), 200);
        // Head is the 137th frame pushed (index 136).
        assert_eq!(q.try_pop().unwrap()[0], 136);
        // Remaining items come out in order.
        let mut expected = 137i16;
        while let Some(frame) = q.try_pop() {
            assert_eq!(frame[0], expected);
            expected += 1;
        }
        assert_eq!(expected, 200);
    }

    #[test]
    fn fifo_below_capacity() {
        let q = AudioPacketQueue::new(8);
        q.push(vec![1]);
        q.push(vec![2]);
        q.push(vec![3]);
        assert_eq!(q.try_pop().unwrap()[0], 1);
        assert_eq!(q.try_pop().unwrap()[0], 2);
        assert_eq!(q.try_pop().unwrap()[0], 3);
        assert!(q.try_pop().is_none());
        assert_eq!(q.dropped(), 0);
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let q = Arc::new(AudioPacketQueue::new(4));
        let shutdown = ShutdownToken::new();
        let slot_down = Arc::new(AtomicBool::new(false));

        let popper = {
            let q = q.clone();
            let shutdown = shutdown.clone();
            let slot_down = slot_down.clone();
            tokio::spawn(async move { q.pop(&shutdown, &slot_down).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        q.push(vec![7]);
        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), popper)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.unwrap()[0], 7);
    }

    #[tokio::test]
    async fn pop_cancelled_by_shutdown() {
        let q = Arc::new(AudioPacketQueue::new(4));
        let shutdown = ShutdownToken::new();
        let slot_down = Arc::new(AtomicBool::new(false));

        let popper = {
            let q = q.clone();
            let shutdown = shutdown.clone();
            let slot_down = slot_down.clone();
            tokio::spawn(async move { q.pop(&shutdown, &slot_down).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        shutdown.trigger();
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), popper)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn pop_cancelled_by_slot_teardown() {
        let q = Arc::new(AudioPacketQueue::new(4));
        let shutdown = ShutdownToken::new();
        let slot_down = Arc::new(AtomicBool::new(false));

        let popper = {
            let q = q.clone();
            let shutdown = shutdown.clone();
            let slot_down = slot_down.clone();
            tokio::spawn(async move { q.pop(&shutdown, &slot_down).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        slot_down.store(true, Ordering::Release);
        q.wake();
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), popper)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn frame_swap_generations() {
        let swap = FrameSwap::new();
        assert!(swap.acquire_if_newer(0).is_none());

        let g1 = swap.publish("frame one");
        assert_eq!(g1, 1);
        let (gen, frame) = swap.acquire_if_newer(0).unwrap();
        assert_eq!(gen, 1);
        assert_eq!(*frame, "frame one");

        // Same generation: nothing new to send.
        assert!(swap.acquire_if_newer(gen).is_none());

        let g2 = swap.publish("frame two");
        assert_eq!(g2, 2);
        let (gen, frame) = swap.acquire_if_newer(g1).unwrap();
        assert_eq!(gen, 2);
        assert_eq!(*frame, "frame two");
    }

    #[test]
    fn frame_swap_skips_intermediate() {
        let swap = FrameSwap::new();
        swap.publish(1);
        swap.publish(2);
        swap.publish(3);
        // Consumer that last saw generation 1 gets only the newest.
        let (gen, frame) = swap.acquire_if_newer(1).unwrap();
        assert_eq!(gen, 3);
        assert_eq!(*frame, 3);
    }
}
