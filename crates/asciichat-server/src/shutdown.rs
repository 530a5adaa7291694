//! Process-wide cooperative shutdown.
//!
//! One token is cloned into every task; observing it is a lock-free
//! atomic load. Signal handlers and fatal paths call [`ShutdownToken::trigger`],
//! loops either poll [`ShutdownToken::is_triggered`] between bounded waits
//! or select on [`ShutdownToken::wait`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; wakes every waiter.
    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Resolves once the token has been triggered. The notified future is
    /// created before the flag check so a trigger between the two cannot
    /// be missed.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}
