//! Thin named wrappers over tokio's lock primitives.
//!
//! The names exist for diagnostics: with the `sync-debug` feature, every
//! hold is counted in a process-wide registry and the stats loop reports
//! who currently holds what. Without the feature the wrappers compile
//! down to the plain primitives.

use std::ops::{Deref, DerefMut};

use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(feature = "sync-debug")]
mod registry {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::OnceLock;

    use dashmap::DashMap;

    static HELD: OnceLock<DashMap<&'static str, AtomicI64>> = OnceLock::new();

    fn map() -> &'static DashMap<&'static str, AtomicI64> {
        HELD.get_or_init(DashMap::new)
    }

    pub fn acquired(name: &'static str) {
        map()
            .entry(name)
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn released(name: &'static str) {
        if let Some(count) = map().get(name) {
            count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of currently-held lock counts, non-zero entries only.
    pub fn held_counts() -> Vec<(&'static str, i64)> {
        map()
            .iter()
            .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
            .filter(|(_, n)| *n != 0)
            .collect()
    }
}

/// Currently-held named locks; empty unless `sync-debug` is enabled.
pub fn held_counts() -> Vec<(&'static str, i64)> {
    #[cfg(feature = "sync-debug")]
    {
        registry::held_counts()
    }
    #[cfg(not(feature = "sync-debug"))]
    {
        Vec::new()
    }
}

pub struct NamedMutex<T> {
    name: &'static str,
    inner: Mutex<T>,
}

impl<T> NamedMutex<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: Mutex::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn lock(&self) -> NamedMutexGuard<'_, T> {
        let guard = self.inner.lock().await;
        #[cfg(feature = "sync-debug")]
        registry::acquired(self.name);
        NamedMutexGuard { guard, name: self.name }
    }
}

pub struct NamedMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    #[allow(dead_code)]
    name: &'static str,
}

impl<T> Drop for NamedMutexGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(feature = "sync-debug")]
        registry::released(self.name);
    }
}

impl<T> Deref for NamedMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for NamedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

pub struct NamedRwLock<T> {
    name: &'static str,
    inner: RwLock<T>,
}

impl<T> NamedRwLock<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: RwLock::new(value),
        }
    }

    pub async fn read(&self) -> NamedReadGuard<'_, T> {
        let guard = self.inner.read().await;
        #[cfg(feature = "sync-debug")]
        registry::acquired(self.name);
        NamedReadGuard { guard, name: self.name }
    }

    pub async fn write(&self) -> NamedWriteGuard<'_, T> {
        let guard = self.inner.write().await;
        #[cfg(feature = "sync-debug")]
        registry::acquired(self.name);
        NamedWriteGuard { guard, name: self.name }
    }
}

pub struct NamedReadGuard<'a, T> {
    guard: RwLockReadGuard<'a, T>,
    #[allow(dead_code)]
    name: &'static str,
}

impl<T> Drop for NamedReadGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(feature = "sync-debug")]
        registry::released(self.name);
    }
}

impl<T> Deref for NamedReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

pub struct NamedWriteGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
    #[allow(dead_code)]
    name: &'static str,
}

impl<T> Drop for NamedWriteGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(feature = "sync-debug")]
        registry::released(self.name);
    }
}

impl<T> Deref for NamedWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for NamedWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
