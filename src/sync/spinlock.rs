// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Guarded Spinlock
//!
//! `SpinMutex<T>` owns the state it protects. The only way to touch that
//! state is through the [`SpinMutexGuard`] returned by [`SpinMutex::lock`],
//! so a function that takes `&mut State` can only be called by code that
//! currently holds the lock. Helpers that need the lock held take the
//! guarded state by `&mut` instead of documenting a locking requirement.
//!
//! Critical sections must stay short: no user callback is ever invoked
//! while one of these locks is held.

use core::fmt;

/// RAII guard for a [`SpinMutex`]
pub type SpinMutexGuard<'a, T> = spin::MutexGuard<'a, T>;

/// Spin-based mutual exclusion around a value
pub struct SpinMutex<T> {
    inner: spin::Mutex<T>,
}

impl<T> SpinMutex<T> {
    /// Create a new lock around `data`
    pub const fn new(data: T) -> Self {
        Self {
            inner: spin::Mutex::new(data),
        }
    }

    /// Acquire the lock, spinning until it becomes available
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Try to acquire the lock without spinning
    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Run `f` with the lock held and return its result
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Check if the mutex is currently locked
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Access the value through an exclusive borrow (no locking needed)
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consume the lock and return the value
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for SpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinMutex").field("data", &*guard).finish(),
            None => f.write_str("SpinMutex { <locked> }"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinlock_basic() {
        let mutex = SpinMutex::new(42);
        {
            let mut guard = mutex.lock();
            assert_eq!(*guard, 42);
            *guard = 100;
        }
        assert_eq!(*mutex.lock(), 100);
    }

    #[test]
    fn test_spinlock_try_lock() {
        let mutex = SpinMutex::new(42);

        {
            let _guard = mutex.lock();
            assert!(mutex.try_lock().is_none());
            assert!(mutex.is_locked());
        }
        assert!(mutex.try_lock().is_some());
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_spinlock_with() {
        let mutex = SpinMutex::new(vec![1, 2]);
        let len = mutex.with(|v| {
            v.push(3);
            v.len()
        });
        assert_eq!(len, 3);
        assert_eq!(mutex.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_spinlock_contended() {
        let mutex = std::sync::Arc::new(SpinMutex::new(0u32));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let mutex = mutex.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*mutex.lock(), 4000);
    }
}
