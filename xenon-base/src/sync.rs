//! Mutual-exclusion and read-write-lock capabilities
//!
//! Thin wrappers over the platform primitives so the core depends only on
//! this crate's vocabulary. Poisoning is treated as an unrecoverable defect:
//! a thread that panicked while holding a lock has already violated the
//! single-writer contract.

use std::sync;

pub use std::sync::{MutexGuard, RwLockReadGuard, RwLockWriteGuard};

/// Mutual exclusion lock
pub struct Mutex<T> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: sync::Mutex::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("xenon-base: mutex poisoned: {}", poisoned),
        }
    }
}

/// Read-write lock
pub struct RwLock<T> {
    inner: sync::RwLock<T>,
}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: sync::RwLock::new(value),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("xenon-base: rwlock poisoned: {}", poisoned),
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("xenon-base: rwlock poisoned: {}", poisoned),
        }
    }
}
