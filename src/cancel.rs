//! Cooperative cancellation for in-flight answer generation.
//!
//! A `StopFlag` is created fresh for each question and registered under
//! the session id so a concurrent stop request can find it. The flag only
//! ever transitions false -> true and is polled at fixed checkpoints, so
//! relaxed ordering is sufficient.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Session id -> stop flag of the request currently in flight.
#[derive(Debug, Default)]
pub struct StopRegistry {
    flags: Mutex<HashMap<String, StopFlag>>,
}

impl StopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh flag for a new request, replacing any stale one.
    pub fn begin(&self, session_id: &str) -> StopFlag {
        let flag = StopFlag::new();
        lock(&self.flags).insert(session_id.to_string(), flag.clone());
        flag
    }

    /// Set the flag of the in-flight request, if any.
    pub fn stop(&self, session_id: &str) -> bool {
        match lock(&self.flags).get(session_id) {
            Some(flag) => {
                flag.stop();
                true
            }
            None => false,
        }
    }

    /// Discard the flag once the request has completed or been cancelled.
    pub fn finish(&self, session_id: &str) {
        lock(&self.flags).remove(session_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
