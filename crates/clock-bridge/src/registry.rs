//! Process-wide mapping from native handle to the owning clock.
//!
//! libclock only accepts a plain function pointer as event callback, so every
//! context shares [`crate::dispatch::global_event_callback`] and passes its
//! own handle back as user data. The registry resolves that handle to the
//! clock that should receive the event.
//!
//! Entries are weak back-references: the registry never keeps a clock alive.
//! All reads and writes go through one mutex, shared by caller threads
//! (create/destroy) and library threads (event lookup).

use crate::ffi::ClockHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tracing::{debug, warn};

/// Handle-keyed registry of weakly referenced receivers.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    entries: Mutex<HashMap<usize, Weak<T>>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    /// Create an empty registry.
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<usize, Weak<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `receiver` for `handle`.
    ///
    /// A previous entry for the same address belongs to a released context
    /// whose address the library reused; it is replaced.
    pub(crate) fn register(&self, handle: ClockHandle, receiver: &Arc<T>) {
        let previous = self
            .entries()
            .insert(handle.addr(), Arc::downgrade(receiver));
        if previous.is_some_and(|weak| weak.strong_count() > 0) {
            warn!(?handle, "replaced live registry entry for reused handle");
        }
        debug!(?handle, "registered clock");
    }

    /// Remove the entry for `handle` if it still points at `receiver`.
    ///
    /// Returns true if an entry was removed.
    pub(crate) fn unregister(&self, handle: ClockHandle, receiver: &Arc<T>) -> bool {
        let mut entries = self.entries();
        let owned = entries
            .get(&handle.addr())
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(receiver)));
        if owned {
            entries.remove(&handle.addr());
            debug!(?handle, "unregistered clock");
        }
        owned
    }

    /// Resolve the receiver registered under `addr`.
    ///
    /// The lock is released before the receiver is returned, so callers may
    /// run handlers without holding it.
    pub(crate) fn lookup(&self, addr: usize) -> Option<Arc<T>> {
        self.entries().get(&addr).and_then(Weak::upgrade)
    }

    /// Returns true if a live receiver is registered for `handle`.
    #[cfg(test)]
    pub(crate) fn contains(&self, handle: ClockHandle) -> bool {
        self.lookup(handle.addr()).is_some()
    }
}

/// The registry shared by every clock in the process.
pub(crate) fn clocks() -> &'static Registry<crate::clock::ClockInner> {
    static CLOCKS: OnceLock<Registry<crate::clock::ClockInner>> = OnceLock::new();
    CLOCKS.get_or_init(Registry::new)
}
