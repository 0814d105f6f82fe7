//! The process-wide cancel-key registry (spec §4.4).
//!
//! The only structure shared across sessions. A `CancelRequest` arriving
//! on its own short-lived connection looks up `(backend_pid, secret_key)`
//! here and flips the matching session's [`CancelFlag`]; everything else
//! about a session is private to its own dispatch loop.

use std::sync::Arc;

use crate::session::{BackendKey, CancelFlag};
use crate::utils::dashmap::new_dashmap;

pub struct Registry {
    keys: dashmap::DashMap<BackendKey, CancelFlag>,
}

impl Registry {
    pub fn new(worker_threads: usize) -> Arc<Self> {
        Arc::new(Registry {
            keys: new_dashmap(worker_threads),
        })
    }

    pub fn insert(&self, key: BackendKey, flag: CancelFlag) {
        self.keys.insert(key, flag);
    }

    pub fn remove(&self, key: BackendKey) {
        self.keys.remove(&key);
    }

    /// On a match, sets the target session's cancel flag. Mismatched
    /// keys are silently ignored, matching real PostgreSQL (spec §4.3).
    pub fn request_cancel(&self, key: BackendKey) {
        if let Some(flag) = self.keys.get(&key) {
            flag.request();
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Removes a session's registry entry on every exit path — normal
/// `Terminate`, peer close, protocol error, or shutdown — matching
/// spec §5's Session resource-lifecycle guarantee.
pub struct RegistryGuard {
    registry: Arc<Registry>,
    key: BackendKey,
    armed: bool,
}

impl RegistryGuard {
    pub fn new(registry: Arc<Registry>, key: BackendKey) -> Self {
        RegistryGuard {
            registry,
            key,
            armed: false,
        }
    }

    /// Call once the session has actually been inserted (after a
    /// successful startup handshake); a cancel connection that never
    /// reaches `Ready` never arms its guard, since it was never
    /// registered in the first place.
    pub fn arm(&mut self) {
        self.armed = true;
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if self.armed {
            self.registry.remove(self.key);
        }
    }
}

/// Hands out process-wide unique `backend_pid`s starting at 1, per
/// spec §9's resolution of the original's `getpid()+fd` scheme.
pub struct PidAllocator(std::sync::atomic::AtomicI32);

impl PidAllocator {
    pub const fn new() -> Self {
        PidAllocator(std::sync::atomic::AtomicI32::new(1))
    }

    pub fn next(&self) -> i32 {
        self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

pub static BACKEND_PID: PidAllocator = PidAllocator::new();

/// A cryptographically random secret key, paired with a `backend_pid` to
/// form a [`BackendKey`].
pub fn random_secret_key() -> i32 {
    rand::random()
}
