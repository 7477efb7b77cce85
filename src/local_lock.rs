//! Single-threaded raw lock backing the unsynchronized set mode.
//!
//! `LocalRawRwLock` implements `lock_api::RawRwLock` with a plain `Cell`
//! counter instead of atomics. It is `!Sync`, so a set built on it cannot be
//! shared between threads; within one thread, a conflicting nested access
//! (for example mutating the set from inside `iterate`) panics rather than
//! handing out aliasing references. The check is one compare per access and
//! stays on in release builds since soundness depends on it.

use core::cell::Cell;
use parking_lot::lock_api::{GuardNoSend, RawRwLock};

const EXCLUSIVE: isize = -1;
const UNLOCKED: isize = 0;

/// `Cell`-based reader/writer state. Positive values count shared holders,
/// `-1` marks an exclusive holder.
#[derive(Debug)]
pub struct LocalRawRwLock {
    state: Cell<isize>,
}

impl LocalRawRwLock {
    /// Create an unlocked instance. Const so it can back `RawRwLock::INIT`.
    pub const fn new() -> Self {
        Self {
            state: Cell::new(UNLOCKED),
        }
    }
}

#[cfg(test)]
impl LocalRawRwLock {
    /// Number of shared holders; `-1` while held exclusively.
    pub(crate) fn shared_holders(&self) -> isize {
        self.state.get()
    }
}

impl Default for LocalRawRwLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawRwLock for LocalRawRwLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardNoSend;

    #[inline]
    fn lock_shared(&self) {
        assert!(
            self.try_lock_shared(),
            "conflicting access: unsynchronized set is exclusively borrowed"
        );
    }

    #[inline]
    fn try_lock_shared(&self) -> bool {
        let s = self.state.get();
        if s == EXCLUSIVE {
            return false;
        }
        self.state.set(s + 1);
        true
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        let s = self.state.get();
        debug_assert!(s > 0);
        self.state.set(s - 1);
    }

    #[inline]
    fn lock_exclusive(&self) {
        assert!(
            self.try_lock_exclusive(),
            "conflicting access: unsynchronized set is already borrowed"
        );
    }

    #[inline]
    fn try_lock_exclusive(&self) -> bool {
        if self.state.get() != UNLOCKED {
            return false;
        }
        self.state.set(EXCLUSIVE);
        true
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        debug_assert_eq!(self.state.get(), EXCLUSIVE);
        self.state.set(UNLOCKED);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.state.get() != UNLOCKED
    }

    #[inline]
    fn is_locked_exclusive(&self) -> bool {
        self.state.get() == EXCLUSIVE
    }
}
