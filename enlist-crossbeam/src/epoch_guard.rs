//! Epoch-based guard implementation using crossbeam-epoch.
//!
//! `EpochGuard` retires unlinked chain nodes and replaced announcement
//! descriptors into the global crossbeam collector:
//!
//! ```text
//! EnlistSet<T, EpochGuard>
//!     │
//!     ├── every operation pins the thread (Guard::pin)
//!     └── unlink / descriptor swap ──► defer_destroy ──► freed after the epoch advances
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use enlist_core::EnlistSet;
//! use enlist_crossbeam::EpochGuard;
//!
//! let set: EnlistSet<i32, EpochGuard> = EnlistSet::new();
//!
//! set.try_add(42);
//! if let Some(val) = set.find(&42) {
//!     println!("Found: {}", *val);
//! }
//! set.remove(&42);
//! ```

use crossbeam_epoch::{self as epoch, Guard as CrossbeamGuard};
use enlist_core::guard::Guard;
use std::ops::Deref;

/// Epoch-based memory reclamation guard.
///
/// Zero-sized: all state lives in the global epoch collector, so a set
/// storing an `EpochGuard` stays `Send` and `Sync`. A retired record is
/// freed once every thread pinned at retirement time has unpinned.
///
#[derive(Clone, Copy, Default)]
pub struct EpochGuard {}

impl EpochGuard {
    pub fn new() -> Self {
        EpochGuard {}
    }
}

/// A value reference that keeps its own epoch pin.
///
/// Dropping the `EpochRef` unpins, after which the referenced node may be
/// reclaimed.
///
pub struct EpochRef<'a, T> {
    _guard: CrossbeamGuard,
    reference: &'a T,
}

impl<'a, T> EpochRef<'a, T> {
    /// # Safety
    ///
    /// `reference` must stay valid while `guard` is pinned.
    pub(crate) unsafe fn new(guard: CrossbeamGuard, reference: &'a T) -> Self {
        EpochRef {
            _guard: guard,
            reference,
        }
    }

    pub fn get(&self) -> &T {
        self.reference
    }
}

impl<T> Deref for EpochRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.reference
    }
}

impl<T: std::fmt::Display> std::fmt::Display for EpochRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reference)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for EpochRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EpochRef({:?})", self.reference)
    }
}

impl Guard for EpochGuard {
    type GuardedRef<'a, T: 'a> = EpochRef<'a, T>;

    /// A real crossbeam pin, held for the whole set operation.
    type ReadGuard = CrossbeamGuard;

    fn pin() -> Self::ReadGuard {
        epoch::pin()
    }

    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N)) {
        // Re-entrant pin: the operation retiring the record is already pinned
        let guard = epoch::pin();
        unsafe {
            guard.defer_unchecked(move || {
                dealloc(node);
            });
        }
    }

    unsafe fn make_ref<'a, T: 'a>(ptr: *const T) -> Self::GuardedRef<'a, T> {
        // Pinned while the caller's pin is still held, so ptr cannot be
        // reclaimed in between
        let pin = epoch::pin();
        unsafe { EpochRef::new(pin, &*ptr) }
    }
}
