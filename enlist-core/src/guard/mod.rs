//! Guard trait for memory reclamation strategies.
//!
//! This module defines the `Guard` trait that abstracts over different memory
//! reclamation strategies (epoch-based, deferred, hazard pointers, etc.).
//!
//! # Design
//!
//! `EnlistSet` is generic over its reclamation strategy:
//!
//! ```text
//! EnlistSet<T, G: Guard>
//!     │
//!     ├── EnlistSet<T, EpochGuard>      (production, enlist-crossbeam)
//!     └── EnlistSet<T, DeferredGuard>   (testing)
//! ```
//!
//! Two kinds of records are retired through the guard:
//!
//! - chain nodes, by the thread whose CAS physically unlinked them
//! - announcement descriptors, by the thread that replaced them
//!
//! # Example
//!
//! ```rust,ignore
//! use enlist_core::EnlistSet;
//! use enlist_crossbeam::EpochGuard;
//!
//! // Production: epoch-based reclamation
//! let set: EnlistSet<i32, EpochGuard> = EnlistSet::new();
//! set.try_add(42);
//!
//! // Testing: deferred destruction
//! let test_set: EnlistSet<i32, DeferredGuard> = EnlistSet::new();
//! ```

mod deferred_guard;

use std::ops::Deref;

pub use deferred_guard::{DeferredGuard, DeferredRef};

/// A memory reclamation guard that protects concurrent access to nodes.
///
/// - **EpochGuard**: Low overhead, batched reclamation (crossbeam-epoch)
/// - **DeferredGuard**: Simple, defers all destruction until guard drops (testing)
///
/// # Safety Contract
///
/// Implementations must ensure:
/// 1. Records passed to `defer_destroy` are not freed while any thread that
///    pinned before the call is still pinned
/// 2. `GuardedRef` keeps the referenced data valid for its lifetime
///
/// # Design Note
///
/// The guard stored in a set is used for deferred destruction scheduling.
/// Actual thread pinning (for epoch-based guards) happens per-operation
/// through `pin()`, not when the guard is created.
///
pub trait Guard: Sized + Default + Send + Sync {
    /// A reference protected by a guard of this type.
    ///
    /// The reference owns its protection and is valid for lifetime `'a`.
    ///
    type GuardedRef<'a, T: 'a>: Deref<Target = T>;

    /// An active guard that protects reads for its lifetime.
    ///
    /// For epoch-based guards, this holds an actual pinned `crossbeam_epoch::Guard`.
    /// For deferred guards, this can be a unit type `()` since protection
    /// is provided by the set's stored guard.
    ///
    type ReadGuard: Sized;

    /// Pin an active read guard.
    ///
    /// Every set operation holds one of these from its first load until its
    /// last dereference of shared memory.
    ///
    fn pin() -> Self::ReadGuard;

    /// Schedule a record for deferred destruction.
    ///
    /// # Safety
    ///
    /// - `node` must be a valid pointer previously allocated by the set
    /// - `node` must be unreachable for any thread that pins after this call
    /// - `node` must be scheduled at most once
    /// - `dealloc` must be the correct deallocation function for `node`
    ///
    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N));

    /// Create a guarded reference from a raw pointer.
    ///
    /// # Safety
    ///
    /// - `ptr` must point to valid data protected by a currently pinned guard
    /// - The data must remain valid for lifetime `'a`
    ///
    unsafe fn make_ref<'a, T: 'a>(ptr: *const T) -> Self::GuardedRef<'a, T>;
}
