//! Deferred guard implementation for testing.
//!
//! This module provides `DeferredGuard`, a simple guard implementation that
//! defers all destruction until the guard (and therefore the set owning it)
//! is dropped.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::{Mutex, PoisonError};

use super::Guard;

/// A simple guard that defers all destruction until the guard is dropped.
///
/// Retired nodes and descriptors stay allocated for the whole life of the
/// set, so a traversal can never observe freed memory no matter how it is
/// scheduled. Memory accumulates, which makes this guard a testing tool only.
///
/// Every retired address is recorded: retiring the same record twice panics
/// immediately, which catches a lost-unlink race the moment it happens
/// instead of as a double free at drop time.
///
pub struct DeferredGuard {
    retired: Mutex<Retired>,
}

#[derive(Default)]
struct Retired {
    records: Vec<RetiredRecord>,
    seen: HashSet<usize>,
}

struct RetiredRecord {
    ptr: *mut (),
    dealloc: unsafe fn(*mut ()),
}

// Safety: records are only touched under the Mutex and freed on drop
unsafe impl Send for RetiredRecord {}

impl DeferredGuard {
    /// Create a new deferred guard.
    pub fn new() -> Self {
        DeferredGuard {
            retired: Mutex::new(Retired::default()),
        }
    }

    /// Number of records scheduled for destruction so far.
    pub fn retired_count(&self) -> usize {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }
}

impl Default for DeferredGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeferredGuard {
    fn drop(&mut self) {
        let retired = self
            .retired
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        for record in retired.records.drain(..) {
            unsafe {
                (record.dealloc)(record.ptr);
            }
        }
    }
}

/// A plain reference wrapper for DeferredGuard.
///
/// Nothing is freed before the guard drops, so the reference is valid for
/// as long as the set is borrowed.
///
pub struct DeferredRef<'a, T> {
    data: &'a T,
}

impl<'a, T> DeferredRef<'a, T> {
    /// Create a new deferred reference.
    pub fn new(data: &'a T) -> Self {
        DeferredRef { data }
    }
}

impl<T> Deref for DeferredRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for DeferredRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeferredRef({:?})", self.data)
    }
}

impl Guard for DeferredGuard {
    type GuardedRef<'a, T: 'a> = DeferredRef<'a, T>;

    /// No-op: all records are protected until the set's stored guard drops.
    type ReadGuard = ();

    fn pin() -> Self::ReadGuard {}

    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N)) {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);

        let addr = node as usize;
        if !retired.seen.insert(addr) {
            panic!("record {:#x} retired twice", addr);
        }

        retired.records.push(RetiredRecord {
            ptr: node as *mut (),
            dealloc: unsafe {
                std::mem::transmute::<unsafe fn(*mut N), unsafe fn(*mut ())>(dealloc)
            },
        });
    }

    unsafe fn make_ref<'a, T: 'a>(ptr: *const T) -> Self::GuardedRef<'a, T> {
        // Safety: caller guarantees ptr is valid for lifetime 'a
        DeferredRef::new(unsafe { &*ptr })
    }
}
