use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use tracing::debug;

use super::caller::CallerId;
use super::node::NodePtr;
use crate::error::{EnlistError, Result};
use crate::guard::Guard;

// =============================================================================
// ANNOUNCEMENT TABLE
// =============================================================================
//
// One slot per caller identity that ever touched the set. Slots are prepended
// with a CAS and never removed, so a reference to a slot stays valid for the
// lifetime of the table and iteration order is stable (newest first).
//
//   head ──► [caller#7] ──► [caller#3] ──► [caller#1] ──► null
//                │               │               │
//                ▼               ▼               ▼
//           Descriptor      Descriptor      Descriptor
//           {phase, pending, node}
//
// Descriptors are immutable. Publishing a new one swaps the slot pointer and
// retires the old record through the guard, so phase/pending/node can never
// be observed torn.
//

/// Immutable announcement record.
pub(crate) struct Descriptor<T> {
    pub(crate) phase: u64,
    pub(crate) pending: bool,
    pub(crate) node: NodePtr<T>,
}

// Manual impls to avoid requiring T: Clone/Copy
impl<T> Copy for Descriptor<T> {}

impl<T> Clone for Descriptor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Descriptor<T> {
    fn alloc(phase: u64, pending: bool, node: NodePtr<T>) -> *mut Descriptor<T> {
        Box::into_raw(Box::new(Descriptor {
            phase,
            pending,
            node,
        }))
    }

    unsafe fn dealloc_ptr(ptr: *mut Descriptor<T>) {
        unsafe { drop(Box::from_raw(ptr)) };
    }

    /// Still waiting for attachment, announced no later than `phase`.
    #[inline]
    pub(crate) fn is_pending_at(&self, phase: u64) -> bool {
        self.pending && self.phase <= phase
    }
}

/// Per-caller slot of the announcement table.
pub(crate) struct Announcement<T> {
    caller: CallerId,
    descriptor: AtomicPtr<Descriptor<T>>,
    in_flight: AtomicBool,
    next: *mut Announcement<T>,
}

impl<T> Announcement<T> {
    pub(crate) fn new(caller: CallerId) -> Self {
        Announcement {
            caller,
            descriptor: AtomicPtr::new(Descriptor::alloc(0, false, ptr::null_mut())),
            in_flight: AtomicBool::new(false),
            next: ptr::null_mut(),
        }
    }

    pub(crate) fn caller(&self) -> CallerId {
        self.caller
    }

    /// Raw pointer to the current descriptor (for CAS).
    #[inline]
    pub(crate) fn descriptor_ptr(&self) -> *mut Descriptor<T> {
        self.descriptor.load(Ordering::SeqCst)
    }

    /// Copy of the current descriptor.
    ///
    /// The caller must hold a pinned read guard: the record may be retired
    /// concurrently but is not freed while pinned.
    #[inline]
    pub(crate) fn current(&self) -> Descriptor<T> {
        unsafe { *self.descriptor_ptr() }
    }

    /// Publish `{phase, pending=true, node}` for this caller's new operation.
    pub(crate) fn announce<G: Guard>(&self, phase: u64, node: NodePtr<T>, guard: &G) {
        let fresh = Descriptor::alloc(phase, true, node);
        let old = self.descriptor.swap(fresh, Ordering::SeqCst);
        unsafe { guard.defer_destroy(old, Descriptor::dealloc_ptr) };
    }

    /// CAS `expected` to a copy with `pending=false`. Returns true if this
    /// call published the completion.
    pub(crate) fn complete<G: Guard>(&self, expected: *mut Descriptor<T>, guard: &G) -> bool {
        let seen = unsafe { *expected };
        let done = Descriptor::alloc(seen.phase, false, seen.node);
        match self
            .descriptor
            .compare_exchange(expected, done, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                unsafe { guard.defer_destroy(expected, Descriptor::dealloc_ptr) };
                true
            }
            Err(_) => {
                // Never published
                unsafe { Descriptor::dealloc_ptr(done) };
                false
            }
        }
    }

    /// Take exclusive use of this slot for one operation.
    pub(crate) fn lease(&self) -> Result<SlotLease<'_, T>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| SlotLease { slot: self })
            .map_err(|_| EnlistError::CallerBusy {
                caller: self.caller,
            })
    }
}

impl<T> Drop for Announcement<T> {
    fn drop(&mut self) {
        let descriptor = *self.descriptor.get_mut();
        if !descriptor.is_null() {
            unsafe { Descriptor::dealloc_ptr(descriptor) };
        }
    }
}

/// Exclusive use of a slot, released on drop.
pub(crate) struct SlotLease<'a, T> {
    slot: &'a Announcement<T>,
}

impl<T> Drop for SlotLease<'_, T> {
    fn drop(&mut self) {
        self.slot.in_flight.store(false, Ordering::Release);
    }
}

/// Lock-free, append-only map from caller identity to announcement slot.
pub(crate) struct AnnouncementTable<T> {
    head: AtomicPtr<Announcement<T>>,
    len: AtomicUsize,
}

impl<T> AnnouncementTable<T> {
    pub(crate) fn new() -> Self {
        AnnouncementTable {
            head: AtomicPtr::new(ptr::null_mut()),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of registered callers.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub(crate) fn iter(&self) -> AnnouncementIter<'_, T> {
        AnnouncementIter {
            curr: self.head.load(Ordering::SeqCst),
            _table: PhantomData,
        }
    }

    pub(crate) fn find(&self, caller: CallerId) -> Option<&Announcement<T>> {
        self.iter().find(|slot| slot.caller == caller)
    }

    /// Return the caller's slot, registering it on first use.
    ///
    /// A failed prepend re-scans the table, so two threads racing to
    /// register the same identity end up sharing one slot.
    pub(crate) fn find_or_register(&self, caller: CallerId) -> &Announcement<T> {
        let mut fresh: Option<Box<Announcement<T>>> = None;

        loop {
            let head = self.head.load(Ordering::SeqCst);
            if let Some(slot) = self.find(caller) {
                return slot;
            }

            let mut slot = fresh
                .take()
                .unwrap_or_else(|| Box::new(Announcement::new(caller)));
            slot.next = head;
            let raw = Box::into_raw(slot);

            match self
                .head
                .compare_exchange(head, raw, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    let callers = self.len.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(%caller, callers, "registered announcement slot");
                    return unsafe { &*raw };
                }
                Err(_) => fresh = Some(unsafe { Box::from_raw(raw) }),
            }
        }
    }
}

impl<T> Drop for AnnouncementTable<T> {
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            let slot = unsafe { Box::from_raw(curr) };
            curr = slot.next;
        }
    }
}

pub(crate) struct AnnouncementIter<'a, T> {
    curr: *mut Announcement<T>,
    _table: PhantomData<&'a AnnouncementTable<T>>,
}

impl<'a, T> Iterator for AnnouncementIter<'a, T> {
    type Item = &'a Announcement<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.curr.is_null() {
            return None;
        }
        let slot = unsafe { &*self.curr };
        self.curr = slot.next;
        Some(slot)
    }
}
