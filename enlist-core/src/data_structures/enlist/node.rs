use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use super::announcement::Announcement;
use crate::data_structures::MarkedPtr;

pub(crate) type NodePtr<T> = *mut Node<T>;

/// Lifecycle of a chain node.
///
/// ```text
///  INSERTING ──► DATA ──► INVALID
///      │                     ▲
///      └──────► REMOVING ────┘
/// ```
///
/// Remove markers start directly in REMOVING. INVALID is terminal.
///
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// An add is in flight; counts as present for `contains`.
    Inserting = 0,
    /// Committed value.
    Data = 1,
    /// A delete is in flight against this value.
    Removing = 2,
    /// Logically dead, eligible for lazy unlinking.
    Invalid = 3,
}

impl NodeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => NodeState::Inserting,
            1 => NodeState::Data,
            2 => NodeState::Removing,
            _ => NodeState::Invalid,
        }
    }

    /// INSERTING and DATA nodes represent a present value.
    pub fn is_live(&self) -> bool {
        matches!(self, NodeState::Inserting | NodeState::Data)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Inserting => "INSERTING",
            NodeState::Data => "DATA",
            NodeState::Removing => "REMOVING",
            NodeState::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// Element of the enlist chain.
///
/// `next` carries the DEAD and UNATTACHED marks, `previous` is the waiting
/// room used while the node is the chain head (see `MarkedPtr`).
///
pub(crate) struct Node<T> {
    value: Option<T>,
    state: AtomicU8,
    next: AtomicPtr<Node<T>>,
    previous: AtomicPtr<Node<T>>,
    owner: *const Announcement<T>,
}

impl<T> Node<T> {
    /// Allocate an announced node. Its `next` stays UNATTACHED until the
    /// enlist protocol splices it in front of a head.
    pub(crate) fn alloc(value: T, state: NodeState, owner: &Announcement<T>) -> NodePtr<T> {
        Box::into_raw(Box::new(Node {
            value: Some(value),
            state: AtomicU8::new(state as u8),
            next: AtomicPtr::new(MarkedPtr::unattached().as_raw()),
            previous: AtomicPtr::new(ptr::null_mut()),
            owner: owner as *const Announcement<T>,
        }))
    }

    /// Allocate the value-less node that starts every chain.
    pub(crate) fn alloc_sentinel() -> NodePtr<T> {
        Box::into_raw(Box::new(Node {
            value: None,
            state: AtomicU8::new(NodeState::Invalid as u8),
            next: AtomicPtr::new(ptr::null_mut()),
            previous: AtomicPtr::new(ptr::null_mut()),
            owner: ptr::null(),
        }))
    }

    /// Deallocate a node created by `alloc` or `alloc_sentinel`.
    ///
    /// # Safety
    /// - `ptr` must come from `Node::alloc*` and must not be freed twice
    /// - The node must be unreachable for every thread that could still deref it
    pub(crate) unsafe fn dealloc_ptr(ptr: NodePtr<T>) {
        unsafe { drop(Box::from_raw(ptr)) };
    }

    // =========================================================================
    // Value and owner
    // =========================================================================

    pub(crate) fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// The sentinel holds nothing and never matches.
    #[inline]
    pub(crate) fn holds(&self, value: &T) -> bool
    where
        T: Eq,
    {
        self.value.as_ref() == Some(value)
    }

    /// Announcement slot of the caller that created this node.
    pub(crate) fn owner(&self) -> Option<&Announcement<T>> {
        // Slots are never freed before the set itself.
        unsafe { self.owner.as_ref() }
    }

    // =========================================================================
    // State accessors
    // =========================================================================

    #[inline]
    pub(crate) fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// CAS the state from `expected` to `new`, returning the observed state on failure.
    #[inline]
    pub(crate) fn transition(
        &self,
        expected: NodeState,
        new: NodeState,
    ) -> Result<(), NodeState> {
        self.state
            .compare_exchange(
                expected as u8,
                new as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(NodeState::from_u8)
    }

    /// Force the terminal state.
    #[inline]
    pub(crate) fn invalidate(&self) {
        self.state.store(NodeState::Invalid as u8, Ordering::SeqCst)
    }

    // =========================================================================
    // Next pointer accessors
    // =========================================================================

    /// Load next pointer with its marks.
    #[inline]
    pub(crate) fn next(&self) -> MarkedPtr<Node<T>> {
        MarkedPtr::new(self.next.load(Ordering::SeqCst))
    }

    /// Splice this node in front of `head`. Only the first caller succeeds;
    /// every later attempt finds the UNATTACHED mark gone.
    #[inline]
    pub(crate) fn attach(&self, head: NodePtr<T>) -> bool {
        self.next
            .compare_exchange(
                MarkedPtr::<Node<T>>::unattached().as_raw(),
                head,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// CAS an unmarked next pointer. Fails if this node is DEAD-marked.
    #[inline]
    pub(crate) fn cas_next(&self, expected: NodePtr<T>, new: NodePtr<T>) -> bool {
        self.next
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Freeze the link of an INVALID node and return its successor.
    ///
    /// Once DEAD-marked, no CAS through this node as a predecessor can
    /// succeed, so an unlinked node can never be re-linked.
    pub(crate) fn mark_dead(&self) -> NodePtr<T> {
        let mut next = self.next();
        loop {
            if next.is_dead() {
                return next.as_ptr();
            }
            match self.next.compare_exchange(
                next.as_raw(),
                next.with_dead_mark().as_raw(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next.as_ptr(),
                Err(actual) => next = MarkedPtr::new(actual),
            }
        }
    }

    // =========================================================================
    // Waiting room
    // =========================================================================

    #[inline]
    pub(crate) fn waiting_room(&self) -> MarkedPtr<Node<T>> {
        MarkedPtr::new(self.previous.load(Ordering::SeqCst))
    }

    /// CAS the waiting room from idle to `announced`.
    #[inline]
    pub(crate) fn claim_waiting_room(&self, announced: NodePtr<T>) -> bool {
        self.previous
            .compare_exchange(
                MarkedPtr::<Node<T>>::null().as_raw(),
                announced,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Close the waiting room after this node was superseded as head.
    #[inline]
    pub(crate) fn retire_waiting_room(&self) {
        self.previous
            .store(MarkedPtr::<Node<T>>::retired().as_raw(), Ordering::SeqCst)
    }
}
