use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use tracing::trace;

use super::announcement::{Announcement, AnnouncementTable};
use super::caller::CallerId;
use super::node::{Node, NodePtr, NodeState};
use crate::data_structures::ConcurrentSet;
use crate::error::Result;
use crate::guard::Guard;

// =============================================================================
// ENLIST SET
// =============================================================================
//
// Unordered set on a singly linked chain. Every mutation prepends a node and
// then walks forward from it to decide the outcome:
//
//   head ──► [REM 7] ──► [DATA 3] ──► [INV 7] ──► [DATA 7] ──► [sentinel]
//              ▲
//          remove(7) enlisted here, walks right, claims DATA 7
//
// =============================================================================
// ENLIST (wait-free prepend)
// =============================================================================
//
// The head's `previous` slot is a single-slot waiting room. An announced node
// P becomes the new head in four idempotent steps, any of which may be run by
// any helper:
//
//   claim:  head.previous  idle ──► P              (help_enlist)
//   (a)     descriptor     pending ──► done        (help_finish)
//   (b)     P.next         UNATTACHED ──► head
//   (c)     chain head     head ──► P
//   (d)     head.previous  P ──► RETIRED
//
//        ┌─────────┐  previous   ┌──────┐
//        │  head   │ ──────────► │  P   │   P waiting, not yet reachable
//        └─────────┘             └──────┘
//
//        ┌──────┐  next   ┌─────────┐
//        │  P   │ ──────► │ old head│     after (b)(c)(d), room retired
//        └──────┘         └─────────┘
//
// A retired room is never idle again, so a stale helper can never claim the
// room of a head that has already been superseded, and an announced node can
// sit in at most one room.
//
// Every enlist sweeps all announcement slots and helps each pending
// announcement with a phase no later than its own before returning, so a
// caller that stalls right after announcing still gets attached by the next
// caller to come along.
//
// =============================================================================
// LAZY UNLINK
// =============================================================================
//
// INVALID nodes are unlinked by whichever traversal reaches them:
//
//   1. DEAD-mark curr.next (freezes curr's link)
//   2. CAS pred.next from curr to curr's successor
//
// Only the winner of step 2 retires curr. A DEAD-marked pred makes step 2 fail,
// so nothing is ever unlinked through a node that is itself unlinked. A
// failed unlink is not retried: the traversal moves on to the successor and a
// later traversal will pick the node up.
//

/// Inspection record for one chain node, produced by `EnlistSet::snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot<T> {
    pub value: T,
    pub state: NodeState,
    pub owner: CallerId,
}

/// Wait-free enlisting concurrent set.
///
/// Enlisting a node at the front of the chain is wait-free; resolving an
/// insert or remove against the rest of the chain is lock-free. No operation
/// ever blocks on another.
///
/// `G` selects the memory reclamation strategy (`DeferredGuard` for tests,
/// `EpochGuard` from `enlist-crossbeam` for production).
///
pub struct EnlistSet<T, G: Guard> {
    head: AtomicPtr<Node<T>>,
    phase: AtomicU64,
    announcements: AnnouncementTable<T>,
    /// Shared guard instance for deferred destruction.
    guard: G,
    _marker: PhantomData<T>,
}

impl<T, G> EnlistSet<T, G>
where
    T: Eq + Clone,
    G: Guard,
{
    pub fn new() -> Self {
        EnlistSet {
            head: AtomicPtr::new(Node::alloc_sentinel()),
            phase: AtomicU64::new(0),
            announcements: AnnouncementTable::new(),
            guard: G::default(),
            _marker: PhantomData,
        }
    }

    /// Get the shared guard instance for this set.
    pub fn guard(&self) -> &G {
        &self.guard
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Add `value` if no live equal value exists. Returns true if it was added.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already has an operation in flight on
    /// this set, which only happens when `T`'s `Eq` or `Clone` impl calls
    /// back into the same set.
    ///
    pub fn try_add(&self, value: T) -> bool {
        match self.try_add_as(CallerId::current(), value) {
            Ok(added) => added,
            Err(err) => panic!("{err}"),
        }
    }

    /// Remove a live value equal to `value`, returning the stored value.
    ///
    /// # Panics
    ///
    /// Same re-entrancy condition as `try_add`.
    ///
    pub fn remove(&self, value: &T) -> Option<T> {
        match self.remove_as(CallerId::current(), value) {
            Ok(removed) => removed,
            Err(err) => panic!("{err}"),
        }
    }

    /// `try_add` on behalf of an externally assigned identity.
    pub fn try_add_as(&self, caller: CallerId, value: T) -> Result<bool> {
        let slot = self.announcements.find_or_register(caller);
        let _lease = slot.lease()?;
        let _pin = G::pin();

        let node = Node::alloc(value, NodeState::Inserting, slot);
        self.enlist(slot, node);

        let node_ref = unsafe { &*node };
        let Some(value) = node_ref.value() else {
            unreachable!("announced nodes always carry a value")
        };

        let inserted = self.help_insert(node, value);
        Ok(self.settle_insert(node, value, inserted))
    }

    /// `remove` on behalf of an externally assigned identity.
    pub fn remove_as(&self, caller: CallerId, value: &T) -> Result<Option<T>> {
        let slot = self.announcements.find_or_register(caller);
        let _lease = slot.lease()?;
        let _pin = G::pin();

        let marker = Node::alloc(value.clone(), NodeState::Removing, slot);
        self.enlist(slot, marker);

        let removed = self.help_remove(marker, value);

        // The marker never holds committed data
        unsafe { (*marker).invalidate() };

        Ok(removed)
    }

    /// Check whether a live (INSERTING or DATA) value equal to `value` exists.
    pub fn contains(&self, value: &T) -> bool {
        let _pin = G::pin();
        !self.find_live(value).is_null()
    }

    /// Guarded reference to the stored value equal to `value`.
    pub fn find(&self, value: &T) -> Option<G::GuardedRef<'_, T>> {
        let _pin = G::pin();
        let node = self.find_live(value);
        if node.is_null() {
            return None;
        }

        let stored = unsafe { (*node).value()? } as *const T;
        // make_ref takes its own protection before _pin is released
        Some(unsafe { G::make_ref(stored) })
    }

    /// Number of live values at the time of the scan.
    pub fn len(&self) -> usize {
        let _pin = G::pin();
        let mut count = 0;
        self.for_each_node(|node| {
            if node.state().is_live() {
                count += 1;
            }
        });
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones of the live values, in chain order (most recent first).
    pub fn values(&self) -> Vec<T> {
        let _pin = G::pin();
        let mut values = Vec::new();
        self.for_each_node(|node| {
            if node.state().is_live() {
                values.extend(node.value().cloned());
            }
        });
        values
    }

    /// Every value-carrying node reachable from the head, including INVALID
    /// nodes that have not been unlinked yet.
    pub fn snapshot(&self) -> Vec<NodeSnapshot<T>> {
        let _pin = G::pin();
        let mut nodes = Vec::new();
        self.for_each_node(|node| {
            if let (Some(value), Some(owner)) = (node.value(), node.owner()) {
                nodes.push(NodeSnapshot {
                    value: value.clone(),
                    state: node.state(),
                    owner: owner.caller(),
                });
            }
        });
        nodes
    }

    /// Floyd cycle check over the chain. Diagnostic only.
    pub fn is_acyclic(&self) -> bool {
        let _pin = G::pin();
        let mut slow = self.head.load(Ordering::SeqCst);
        let mut fast = slow;

        loop {
            for _ in 0..2 {
                if fast.is_null() {
                    return true;
                }
                fast = unsafe { (*fast).next().as_ptr() };
            }
            slow = unsafe { (*slow).next().as_ptr() };
            if !fast.is_null() && slow == fast {
                return false;
            }
        }
    }

    /// Number of caller identities that ever operated on this set.
    pub fn callers(&self) -> usize {
        self.announcements.len()
    }

    // =========================================================================
    // Enlist protocol
    // =========================================================================

    /// Attach `node` at the front of the chain. Returns once it is reachable
    /// from the head.
    fn enlist(&self, slot: &Announcement<T>, node: NodePtr<T>) {
        let phase = self.phase.fetch_add(1, Ordering::SeqCst) + 1;
        slot.announce(phase, node, &self.guard);

        for announcement in self.announcements.iter() {
            self.help_enlist(announcement, phase);
        }

        self.help_finish();
    }

    /// Drive `slot`'s announcement into the waiting room while it is pending
    /// with a phase no later than `phase`.
    fn help_enlist(&self, slot: &Announcement<T>, phase: u64) {
        loop {
            let head = self.head.load(Ordering::SeqCst);
            let room = unsafe { (*head).waiting_room() };

            let announced = slot.current();
            if !announced.is_pending_at(phase) {
                return;
            }

            if head != self.head.load(Ordering::SeqCst) {
                continue;
            }

            if room.is_idle() {
                if unsafe { (*head).claim_waiting_room(announced.node) } {
                    self.help_finish();
                    return;
                }
            } else if !room.is_retired() {
                // Drain the current occupant first
                self.help_finish();
            }
        }
    }

    /// Complete the attach of whichever node occupies the head's waiting room.
    fn help_finish(&self) {
        let head = self.head.load(Ordering::SeqCst);
        let room = unsafe { (*head).waiting_room() };
        if room.is_idle() || room.is_retired() {
            return;
        }

        let waiting = room.as_ptr();
        let Some(owner) = (unsafe { (*waiting).owner() }) else {
            return;
        };

        let descriptor = owner.descriptor_ptr();
        let announced = unsafe { *descriptor };
        if head != self.head.load(Ordering::SeqCst) || announced.node != waiting {
            return;
        }

        if announced.pending {
            owner.complete(descriptor, &self.guard);
        }

        unsafe {
            if (*waiting).next().is_unattached() {
                (*waiting).attach(head);
            }

            if self
                .head
                .compare_exchange(head, waiting, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                trace!(
                    owner = %owner.caller(),
                    phase = announced.phase,
                    "attached announced node"
                );
            }

            (*head).retire_waiting_room();
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Move an enlisted INSERTING node to its terminal state and return the
    /// outcome of the add.
    fn settle_insert(&self, node: NodePtr<T>, value: &T, inserted: bool) -> bool {
        let node_ref = unsafe { &*node };
        let settled = if inserted {
            NodeState::Data
        } else {
            NodeState::Invalid
        };

        if node_ref.transition(NodeState::Inserting, settled).is_ok() || inserted {
            return inserted;
        }

        // A remover claimed this rejected node and already reported it as
        // removed. Take out the live duplicate in its place; if no duplicate
        // is left, the claim consumed this node and the add stands.
        let cleaned = self.help_remove(node, value);
        node_ref.invalidate();

        cleaned.is_none()
    }

    /// Decide an insert of `value` announced at `start`. True if no live
    /// equal value lies behind it.
    fn help_insert(&self, start: NodePtr<T>, value: &T) -> bool {
        let mut pred = start;
        let mut curr = unsafe { (*pred).next().as_ptr() };

        while !curr.is_null() {
            let node = unsafe { &*curr };
            match node.state() {
                NodeState::Invalid => curr = self.unlink(pred, curr),
                _ if !node.holds(value) => {
                    pred = curr;
                    curr = node.next().as_ptr();
                }
                // The conflicting occupant is dying
                NodeState::Removing => return true,
                NodeState::Inserting | NodeState::Data => return false,
            }
        }

        true
    }

    /// Resolve a removal of `value` announced at `start`, returning the
    /// captured stored value if this call took it out.
    fn help_remove(&self, start: NodePtr<T>, value: &T) -> Option<T> {
        let mut pred = start;
        let mut curr = unsafe { (*pred).next().as_ptr() };

        while !curr.is_null() {
            let node = unsafe { &*curr };
            match node.state() {
                NodeState::Invalid => curr = self.unlink(pred, curr),
                _ if !node.holds(value) => {
                    pred = curr;
                    curr = node.next().as_ptr();
                }
                // First remover wins
                NodeState::Removing => return None,
                NodeState::Inserting => {
                    // Race the inserter's own INSERTING -> DATA
                    if node
                        .transition(NodeState::Inserting, NodeState::Removing)
                        .is_ok()
                    {
                        let captured = node.value().cloned();
                        node.invalidate();
                        return captured;
                    }
                    // Lost: re-examine the same node
                }
                NodeState::Data => {
                    if node.transition(NodeState::Data, NodeState::Invalid).is_ok() {
                        return node.value().cloned();
                    }
                    // Another remover got there first; the node is INVALID now
                }
            }
        }

        None
    }

    /// First live node holding `value`, or null. REMOVING nodes are passed over.
    fn find_live(&self, value: &T) -> NodePtr<T> {
        let mut curr = self.head.load(Ordering::SeqCst);

        while !curr.is_null() {
            let node = unsafe { &*curr };
            if node.holds(value) && node.state().is_live() {
                return curr;
            }
            curr = node.next().as_ptr();
        }

        std::ptr::null_mut()
    }

    fn for_each_node<F>(&self, mut f: F)
    where
        F: FnMut(&Node<T>),
    {
        let mut curr = self.head.load(Ordering::SeqCst);
        while !curr.is_null() {
            let node = unsafe { &*curr };
            f(node);
            curr = node.next().as_ptr();
        }
    }
}

impl<T, G> EnlistSet<T, G>
where
    G: Guard,
{
    /// Unlink the INVALID node `curr` following `pred` and return its successor.
    fn unlink(&self, pred: NodePtr<T>, curr: NodePtr<T>) -> NodePtr<T> {
        unsafe {
            let successor = (*curr).mark_dead();
            if (*pred).cas_next(curr, successor) {
                self.guard.defer_destroy(curr, Node::dealloc_ptr);
            }
            successor
        }
    }
}

impl<T, G> Default for EnlistSet<T, G>
where
    T: Eq + Clone,
    G: Guard,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G> ConcurrentSet<T> for EnlistSet<T, G>
where
    T: Eq + Clone,
    G: Guard,
{
    fn try_add(&self, value: T) -> bool {
        EnlistSet::try_add(self, value)
    }

    fn remove(&self, value: &T) -> Option<T> {
        EnlistSet::remove(self, value)
    }

    fn contains(&self, value: &T) -> bool {
        EnlistSet::contains(self, value)
    }

    fn len(&self) -> usize {
        EnlistSet::len(self)
    }
}

impl<T, G: Guard> Drop for EnlistSet<T, G> {
    fn drop(&mut self) {
        // Everything still reachable from the head was never retired.
        // Retired nodes are owned by the guard.
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            unsafe {
                let next = (*curr).next().as_ptr();
                Node::dealloc_ptr(curr);
                curr = next;
            }
        }
    }
}

// Values move between threads (inserted on one, captured or dropped on another)
unsafe impl<T: Send + Sync, G: Guard> Send for EnlistSet<T, G> {}
unsafe impl<T: Send + Sync, G: Guard> Sync for EnlistSet<T, G> {}
