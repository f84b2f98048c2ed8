// Marked pointer operations using the two LSBs of a node pointer as tags.
//
// Bit layout on a node's `next` link:
//   Bit 0: DEAD_MARK       - the owning node is INVALID and its link is frozen
//   Bit 1: UNATTACHED_MARK - the owning node has not been spliced in front of a head yet
//
// Bit layout on a node's waiting room (`previous`):
//   0b00 + null     : idle, an announced node may claim the room
//   0b00 + non-null : occupied by the announced node racing to attach
//   0b01 + null     : retired, this node was superseded as head
//
// Nodes are at least 8-byte aligned, so both bits are always free.
//
const DEAD_MARK: usize = 0b01;
const UNATTACHED_MARK: usize = 0b10;
const ALL_MARKS: usize = 0b11;

/// A pointer that uses the two least significant bits as mark flags.
pub(crate) struct MarkedPtr<T> {
    ptr: *mut T,
}

// Manual impls to avoid requiring T: Clone/Copy
impl<T> Copy for MarkedPtr<T> {}

impl<T> Clone for MarkedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for MarkedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for MarkedPtr<T> {}

impl<T> std::fmt::Debug for MarkedPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MarkedPtr({:p}, tag={:#04b})", self.as_ptr(), self.tag())
    }
}

impl<T> MarkedPtr<T> {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a new MarkedPtr from a (possibly marked) pointer.
    #[inline]
    pub(crate) fn new(ptr: *mut T) -> Self {
        MarkedPtr { ptr }
    }

    /// Null pointer without any mark. Doubles as the idle waiting room.
    #[inline]
    pub(crate) fn null() -> Self {
        MarkedPtr {
            ptr: std::ptr::null_mut(),
        }
    }

    /// Initial `next` of a freshly announced node.
    #[inline]
    pub(crate) fn unattached() -> Self {
        MarkedPtr {
            ptr: UNATTACHED_MARK as *mut T,
        }
    }

    /// Closed waiting room of a superseded head.
    #[inline]
    pub(crate) fn retired() -> Self {
        MarkedPtr {
            ptr: DEAD_MARK as *mut T,
        }
    }

    /// Strip mark bits from a raw pointer without creating a MarkedPtr instance.
    #[inline]
    pub(crate) fn unmask(ptr: *mut T) -> *mut T {
        (ptr as usize & !ALL_MARKS) as *mut T
    }

    // =========================================================================
    // Extraction
    // =========================================================================

    /// Get the clean pointer without mark bits (the one you dereference).
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut T {
        Self::unmask(self.ptr)
    }

    /// Get the raw pointer with mark bits intact (for CAS operations).
    #[inline]
    pub(crate) fn as_raw(&self) -> *mut T {
        self.ptr
    }

    #[inline]
    fn tag(&self) -> usize {
        self.ptr as usize & ALL_MARKS
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Check if DEAD-marked (bit 0).
    #[inline]
    pub(crate) fn is_dead(&self) -> bool {
        (self.ptr as usize & DEAD_MARK) != 0
    }

    /// Check if UNATTACHED-marked (bit 1).
    #[inline]
    pub(crate) fn is_unattached(&self) -> bool {
        (self.ptr as usize & UNATTACHED_MARK) != 0
    }

    /// Waiting room predicate: null and untagged.
    #[inline]
    pub(crate) fn is_idle(&self) -> bool {
        self.ptr.is_null()
    }

    /// Waiting room predicate: null and tagged retired.
    #[inline]
    pub(crate) fn is_retired(&self) -> bool {
        self.as_ptr().is_null() && self.is_dead()
    }

    // =========================================================================
    // Transformers
    // =========================================================================

    /// Create DEAD-marked version of this pointer.
    #[inline]
    pub(crate) fn with_dead_mark(&self) -> Self {
        MarkedPtr {
            ptr: (self.ptr as usize | DEAD_MARK) as *mut T,
        }
    }
}
