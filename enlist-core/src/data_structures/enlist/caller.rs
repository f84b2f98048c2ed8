use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

// Thread identities live in the upper half of the id space so they never
// collide with identities assigned through `CallerId::new`.
const THREAD_ID_BASE: u32 = 1 << 31;

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(0);

thread_local! {
    static CURRENT_CALLER: CallerId =
        CallerId(THREAD_ID_BASE | NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
}

/// Stable identity of a caller driving operations on an `EnlistSet`.
///
/// Every identity owns one announcement slot per set. A slot is driven by one
/// thread at a time: two threads presenting the same identity concurrently is
/// rejected with `EnlistError::CallerBusy`.
///
/// `CallerId::current()` hands out one id per OS thread, assigned on first use
/// and reused for the lifetime of the thread. Runtimes that multiplex tasks
/// over threads can assign their own ids with `CallerId::new` (below 2^31)
/// and use the `*_as` operations instead.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallerId(u32);

impl CallerId {
    /// Wrap an externally assigned identity.
    ///
    /// The top bit is reserved for thread identities and is cleared.
    pub const fn new(id: u32) -> Self {
        CallerId(id & !THREAD_ID_BASE)
    }

    /// Identity of the calling thread.
    pub fn current() -> Self {
        CURRENT_CALLER.with(|id| *id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller#{}", self.0)
    }
}
