pub mod common_tests;
pub mod data_structures;
pub mod error;
pub mod guard;

pub use data_structures::{CallerId, ConcurrentSet, EnlistSet, NodeSnapshot, NodeState};
pub use error::{EnlistError, Result};
// Re-export guard types for convenience
pub use guard::{DeferredGuard, DeferredRef, Guard};

/*

cargo llvm-cov --html

cargo valgrind test

*/
