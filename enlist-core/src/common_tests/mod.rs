//! Test bodies shared by every `ConcurrentSet` implementation and guard.
//!
//! Integration tests in `enlist-core` run them with `DeferredGuard`, the ones
//! in `enlist-crossbeam` with `EpochGuard`.

pub mod concurrent_set_stress_tests;
