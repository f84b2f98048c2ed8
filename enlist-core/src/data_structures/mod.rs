//! Data structures for concurrent collections.
//!
//! # Organization
//!
//! - [`enlist`] - Wait-free enlisting set (EnlistSet)
//! - [`concurrent_set`] - The `ConcurrentSet` trait
//! - [`internal`] - Internal implementation details (pub(crate))

pub mod concurrent_set;
pub mod enlist;
pub(crate) mod internal;

pub use concurrent_set::ConcurrentSet;
pub use enlist::{CallerId, EnlistSet, NodeSnapshot, NodeState};

// MarkedPtr stays pub(crate) - truly internal implementation detail
pub(crate) use internal::MarkedPtr;
