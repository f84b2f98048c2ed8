//! Crossbeam-based reclamation for enlist sets.
//!
//! This crate provides `EpochGuard`, an implementation of the `Guard` trait
//! using crossbeam-epoch, and the `EpochEnlistSet` alias built on it.
//!
//! # Usage
//!
//! ```ignore
//! use enlist_crossbeam::EpochEnlistSet;
//!
//! let set: EpochEnlistSet<i32> = EpochEnlistSet::new();
//! set.try_add(42);
//! ```

pub mod epoch_guard;

use enlist_core::EnlistSet;

// Export the Guard implementation
pub use epoch_guard::{EpochGuard, EpochRef};

/// `EnlistSet` with epoch-based memory reclamation.
pub type EpochEnlistSet<T> = EnlistSet<T, EpochGuard>;
