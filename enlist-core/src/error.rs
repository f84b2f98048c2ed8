//! Errors surfaced by `EnlistSet` operations.
//!
//! The set's algorithm resolves every race through compare-and-swap outcomes,
//! so the only failure a caller can observe is at the identity boundary.

use thiserror::Error;

use crate::data_structures::enlist::CallerId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnlistError {
    /// Another thread is currently driving an operation with the same identity.
    ///
    /// Each identity owns a single announcement slot, so two in-flight
    /// operations under one identity would overwrite each other's announcement.
    #[error("{caller} already has an operation in flight")]
    CallerBusy { caller: CallerId },
}

pub type Result<T> = std::result::Result<T, EnlistError>;
