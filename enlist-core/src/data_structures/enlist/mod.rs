//! Wait-free enlisting set.
//!
//! - [`EnlistSet`] - the set itself, generic over its reclamation `Guard`
//! - [`CallerId`] - identity that owns an announcement slot
//! - [`NodeState`] - per-node lifecycle, visible through `EnlistSet::snapshot`

mod announcement;
mod caller;
mod enlist_set;
mod node;

pub use caller::CallerId;
pub use enlist_set::{EnlistSet, NodeSnapshot};
pub use node::NodeState;
