//! Analysis state attached to IR nodes.
//!
//! - [`Tag`] - zero-data boolean fact, scoped to one [`NodeKind`](crate::ir::NodeKind)
//! - [`Marker`] - typed, data-carrying fact with a mandatory [`ClonePolicy`]
//! - [`Fact`] / [`TagState`] - the vocabulary and state the planner works with
//! - [`StateStore`] - per-node storage of both, owned by the session

mod marker;
mod store;
mod tag;

pub use marker::{ClonePolicy, Marker, MarkerMap};
pub(crate) use store::MarkerChanges;
pub use store::{NodeState, StateStore};
pub use tag::{Fact, MarkerKind, Tag, TagState};
