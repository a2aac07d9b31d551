//! Tree-shaped intermediate representation.
//!
//! The scheduler never looks inside nodes; it only needs identity, granularity and containment
//! to fan a plan step out over the right nodes and to scope tag effects to subtrees.
//!
//! # Key Types
//!
//! - [`IrTree`] - Arena of all nodes of a session, safe for concurrent subtree edits
//! - [`Node`], [`NodeId`], [`NodeKind`] - Node identity and granularity
//! - [`Adapter`], [`AdapterSet`] - Expansion of coarse nodes into finer ones

mod adapter;
mod node;
mod tree;

pub use adapter::{Adapter, AdapterSet, DescendantAdapter};
pub use node::{Node, NodeId, NodeKind};
pub use tree::IrTree;
