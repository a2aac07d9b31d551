//! IR node identity and granularity.

use std::fmt;

use strum::{Display, EnumCount, EnumIter};

/// Identifier of a node in an [`IrTree`](crate::ir::IrTree).
///
/// Ids are allocated monotonically by the tree and never reused within a session, so an id that
/// refers to a removed node simply stops resolving.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Creates a new id from a raw value
    #[must_use]
    pub fn new(value: u32) -> Self {
        NodeId(value)
    }

    /// Returns the raw id value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId(value)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Granularity of an IR node, from coarsest to finest.
///
/// The declaration order is the containment order: a node may only have children of a finer
/// kind, with the single exception of statements, which nest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, EnumCount,
)]
pub enum NodeKind {
    /// The whole compilation session (tree root)
    Program,
    /// A package / namespace
    Package,
    /// A type declaration
    Type,
    /// A method of a type
    Method,
    /// A field of a type
    Field,
    /// A statement or expression inside a method body
    Statement,
}

impl NodeKind {
    /// Returns true if a node of this kind may directly contain a node of kind `child`.
    #[must_use]
    pub fn can_contain(self, child: NodeKind) -> bool {
        match self {
            NodeKind::Program => child == NodeKind::Package,
            NodeKind::Package => child == NodeKind::Type,
            NodeKind::Type => matches!(child, NodeKind::Type | NodeKind::Method | NodeKind::Field),
            NodeKind::Method => child == NodeKind::Statement,
            NodeKind::Field => false,
            NodeKind::Statement => child == NodeKind::Statement,
        }
    }

    /// Returns true if nodes of kind `other` can appear in the subtree of a node of this kind
    /// (including the node itself).
    #[must_use]
    pub fn encloses(self, other: NodeKind) -> bool {
        if self == other {
            return true;
        }
        match self {
            NodeKind::Program => true,
            NodeKind::Package => other > NodeKind::Package,
            NodeKind::Type => matches!(
                other,
                NodeKind::Method | NodeKind::Field | NodeKind::Statement
            ),
            NodeKind::Method => other == NodeKind::Statement,
            NodeKind::Field | NodeKind::Statement => false,
        }
    }
}

/// A node of the program tree.
///
/// Nodes own nothing but their identity, a name and the ids of their children; tags and
/// markers live in the [`StateStore`](crate::state::StateStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Identity within the owning tree
    pub id: NodeId,
    /// Granularity
    pub kind: NodeKind,
    /// Source-level name (package path, type name, method name, ...)
    pub name: String,
    /// Parent node, `None` only for the program root
    pub parent: Option<NodeId>,
    /// Children in declaration order
    pub children: Vec<NodeId>,
}
