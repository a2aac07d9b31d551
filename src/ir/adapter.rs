//! Granularity adapters.
//!
//! A plan step is declared at one granularity, while execution always starts from the program
//! root. Adapters bridge the two: each [`Adapter`] maps a coarse node to the finer nodes it
//! contains, and an [`AdapterSet`] chains them from [`NodeKind::Program`] down to whatever
//! granularity a step needs.
//!
//! Expansion is recomputed for every step, so nodes added or removed by earlier steps are
//! always reflected.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};

use crate::{
    ir::{
        node::{NodeId, NodeKind},
        tree::IrTree,
    },
    Error, Result,
};

/// Maps a coarse node to the finer-grained nodes it contains.
///
/// Implementations must be pure and deterministic functions of the current tree shape, and the
/// returned subtrees must be disjoint.
pub trait Adapter: Send + Sync {
    /// Granularity of the input node.
    fn source(&self) -> NodeKind;

    /// Granularity of the produced nodes.
    fn target(&self) -> NodeKind;

    /// Expands `node` into the contained nodes of [`Adapter::target`] granularity.
    fn expand(&self, tree: &IrTree, node: NodeId) -> Vec<NodeId>;
}

/// Default adapter: the outermost descendants of the target kind.
///
/// Nested nodes of the target kind (inner types, nested statements) belong to the subtree of
/// their outermost enclosing node and are not yielded separately, which keeps the expanded
/// subtrees disjoint.
#[derive(Debug, Clone, Copy)]
pub struct DescendantAdapter {
    source: NodeKind,
    target: NodeKind,
}

impl DescendantAdapter {
    /// Creates an adapter from `source` to `target` nodes.
    #[must_use]
    pub fn new(source: NodeKind, target: NodeKind) -> Self {
        Self { source, target }
    }
}

impl Adapter for DescendantAdapter {
    fn source(&self) -> NodeKind {
        self.source
    }

    fn target(&self) -> NodeKind {
        self.target
    }

    fn expand(&self, tree: &IrTree, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = tree.children(node).into_iter().rev().collect();

        while let Some(current) = stack.pop() {
            if tree.kind(current) == Some(self.target) {
                result.push(current);
                continue;
            }
            stack.extend(tree.children(current).into_iter().rev());
        }

        result
    }
}

/// The adapters available to the executor, keyed by `(source, target)`.
#[derive(Clone)]
pub struct AdapterSet {
    adapters: BTreeMap<(NodeKind, NodeKind), Arc<dyn Adapter>>,
}

impl Default for AdapterSet {
    /// Program → Package → Type → {Method, Field}, Method → Statement.
    fn default() -> Self {
        let mut set = Self::empty();
        for (source, target) in [
            (NodeKind::Program, NodeKind::Package),
            (NodeKind::Package, NodeKind::Type),
            (NodeKind::Type, NodeKind::Method),
            (NodeKind::Type, NodeKind::Field),
            (NodeKind::Method, NodeKind::Statement),
        ] {
            set.insert(DescendantAdapter::new(source, target));
        }
        set
    }
}

impl AdapterSet {
    /// Creates a set without any adapter.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Adds or replaces the adapter for its `(source, target)` pair.
    pub fn insert(&mut self, adapter: impl Adapter + 'static) {
        self.adapters
            .insert((adapter.source(), adapter.target()), Arc::new(adapter));
    }

    /// Returns the shortest adapter chain from the program root to `kind`.
    ///
    /// Breadth-first over kinds in declaration order, so the chain is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAdapter`] if `kind` cannot be reached.
    pub fn chain(&self, kind: NodeKind) -> Result<Vec<Arc<dyn Adapter>>> {
        if kind == NodeKind::Program {
            return Ok(Vec::new());
        }

        let mut previous: BTreeMap<NodeKind, (NodeKind, Arc<dyn Adapter>)> = BTreeMap::new();
        let mut seen = BTreeSet::from([NodeKind::Program]);
        let mut queue = VecDeque::from([NodeKind::Program]);

        while let Some(current) = queue.pop_front() {
            if current == kind {
                break;
            }
            for ((source, target), adapter) in &self.adapters {
                if *source == current && seen.insert(*target) {
                    previous.insert(*target, (current, adapter.clone()));
                    queue.push_back(*target);
                }
            }
        }

        let mut chain = Vec::new();
        let mut current = kind;
        while current != NodeKind::Program {
            let (source, adapter) = previous
                .get(&current)
                .ok_or(Error::MissingAdapter(kind))?;
            chain.push(adapter.clone());
            current = *source;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Expands the program root into all nodes of granularity `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAdapter`] if `kind` cannot be reached.
    pub fn expand_root(&self, tree: &IrTree, kind: NodeKind) -> Result<Vec<NodeId>> {
        let mut nodes = vec![tree.root()];
        for adapter in self.chain(kind)? {
            nodes = nodes
                .into_iter()
                .flat_map(|node| adapter.expand(tree, node))
                .collect();
        }
        Ok(nodes)
    }
}
