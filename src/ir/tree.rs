//! Arena-backed program tree.
//!
//! The [`IrTree`] owns every [`Node`] of a compilation session. Nodes are stored in a
//! concurrent map keyed by [`NodeId`] so that units running in parallel on disjoint subtrees can
//! edit the structure below their own node without a global lock.
//!
//! # Thread Safety
//!
//! All operations take `&self`. Concurrent edits are safe as long as they touch disjoint
//! subtrees, which the executor guarantees for the invocations of one plan step.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

use crate::{
    ir::node::{Node, NodeId, NodeKind},
    Error, Result,
};

/// The program tree of one compilation session.
#[derive(Debug)]
pub struct IrTree {
    nodes: DashMap<NodeId, Node>,
    root: NodeId,
    next_id: AtomicU32,
}

impl IrTree {
    /// Creates a tree that only contains the program root.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the program root node.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let root = NodeId::new(0);
        let nodes = DashMap::new();
        nodes.insert(
            root,
            Node {
                id: root,
                kind: NodeKind::Program,
                name: name.into(),
                parent: None,
                children: Vec::new(),
            },
        );

        Self {
            nodes,
            root,
            next_id: AtomicU32::new(1),
        }
    }

    /// Returns the id of the program root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree only holds its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Returns true if `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Returns a copy of the node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<Node> {
        map_with!(self.nodes, &id, |node: &Node| node.clone())
    }

    /// Returns the kind of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        map_with!(self.nodes, &id, |node: &Node| node.kind)
    }

    /// Returns the name of a node.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<String> {
        map_with!(self.nodes, &id, |node: &Node| node.name.clone())
    }

    /// Returns the parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        map_with!(self.nodes, &id, |node: &Node| node.parent).flatten()
    }

    /// Returns the children of a node, in declaration order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        map_with!(self.nodes, &id, |node: &Node| node.children.clone()).unwrap_or_default()
    }

    /// Renames a node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tree`] if the node does not exist.
    pub fn rename(&self, id: NodeId, name: impl Into<String>) -> Result<()> {
        let mut node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| Error::Tree(format!("Node {id} does not exist")))?;
        node.name = name.into();
        Ok(())
    }

    /// Appends a new child node.
    ///
    /// # Arguments
    ///
    /// * `parent` - The node that receives the child.
    /// * `kind` - Kind of the new node, must be containable by the parent's kind.
    /// * `name` - Name of the new node.
    ///
    /// # Returns
    ///
    /// The id of the new node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tree`] if the parent does not exist or cannot contain `kind`.
    pub fn add_child(
        &self,
        parent: NodeId,
        kind: NodeKind,
        name: impl Into<String>,
    ) -> Result<NodeId> {
        let parent_kind = self
            .kind(parent)
            .ok_or_else(|| Error::Tree(format!("Parent {parent} does not exist")))?;
        if !parent_kind.can_contain(kind) {
            return Err(Error::Tree(format!(
                "A {parent_kind} node cannot contain a {kind} node"
            )));
        }

        let id = NodeId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.nodes.insert(
            id,
            Node {
                id,
                kind,
                name: name.into(),
                parent: Some(parent),
                children: Vec::new(),
            },
        );

        // The child is inserted before the parent entry is locked, both may share a shard
        if let Some(mut parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
            Ok(id)
        } else {
            self.nodes.remove(&id);
            Err(Error::Tree(format!("Parent {parent} was removed")))
        }
    }

    /// Removes a node and its whole subtree.
    ///
    /// # Returns
    ///
    /// The ids of all removed nodes, in pre-order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tree`] for the root or an unknown node.
    pub fn remove_subtree(&self, id: NodeId) -> Result<Vec<NodeId>> {
        if id == self.root {
            return Err(Error::Tree("The program root cannot be removed".to_string()));
        }
        let parent = self
            .get(id)
            .ok_or_else(|| Error::Tree(format!("Node {id} does not exist")))?
            .parent;

        let removed = self.descendants(id);
        if let Some(parent) = parent {
            if let Some(mut parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|child| *child != id);
            }
        }
        for node in &removed {
            self.nodes.remove(node);
        }

        Ok(removed)
    }

    /// Copies the subtree rooted at `source` below `new_parent`.
    ///
    /// # Returns
    ///
    /// `(original, copy)` pairs in pre-order; the first pair is the copied root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tree`] if either node does not exist or the kinds do not nest.
    pub fn clone_subtree(&self, source: NodeId, new_parent: NodeId) -> Result<Vec<(NodeId, NodeId)>> {
        if self.is_within(new_parent, source) {
            return Err(Error::Tree(format!(
                "Cannot clone {source} into its own subtree"
            )));
        }

        let mut mapping = Vec::new();
        self.clone_into(source, new_parent, &mut mapping)?;
        Ok(mapping)
    }

    fn clone_into(
        &self,
        source: NodeId,
        parent: NodeId,
        mapping: &mut Vec<(NodeId, NodeId)>,
    ) -> Result<()> {
        let node = self
            .get(source)
            .ok_or_else(|| Error::Tree(format!("Node {source} does not exist")))?;
        let copy = self.add_child(parent, node.kind, node.name)?;
        mapping.push((source, copy));

        for child in node.children {
            self.clone_into(child, copy, mapping)?;
        }
        Ok(())
    }

    /// Returns `id` and all of its descendants in pre-order.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            let Some(children) = map_with!(self.nodes, &current, |node: &Node| node
                .children
                .clone()) else {
                continue;
            };
            result.push(current);
            stack.extend(children.into_iter().rev());
        }

        result
    }

    /// Returns the nodes of `kind` in the subtree of `id` (including `id`), in pre-order.
    #[must_use]
    pub fn descendants_of_kind(&self, id: NodeId, kind: NodeKind) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|node| self.kind(*node) == Some(kind))
            .collect()
    }

    /// Returns all live nodes of `kind`, in pre-order from the root.
    #[must_use]
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.descendants_of_kind(self.root, kind)
    }

    /// Returns true if `id` is `ancestor` or lies in its subtree.
    #[must_use]
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Returns the closest node of `kind` on the path from `id` to the root, including `id`.
    #[must_use]
    pub fn ancestor_of_kind(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.kind(node) == Some(kind) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (IrTree, NodeId, NodeId, NodeId) {
        let tree = IrTree::new("app");
        let package = tree
            .add_child(tree.root(), NodeKind::Package, "com.example")
            .unwrap();
        let ty = tree.add_child(package, NodeKind::Type, "Main").unwrap();
        let method = tree.add_child(ty, NodeKind::Method, "run").unwrap();
        tree.add_child(ty, NodeKind::Field, "count").unwrap();
        tree.add_child(method, NodeKind::Statement, "return")
            .unwrap();
        (tree, package, ty, method)
    }

    #[test]
    fn test_add_child_checks_nesting() {
        let tree = IrTree::new("app");
        let err = tree
            .add_child(tree.root(), NodeKind::Method, "bad")
            .unwrap_err();
        assert!(matches!(err, Error::Tree(_)));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_descendants_pre_order() {
        let (tree, package, ty, method) = sample();
        let all = tree.descendants(tree.root());
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], tree.root());
        assert_eq!(all[1], package);
        assert_eq!(all[2], ty);
        assert_eq!(all[3], method);
        assert_eq!(tree.nodes_of_kind(NodeKind::Method), vec![method]);
    }

    #[test]
    fn test_remove_subtree() {
        let (tree, _, ty, method) = sample();
        let removed = tree.remove_subtree(ty).unwrap();
        assert_eq!(removed.len(), 4);
        assert!(!tree.contains(method));
        assert!(tree.nodes_of_kind(NodeKind::Type).is_empty());
        assert!(tree.remove_subtree(tree.root()).is_err());
    }

    #[test]
    fn test_clone_subtree() {
        let (tree, package, ty, method) = sample();
        let mapping = tree.clone_subtree(ty, package).unwrap();
        assert_eq!(mapping.len(), 4);
        assert_eq!(mapping[0].0, ty);
        assert_eq!(mapping[1].0, method);
        assert_eq!(tree.children(package).len(), 2);
        assert_eq!(tree.name(mapping[0].1).as_deref(), Some("Main"));
        assert!(tree.clone_subtree(ty, method).is_err());
    }

    #[test]
    fn test_ancestry() {
        let (tree, package, ty, method) = sample();
        assert!(tree.is_within(method, package));
        assert!(!tree.is_within(package, method));
        assert_eq!(tree.ancestor_of_kind(method, NodeKind::Type), Some(ty));
        assert_eq!(tree.ancestor_of_kind(method, NodeKind::Field), None);
    }
}
