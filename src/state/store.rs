//! Per-node tag and marker storage.

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::{
    ir::NodeId,
    state::{
        marker::{AnyMarker, Marker, MarkerMap},
        tag::{MarkerKind, Tag, TagState},
    },
};

/// The analysis state of one node.
#[derive(Debug, Clone, Default)]
pub struct NodeState {
    /// Tags present on the node
    pub tags: TagState,
    /// Markers attached to the node
    pub markers: MarkerMap,
}

/// Staged marker changes for one node: `Some` puts a marker, `None` removes the kind.
pub(crate) type MarkerChanges = BTreeMap<MarkerKind, Option<Box<dyn AnyMarker>>>;

/// Storage of tags and markers for every node of a session.
///
/// Marker access is public so that persistence code can read and write marker contents through
/// [`StateStore::marker`], [`StateStore::put_marker`] and [`StateStore::remove_marker`]. Tags
/// are read-only from the outside: they change only through the declared effects of the units
/// the executor runs, or through [`Session::seed`](crate::compiler::Session::seed) before
/// execution starts.
///
/// While a plan executes the session is exclusively borrowed by the executor, so no code
/// outside a unit invocation can touch the store.
#[derive(Debug, Default)]
pub struct StateStore {
    nodes: DashMap<NodeId, NodeState>,
}

impl StateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `tag` is present on `node`.
    #[must_use]
    pub fn has_tag(&self, node: NodeId, tag: Tag) -> bool {
        map_with!(self.nodes, &node, |state: &NodeState| state.tags.contains(tag))
            .unwrap_or(false)
    }

    /// Returns the tags of `node`.
    #[must_use]
    pub fn tags(&self, node: NodeId) -> TagState {
        map_with!(self.nodes, &node, |state: &NodeState| state.tags.clone()).unwrap_or_default()
    }

    /// Returns a clone of the marker of type `M` on `node`.
    #[must_use]
    pub fn marker<M: Marker>(&self, node: NodeId) -> Option<M> {
        self.nodes
            .get(&node)
            .and_then(|state| state.markers.get::<M>().cloned())
    }

    /// Attaches a marker to `node`, returning the marker of the same kind it replaced.
    pub fn put_marker<M: Marker>(&self, node: NodeId, marker: M) -> Option<M> {
        self.nodes.entry(node).or_default().markers.put(marker)
    }

    /// Removes the marker of type `M` from `node`.
    pub fn remove_marker<M: Marker>(&self, node: NodeId) -> Option<M> {
        self.nodes
            .get_mut(&node)
            .and_then(|mut state| state.markers.remove::<M>())
    }

    /// Returns true if `node` carries a marker of `kind`.
    #[must_use]
    pub fn has_marker(&self, node: NodeId, kind: MarkerKind) -> bool {
        map_with!(self.nodes, &node, |state: &NodeState| state.markers.contains(kind))
            .unwrap_or(false)
    }

    /// Returns the kinds of markers present on `node`.
    #[must_use]
    pub fn marker_kinds(&self, node: NodeId) -> Vec<MarkerKind> {
        map_with!(self.nodes, &node, |state: &NodeState| state.markers.kinds()).unwrap_or_default()
    }

    /// Returns a snapshot of the whole state of `node`.
    #[must_use]
    pub fn snapshot(&self, node: NodeId) -> Option<NodeState> {
        map_with!(self.nodes, &node, |state: &NodeState| state.clone())
    }

    /// Number of nodes that carry any state
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no node carries state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn insert_tag(&self, node: NodeId, tag: Tag) {
        self.nodes.entry(node).or_default().tags.insert(tag);
    }

    pub(crate) fn remove_tag(&self, node: NodeId, tag: Tag) {
        if let Some(mut state) = self.nodes.get_mut(&node) {
            state.tags.remove(tag);
        }
    }

    pub(crate) fn remove_marker_kind(&self, node: NodeId, kind: MarkerKind) {
        if let Some(mut state) = self.nodes.get_mut(&node) {
            state.markers.remove_kind(kind);
        }
    }

    pub(crate) fn apply_marker_changes(&self, node: NodeId, changes: MarkerChanges) {
        let mut state = self.nodes.entry(node).or_default();
        for (kind, change) in changes {
            match change {
                Some(marker) => state.markers.insert_dyn(marker),
                None => state.markers.remove_kind(kind),
            }
        }
    }

    pub(crate) fn drop_node(&self, node: NodeId) {
        self.nodes.remove(&node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::NodeKind, state::ClonePolicy};

    const RAW: Tag = Tag::new("raw", NodeKind::Method);

    #[derive(Debug, Clone, PartialEq)]
    struct Keep(u8);

    impl Marker for Keep {
        const KIND: MarkerKind = MarkerKind::new("keep");
        const ON_CLONE: ClonePolicy = ClonePolicy::Drop;
    }

    #[test]
    fn test_tags() {
        let store = StateStore::new();
        let node = NodeId::new(1);
        assert!(!store.has_tag(node, RAW));
        store.insert_tag(node, RAW);
        assert!(store.has_tag(node, RAW));
        store.remove_tag(node, RAW);
        assert!(!store.has_tag(node, RAW));
        assert!(store.tags(node).is_empty());
    }

    #[test]
    fn test_marker_access() {
        let store = StateStore::new();
        let node = NodeId::new(1);
        assert!(store.put_marker(node, Keep(1)).is_none());
        assert_eq!(store.marker::<Keep>(node), Some(Keep(1)));
        assert_eq!(store.marker_kinds(node), vec![Keep::KIND]);
        assert!(store.has_marker(node, Keep::KIND));
        assert_eq!(store.remove_marker::<Keep>(node), Some(Keep(1)));
        assert!(store.marker::<Keep>(node).is_none());

        store.put_marker(node, Keep(2));
        store.remove_marker_kind(node, Keep::KIND);
        assert!(!store.has_marker(node, Keep::KIND));
    }

    #[test]
    fn test_marker_changes() {
        let store = StateStore::new();
        let node = NodeId::new(2);
        store.put_marker(node, Keep(1));

        let mut changes = MarkerChanges::new();
        changes.insert(Keep::KIND, None);
        store.apply_marker_changes(node, changes);
        assert!(store.marker::<Keep>(node).is_none());

        let mut changes = MarkerChanges::new();
        changes.insert(Keep::KIND, Some(Box::new(Keep(5))));
        store.apply_marker_changes(node, changes);
        assert_eq!(store.marker::<Keep>(node), Some(Keep(5)));

        store.drop_node(node);
        assert!(store.snapshot(node).is_none());
    }
}
