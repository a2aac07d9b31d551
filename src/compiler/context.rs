//! The per-invocation handle passed to units.
//!
//! A [`UnitContext`] grants one invocation exclusive rights over the subtree of its target
//! node. Structural edits go straight to the tree, but only inside that subtree. Marker writes
//! are staged in the context and committed by the executor at the end of the step, so sibling
//! invocations of the same step never observe each other's markers. Tags cannot be written at
//! all: they change only through the unit's declared effects.

use std::collections::BTreeMap;

use log::trace;

use crate::{
    compiler::{
        events::{EventKind, EventLog},
        session::Session,
    },
    ir::{IrTree, NodeId, NodeKind},
    planning::Features,
    state::{Marker, MarkerChanges, Tag, TagState},
    Error, Result,
};

/// Everything a unit may see and do while running on one node.
pub struct UnitContext<'a> {
    session: &'a Session,
    unit: &'a str,
    node: NodeId,
    kind: NodeKind,
    markers: BTreeMap<NodeId, MarkerChanges>,
    created: Vec<NodeId>,
    removed: Vec<NodeId>,
}

/// What an invocation left behind for the commit at the step barrier.
pub(crate) struct Staged {
    pub(crate) markers: BTreeMap<NodeId, MarkerChanges>,
    pub(crate) created: Vec<NodeId>,
    pub(crate) removed: Vec<NodeId>,
}

impl<'a> UnitContext<'a> {
    pub(crate) fn new(session: &'a Session, unit: &'a str, node: NodeId, kind: NodeKind) -> Self {
        Self {
            session,
            unit,
            node,
            kind,
            markers: BTreeMap::new(),
            created: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// The node this invocation runs on
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Granularity of the node
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Name of the running unit
    #[must_use]
    pub fn unit(&self) -> &str {
        self.unit
    }

    /// The session the invocation belongs to
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session
    }

    /// The program tree, readable everywhere
    #[must_use]
    pub fn tree(&self) -> &IrTree {
        self.session.tree()
    }

    /// The session's feature configuration
    #[must_use]
    pub fn features(&self) -> &Features {
        self.session.features()
    }

    /// The session's event log
    #[must_use]
    pub fn events(&self) -> &EventLog {
        self.session.events()
    }

    /// Returns true if `tag` was present on `node` when the step started.
    #[must_use]
    pub fn has_tag(&self, node: NodeId, tag: Tag) -> bool {
        self.session.state().has_tag(node, tag)
    }

    /// Returns the tags `node` had when the step started.
    #[must_use]
    pub fn tags(&self, node: NodeId) -> TagState {
        self.session.state().tags(node)
    }

    /// Returns the marker of type `M` on `node`.
    ///
    /// Markers staged by this invocation shadow the committed ones.
    #[must_use]
    pub fn marker<M: Marker>(&self, node: NodeId) -> Option<M> {
        match self.markers.get(&node).and_then(|changes| changes.get(&M::KIND)) {
            Some(Some(marker)) => marker.as_any().downcast_ref::<M>().cloned(),
            Some(None) => None,
            None => self.session.state().marker::<M>(node),
        }
    }

    /// Stages a marker for `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if `node` is outside the invocation's subtree.
    pub fn put_marker<M: Marker>(&mut self, node: NodeId, marker: M) -> Result<()> {
        self.check_owned(node)?;
        self.markers
            .entry(node)
            .or_default()
            .insert(M::KIND, Some(Box::new(marker)));
        Ok(())
    }

    /// Stages the removal of the marker of type `M` from `node`, returning the current one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if `node` is outside the invocation's subtree.
    pub fn remove_marker<M: Marker>(&mut self, node: NodeId) -> Result<Option<M>> {
        self.check_owned(node)?;
        let current = self.marker::<M>(node);
        self.markers.entry(node).or_default().insert(M::KIND, None);
        Ok(current)
    }

    /// Creates a child of `parent`.
    ///
    /// The new node starts with the tags the plan guarantees for its kind before the current
    /// step; the step's own effects are applied on top at commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if `parent` is outside the invocation's subtree,
    /// and [`Error::Tree`] if the kinds do not nest.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        name: impl Into<String>,
    ) -> Result<NodeId> {
        self.check_owned(parent)?;
        let id = self.session.tree().add_child(parent, kind, name)?;
        trace!("{} created {kind} node {id} below {parent}", self.unit);

        self.events()
            .record(EventKind::NodeCreated)
            .unit(self.unit)
            .node(id);
        self.created.push(id);
        Ok(id)
    }

    /// Removes `node` and its subtree, including their tags and markers.
    ///
    /// The invocation may remove its own target node, the step's effects then skip it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if `node` is outside the invocation's subtree,
    /// and [`Error::Tree`] for the program root.
    pub fn remove_subtree(&mut self, node: NodeId) -> Result<()> {
        self.check_owned(node)?;
        let removed = self.session.tree().remove_subtree(node)?;
        trace!("{} removed {} nodes at {node}", self.unit, removed.len());

        for id in &removed {
            self.markers.remove(id);
        }
        self.events()
            .record(EventKind::NodeRemoved)
            .unit(self.unit)
            .node(node)
            .message(format!("removed {} nodes", removed.len()));
        self.removed.extend(removed);
        Ok(())
    }

    /// Copies the subtree of `source` below `new_parent`, returning the copied root.
    ///
    /// `source` may be anywhere in the tree. Markers of the copied nodes are copied, regenerated
    /// or dropped according to their [`ClonePolicy`](crate::state::ClonePolicy).
    ///
    /// # Errors
    ///
    /// Returns [`Error::OwnershipViolation`] if `new_parent` is outside the invocation's subtree,
    /// and [`Error::Tree`] if the kinds do not nest.
    pub fn clone_subtree(&mut self, source: NodeId, new_parent: NodeId) -> Result<NodeId> {
        self.check_owned(new_parent)?;
        let mapping = self.session.tree().clone_subtree(source, new_parent)?;

        for (original, copy) in &mapping {
            let mut markers = self
                .session
                .state()
                .snapshot(*original)
                .map(|state| state.markers)
                .unwrap_or_default();
            if let Some(changes) = self.markers.get(original) {
                for (kind, change) in changes {
                    match change {
                        Some(marker) => markers.insert_dyn(marker.boxed_clone()),
                        None => markers.remove_kind(*kind),
                    }
                }
            }

            let copied: MarkerChanges = markers
                .for_copy(*original, *copy)
                .into_dyn()
                .map(|marker| (marker.kind(), Some(marker)))
                .collect();
            if !copied.is_empty() {
                self.markers.insert(*copy, copied);
            }
            self.created.push(*copy);
        }

        let (_, root) = mapping
            .first()
            .copied()
            .ok_or_else(|| Error::Tree(format!("Cloning {source} produced no nodes")))?;
        self.events()
            .record(EventKind::NodeCreated)
            .unit(self.unit)
            .node(root)
            .message(format!("cloned {source} ({} nodes)", mapping.len()));
        Ok(root)
    }

    fn check_owned(&self, node: NodeId) -> Result<()> {
        if self.session.tree().is_within(node, self.node) {
            Ok(())
        } else {
            Err(Error::OwnershipViolation {
                owner: self.node,
                target: node,
            })
        }
    }

    pub(crate) fn into_staged(self) -> Staged {
        Staged {
            markers: self.markers,
            created: self.created,
            removed: self.removed,
        }
    }
}
