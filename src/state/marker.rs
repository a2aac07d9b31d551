//! Typed, data-carrying node facts.

use std::{any::Any, collections::BTreeMap, fmt};

use crate::{ir::NodeId, state::tag::MarkerKind};

/// What happens to a marker when its owning node is structurally cloned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClonePolicy {
    /// The copy receives an unchanged clone of the marker
    Copy,
    /// The copy receives the result of [`Marker::regenerate`]
    Regenerate,
    /// The copy does not receive the marker
    Drop,
}

/// A named, typed fact attached to a node.
///
/// At most one marker of a given [`Marker::KIND`] exists per node. Every marker type has to
/// state how it survives a subtree clone through [`Marker::ON_CLONE`].
///
/// # Example
///
/// ```rust
/// use passplan::{ir::NodeId, state::{ClonePolicy, Marker, MarkerKind}};
///
/// #[derive(Debug, Clone)]
/// struct OriginalName(String);
///
/// impl Marker for OriginalName {
///     const KIND: MarkerKind = MarkerKind::new("original-name");
///     const ON_CLONE: ClonePolicy = ClonePolicy::Copy;
/// }
/// ```
pub trait Marker: Any + Clone + Send + Sync + fmt::Debug {
    /// The key of this marker type
    const KIND: MarkerKind;

    /// Behavior on structural clone of the owning node
    const ON_CLONE: ClonePolicy;

    /// Builds the marker for a cloned node when [`Marker::ON_CLONE`] is
    /// [`ClonePolicy::Regenerate`]. Returning `None` drops it.
    fn regenerate(&self, _original: NodeId, _copy: NodeId) -> Option<Self> {
        Some(self.clone())
    }
}

/// Object-safe view of a [`Marker`], used for heterogeneous storage.
pub(crate) trait AnyMarker: Any + Send + Sync + fmt::Debug {
    fn kind(&self) -> MarkerKind;
    fn boxed_clone(&self) -> Box<dyn AnyMarker>;
    fn for_copy(&self, original: NodeId, copy: NodeId) -> Option<Box<dyn AnyMarker>>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<M: Marker> AnyMarker for M {
    fn kind(&self) -> MarkerKind {
        M::KIND
    }

    fn boxed_clone(&self) -> Box<dyn AnyMarker> {
        Box::new(self.clone())
    }

    fn for_copy(&self, original: NodeId, copy: NodeId) -> Option<Box<dyn AnyMarker>> {
        match M::ON_CLONE {
            ClonePolicy::Copy => Some(Box::new(self.clone())),
            ClonePolicy::Regenerate => self
                .regenerate(original, copy)
                .map(|marker| Box::new(marker) as Box<dyn AnyMarker>),
            ClonePolicy::Drop => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// The markers of one node, at most one per kind.
#[derive(Debug, Default)]
pub struct MarkerMap {
    markers: BTreeMap<MarkerKind, Box<dyn AnyMarker>>,
}

impl Clone for MarkerMap {
    fn clone(&self) -> Self {
        Self {
            markers: self
                .markers
                .iter()
                .map(|(kind, marker)| (*kind, marker.boxed_clone()))
                .collect(),
        }
    }
}

impl MarkerMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the marker of type `M`, if present.
    #[must_use]
    pub fn get<M: Marker>(&self) -> Option<&M> {
        self.markers
            .get(&M::KIND)
            .and_then(|marker| marker.as_any().downcast_ref::<M>())
    }

    /// Stores a marker, returning the one it replaced.
    pub fn put<M: Marker>(&mut self, marker: M) -> Option<M> {
        self.markers
            .insert(M::KIND, Box::new(marker))
            .and_then(|old| old.into_any().downcast::<M>().ok())
            .map(|old| *old)
    }

    /// Removes the marker of type `M`.
    pub fn remove<M: Marker>(&mut self) -> Option<M> {
        self.markers
            .remove(&M::KIND)
            .and_then(|old| old.into_any().downcast::<M>().ok())
            .map(|old| *old)
    }

    /// Returns true if a marker of `kind` is present.
    #[must_use]
    pub fn contains(&self, kind: MarkerKind) -> bool {
        self.markers.contains_key(&kind)
    }

    /// Returns the kinds of all present markers, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<MarkerKind> {
        self.markers.keys().copied().collect()
    }

    /// Number of markers
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Returns true if no marker is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub(crate) fn insert_dyn(&mut self, marker: Box<dyn AnyMarker>) {
        self.markers.insert(marker.kind(), marker);
    }

    pub(crate) fn remove_kind(&mut self, kind: MarkerKind) {
        self.markers.remove(&kind);
    }

    pub(crate) fn into_dyn(self) -> impl Iterator<Item = Box<dyn AnyMarker>> {
        self.markers.into_values()
    }

    /// Builds the markers of a structural copy according to each marker's [`ClonePolicy`].
    #[must_use]
    pub fn for_copy(&self, original: NodeId, copy: NodeId) -> MarkerMap {
        let mut result = MarkerMap::new();
        for marker in self.markers.values() {
            if let Some(copied) = marker.for_copy(original, copy) {
                result.insert_dyn(copied);
            }
        }
        result
    }
}
