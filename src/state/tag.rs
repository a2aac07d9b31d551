//! Tags, facts and fact sets.

use std::{collections::BTreeSet, fmt};

use crate::ir::NodeKind;

/// A zero-data boolean fact scoped to one node granularity.
///
/// Tags are meant to be declared as constants next to the units that produce them:
///
/// ```rust
/// use passplan::{ir::NodeKind, state::Tag};
///
/// pub const DESUGARED: Tag = Tag::new("desugared", NodeKind::Method);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    name: &'static str,
    scope: NodeKind,
}

impl Tag {
    /// Creates a tag.
    #[must_use]
    pub const fn new(name: &'static str, scope: NodeKind) -> Self {
        Self { name, scope }
    }

    /// Name of the tag
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The node granularity this tag is attached to
    #[must_use]
    pub fn scope(&self) -> NodeKind {
        self.scope
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.scope)
    }
}

/// Key identifying one kind of [`Marker`](crate::state::Marker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerKind(&'static str);

impl MarkerKind {
    /// Creates a marker kind.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Name of the marker kind
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker:{}", self.0)
    }
}

/// A fact the planner reasons about: a tag, or the availability of a marker kind.
///
/// Tags are tracked per node by the executor. A marker fact is carried by the nodes that hold a
/// marker of that kind: units put markers themselves, while a declared marker removal clears the
/// kind from the whole subtree of every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fact {
    /// A per-node tag
    Tag(Tag),
    /// A marker kind
    Marker(MarkerKind),
}

impl Fact {
    /// Returns the tag, if this fact is one.
    #[must_use]
    pub fn as_tag(&self) -> Option<Tag> {
        match self {
            Fact::Tag(tag) => Some(*tag),
            Fact::Marker(_) => None,
        }
    }

    /// Returns the marker kind, if this fact is one.
    #[must_use]
    pub fn as_marker(&self) -> Option<MarkerKind> {
        match self {
            Fact::Tag(_) => None,
            Fact::Marker(kind) => Some(*kind),
        }
    }

    /// Returns the scope for tags, `None` for markers.
    #[must_use]
    pub fn scope(&self) -> Option<NodeKind> {
        self.as_tag().map(|tag| tag.scope())
    }
}

impl From<Tag> for Fact {
    fn from(tag: Tag) -> Self {
        Fact::Tag(tag)
    }
}

impl From<MarkerKind> for Fact {
    fn from(kind: MarkerKind) -> Self {
        Fact::Marker(kind)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Tag(tag) => write!(f, "{tag}"),
            Fact::Marker(kind) => write!(f, "{kind}"),
        }
    }
}

/// An ordered set of facts.
///
/// Used for the initial state handed to the planner, for the simulated state while planning,
/// and for the tags carried by a single node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagState {
    facts: BTreeSet<Fact>,
}

impl TagState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fact, returns true if it was absent.
    pub fn insert(&mut self, fact: impl Into<Fact>) -> bool {
        self.facts.insert(fact.into())
    }

    /// Removes a fact, returns true if it was present.
    pub fn remove(&mut self, fact: impl Into<Fact>) -> bool {
        self.facts.remove(&fact.into())
    }

    /// Returns true if the fact holds.
    #[must_use]
    pub fn contains(&self, fact: impl Into<Fact>) -> bool {
        self.facts.contains(&fact.into())
    }

    /// Returns true if every fact of `facts` holds.
    #[must_use]
    pub fn contains_all<'a>(&self, facts: impl IntoIterator<Item = &'a Fact>) -> bool {
        facts.into_iter().all(|fact| self.facts.contains(fact))
    }

    /// Applies the effects of a unit: removals first, then additions.
    pub fn apply<'a>(
        &mut self,
        adds: impl IntoIterator<Item = &'a Fact>,
        removes: impl IntoIterator<Item = &'a Fact>,
    ) {
        for fact in removes {
            self.facts.remove(fact);
        }
        for fact in adds {
            self.facts.insert(*fact);
        }
    }

    /// Iterates the facts in order.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    /// Iterates the tags scoped to `kind`.
    pub fn tags_of(&self, kind: NodeKind) -> impl Iterator<Item = Tag> + '_ {
        self.facts
            .iter()
            .filter_map(Fact::as_tag)
            .filter(move |tag| tag.scope() == kind)
    }

    /// Number of facts
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Returns true if no fact holds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

impl<F: Into<Fact>> FromIterator<F> for TagState {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self {
            facts: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for TagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let facts: Vec<String> = self.facts.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", facts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: Tag = Tag::new("raw", NodeKind::Method);
    const DESUGARED: Tag = Tag::new("desugared", NodeKind::Method);
    const NAMES: MarkerKind = MarkerKind::new("names");

    #[test]
    fn test_apply_effects() {
        let mut state: TagState = [RAW, DESUGARED].into_iter().collect();
        let adds = [Fact::Marker(NAMES)];
        let removes = [Fact::Tag(DESUGARED)];
        state.apply(&adds, &removes);

        assert!(state.contains(RAW));
        assert!(!state.contains(DESUGARED));
        assert!(state.contains(NAMES));
        assert_eq!(state.tags_of(NodeKind::Method).collect::<Vec<_>>(), vec![RAW]);
    }

    #[test]
    fn test_display() {
        let state: TagState = [Fact::from(RAW), Fact::from(NAMES)].into_iter().collect();
        assert_eq!(state.to_string(), "{raw@Method, marker:names}");
    }

    #[test]
    fn test_tags_with_same_name_differ_by_scope() {
        let on_type = Tag::new("raw", NodeKind::Type);
        assert_ne!(RAW, on_type);
        let state: TagState = [RAW].into_iter().collect();
        assert!(!state.contains(on_type));
    }
}
