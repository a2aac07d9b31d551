//! Unit descriptors.
//!
//! A [`Descriptor`] is the immutable contract a unit declares about itself: what it needs,
//! which facts it adds or removes, which features it belongs to, and at which granularity it
//! runs. The planner looks at nothing else.

use std::{collections::BTreeSet, fmt, sync::Arc};

use crate::{
    ir::{Node, NodeKind},
    planning::features::Feature,
    state::Fact,
    Error, Result,
};

/// Per-node applicability predicate, evaluated by the executor right before invoking a unit.
pub type Filter = Arc<dyn Fn(&Node) -> bool + Send + Sync>;

/// Immutable metadata describing one schedulable unit.
///
/// Created through [`Descriptor::builder`]:
///
/// ```rust
/// use passplan::{ir::NodeKind, planning::Descriptor, state::Tag};
///
/// const RAW: Tag = Tag::new("raw", NodeKind::Method);
/// const DESUGARED: Tag = Tag::new("desugared", NodeKind::Method);
///
/// let descriptor = Descriptor::builder("desugar")
///     .description("Lowers syntactic sugar in method bodies")
///     .granularity(NodeKind::Method)
///     .needs(RAW)
///     .adds(DESUGARED)
///     .build()?;
/// assert_eq!(descriptor.name(), "desugar");
/// # Ok::<(), passplan::Error>(())
/// ```
#[derive(Clone)]
pub struct Descriptor {
    name: String,
    description: String,
    granularity: NodeKind,
    needs: BTreeSet<Fact>,
    adds: BTreeSet<Fact>,
    removes: BTreeSet<Fact>,
    features: BTreeSet<Feature>,
    uses: BTreeSet<String>,
    exclusive: bool,
    order_hint: i32,
    filter: Option<Filter>,
}

impl Descriptor {
    /// Starts building a descriptor for a unit named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    /// Unique name of the unit
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Granularity of the nodes the unit runs on
    #[must_use]
    pub fn granularity(&self) -> NodeKind {
        self.granularity
    }

    /// Facts that must hold before the unit runs
    #[must_use]
    pub fn needs(&self) -> &BTreeSet<Fact> {
        &self.needs
    }

    /// Facts the unit establishes
    #[must_use]
    pub fn adds(&self) -> &BTreeSet<Fact> {
        &self.adds
    }

    /// Facts the unit invalidates
    #[must_use]
    pub fn removes(&self) -> &BTreeSet<Fact> {
        &self.removes
    }

    /// Features that must all be enabled for the unit to be planned
    #[must_use]
    pub fn features(&self) -> &BTreeSet<Feature> {
        &self.features
    }

    /// Units whose logic this unit relies on, ordered before it when both are planned
    #[must_use]
    pub fn uses(&self) -> &BTreeSet<String> {
        &self.uses
    }

    /// True if all invocations of the unit are serialized session-wide
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Tie-break hint, lower runs first among otherwise unordered units
    #[must_use]
    pub fn order_hint(&self) -> i32 {
        self.order_hint
    }

    /// Returns true if the unit wants to run on `node`.
    #[must_use]
    pub fn applies_to(&self, node: &Node) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(node))
    }

    /// Key used for every deterministic tie-break.
    pub(crate) fn sort_key(&self) -> (i32, &str) {
        (self.order_hint, self.name.as_str())
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("granularity", &self.granularity)
            .field("needs", &self.needs)
            .field("adds", &self.adds)
            .field("removes", &self.removes)
            .field("features", &self.features)
            .field("uses", &self.uses)
            .field("exclusive", &self.exclusive)
            .field("order_hint", &self.order_hint)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Builder for [`Descriptor`].
pub struct DescriptorBuilder {
    descriptor: Descriptor,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor {
                name: name.into(),
                description: String::new(),
                granularity: NodeKind::Program,
                needs: BTreeSet::new(),
                adds: BTreeSet::new(),
                removes: BTreeSet::new(),
                features: BTreeSet::new(),
                uses: BTreeSet::new(),
                exclusive: false,
                order_hint: 0,
                filter: None,
            },
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    /// Sets the granularity (default [`NodeKind::Program`]).
    #[must_use]
    pub fn granularity(mut self, kind: NodeKind) -> Self {
        self.descriptor.granularity = kind;
        self
    }

    /// Adds a precondition.
    #[must_use]
    pub fn needs(mut self, fact: impl Into<Fact>) -> Self {
        self.descriptor.needs.insert(fact.into());
        self
    }

    /// Adds a produced fact.
    #[must_use]
    pub fn adds(mut self, fact: impl Into<Fact>) -> Self {
        self.descriptor.adds.insert(fact.into());
        self
    }

    /// Adds an invalidated fact.
    #[must_use]
    pub fn removes(mut self, fact: impl Into<Fact>) -> Self {
        self.descriptor.removes.insert(fact.into());
        self
    }

    /// Adds a gating feature.
    #[must_use]
    pub fn feature(mut self, feature: Feature) -> Self {
        self.descriptor.features.insert(feature);
        self
    }

    /// Declares a dependency on the logic of another unit.
    #[must_use]
    pub fn uses(mut self, unit: impl Into<String>) -> Self {
        self.descriptor.uses.insert(unit.into());
        self
    }

    /// Marks the unit as exclusive.
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.descriptor.exclusive = true;
        self
    }

    /// Sets the ordering hint (default 0).
    #[must_use]
    pub fn order_hint(mut self, hint: i32) -> Self {
        self.descriptor.order_hint = hint;
        self
    }

    /// Sets the applicability filter.
    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        self.descriptor.filter = Some(Arc::new(filter));
        self
    }

    /// Validates and returns the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContradictoryDescriptor`] if a fact is both added and removed, and
    /// [`Error::InvalidScope`] if a tag effect is scoped to nodes that cannot occur in the subtree
    /// of the unit's granularity.
    pub fn build(self) -> Result<Descriptor> {
        let descriptor = self.descriptor;

        if let Some(fact) = descriptor.adds.intersection(&descriptor.removes).next() {
            return Err(Error::ContradictoryDescriptor {
                unit: descriptor.name.clone(),
                reason: format!("{fact} is both added and removed"),
            });
        }

        for fact in descriptor.adds.iter().chain(&descriptor.removes) {
            if let Some(scope) = fact.scope() {
                if !descriptor.granularity.encloses(scope) {
                    return Err(Error::InvalidScope {
                        unit: descriptor.name.clone(),
                        reason: format!(
                            "{fact} cannot be changed by a unit running on {} nodes",
                            descriptor.granularity
                        ),
                    });
                }
            }
        }

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::NodeId, state::Tag};

    const RAW: Tag = Tag::new("raw", NodeKind::Method);
    const TYPED: Tag = Tag::new("typed", NodeKind::Type);

    #[test]
    fn test_builder_defaults() {
        let descriptor = Descriptor::builder("noop").build().unwrap();
        assert_eq!(descriptor.granularity(), NodeKind::Program);
        assert!(!descriptor.is_exclusive());
        assert_eq!(descriptor.order_hint(), 0);
        assert!(descriptor.needs().is_empty());
    }

    #[test]
    fn test_overlapping_effects_rejected() {
        let err = Descriptor::builder("bad")
            .granularity(NodeKind::Method)
            .adds(RAW)
            .removes(RAW)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ContradictoryDescriptor { .. }));
    }

    #[test]
    fn test_effect_scope_must_be_reachable() {
        let err = Descriptor::builder("bad")
            .granularity(NodeKind::Method)
            .adds(TYPED)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidScope { .. }));

        // Needs may refer to coarser scopes
        assert!(Descriptor::builder("ok")
            .granularity(NodeKind::Method)
            .needs(TYPED)
            .adds(RAW)
            .build()
            .is_ok());
    }

    #[test]
    fn test_filter() {
        let descriptor = Descriptor::builder("filtered")
            .granularity(NodeKind::Method)
            .filter(|node| node.name.starts_with("get"))
            .build()
            .unwrap();

        let mut node = Node {
            id: NodeId::new(1),
            kind: NodeKind::Method,
            name: "getValue".into(),
            parent: None,
            children: Vec::new(),
        };
        assert!(descriptor.applies_to(&node));
        node.name = "run".into();
        assert!(!descriptor.applies_to(&node));
    }
}
