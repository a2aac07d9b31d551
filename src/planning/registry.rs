//! The catalog of schedulable units.
//!
//! The [`Registry`] owns every unit known to a session and keeps three indexes the planner
//! works from: units by produced fact, by needed fact, and by granularity. All indexes are
//! ordered maps keyed by name, so registration order never influences iteration order.
//!
//! # Lifecycle
//!
//! 1. Create with `Registry::new()`
//! 2. Add units with `register()`
//! 3. Check the catalog with `validate()` / `validate_with()`
//! 4. Hand it to the [`Planner`](crate::planning::Planner)

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    ir::NodeKind,
    planning::{descriptor::Descriptor, unit::Unit},
    state::{Fact, TagState},
    Error, Result,
};

/// Outcome of a successful [`Registry::validate_with`] call.
///
/// Unproducible facts are collected rather than failing immediately, so that a caller can
/// report all of them at once. [`ValidationReport::into_result`] turns the first one into an
/// error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// `(fact, unit)` pairs: `unit` needs `fact` and no registered unit adds it
    pub unproducible: Vec<(Fact, String)>,
}

impl ValidationReport {
    /// Returns true if no defect was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.unproducible.is_empty()
    }

    /// Converts the report into an error on the first defect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnproducibleFact`] for the first unproducible fact.
    pub fn into_result(self) -> Result<()> {
        match self.unproducible.into_iter().next() {
            Some((fact, unit)) => Err(Error::UnproducibleFact { fact, unit }),
            None => Ok(()),
        }
    }
}

/// Catalog of all registered units.
#[derive(Default, Clone)]
pub struct Registry {
    /// Units by name
    units: BTreeMap<String, Arc<dyn Unit>>,
    /// Maps a fact to the units that add it
    producers: BTreeMap<Fact, BTreeSet<String>>,
    /// Maps a fact to the units that need it
    consumers: BTreeMap<Fact, BTreeSet<String>>,
    /// Maps a granularity to the units running on it
    by_granularity: BTreeMap<NodeKind, BTreeSet<String>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDescriptor`] if a unit with the same name is registered.
    pub fn register(&mut self, unit: impl Unit + 'static) -> Result<()> {
        self.register_arc(Arc::new(unit))
    }

    /// Adds a shared unit to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDescriptor`] if a unit with the same name is registered.
    pub fn register_arc(&mut self, unit: Arc<dyn Unit>) -> Result<()> {
        let descriptor = unit.descriptor();
        let name = descriptor.name().to_string();
        if self.units.contains_key(&name) {
            return Err(Error::DuplicateDescriptor(name));
        }

        for fact in descriptor.adds() {
            self.producers
                .entry(*fact)
                .or_default()
                .insert(name.clone());
        }
        for fact in descriptor.needs() {
            self.consumers
                .entry(*fact)
                .or_default()
                .insert(name.clone());
        }
        self.by_granularity
            .entry(descriptor.granularity())
            .or_default()
            .insert(name.clone());

        self.units.insert(name, unit);
        Ok(())
    }

    /// Number of registered units
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if no unit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns the unit named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Unit>> {
        self.units.get(name)
    }

    /// Returns the descriptor of the unit named `name`.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.units.get(name).map(|unit| unit.descriptor())
    }

    /// Iterates all descriptors, ordered by name.
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.units.values().map(|unit| unit.descriptor())
    }

    /// Names of the units that add `fact`, ordered by name.
    pub fn producers_of(&self, fact: &Fact) -> impl Iterator<Item = &str> {
        self.producers
            .get(fact)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Names of the units that need `fact`, ordered by name.
    pub fn consumers_of(&self, fact: &Fact) -> impl Iterator<Item = &str> {
        self.consumers
            .get(fact)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Names of the units running on `kind`, ordered by name.
    pub fn at_granularity(&self, kind: NodeKind) -> impl Iterator<Item = &str> {
        self.by_granularity
            .get(&kind)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Granularities used by at least one unit.
    #[must_use]
    pub fn granularities(&self) -> Vec<NodeKind> {
        self.by_granularity.keys().copied().collect()
    }

    /// Validates the catalog assuming no fact holds initially.
    ///
    /// # Errors
    ///
    /// See [`Registry::validate_with`].
    pub fn validate(&self) -> Result<ValidationReport> {
        self.validate_with(&TagState::new())
    }

    /// Validates the catalog for internal consistency.
    ///
    /// Facts in `initial` count as produced.
    ///
    /// # Returns
    ///
    /// A [`ValidationReport`] listing every needed fact without producer.
    ///
    /// # Errors
    ///
    /// Fails fast with [`Error::UnresolvedUses`] for a `uses` reference to an unregistered unit,
    /// and with [`Error::ContradictoryDescriptor`] for a unit that needs and removes a fact no
    /// other unit can re-add.
    pub fn validate_with(&self, initial: &TagState) -> Result<ValidationReport> {
        for descriptor in self.descriptors() {
            if let Some(target) = descriptor
                .uses()
                .iter()
                .find(|target| !self.units.contains_key(*target))
            {
                return Err(Error::UnresolvedUses {
                    unit: descriptor.name().to_string(),
                    target: target.clone(),
                });
            }
        }

        for descriptor in self.descriptors() {
            for fact in descriptor.needs().intersection(descriptor.removes()) {
                let readdable = self
                    .producers_of(fact)
                    .any(|producer| producer != descriptor.name());
                if !readdable {
                    return Err(Error::ContradictoryDescriptor {
                        unit: descriptor.name().to_string(),
                        reason: format!("{fact} is needed and removed but no other unit adds it"),
                    });
                }
            }
        }

        let mut report = ValidationReport::default();
        for descriptor in self.descriptors() {
            for fact in descriptor.needs() {
                if !initial.contains(*fact) && self.producers_of(fact).next().is_none() {
                    report
                        .unproducible
                        .push((*fact, descriptor.name().to_string()));
                }
            }
        }

        Ok(report)
    }
}
