//! The compilation session.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use crate::{
    compiler::events::EventLog,
    ir::IrTree,
    planning::Features,
    state::{StateStore, TagState},
};

/// Everything one compilation owns: the IR, its analysis state, the feature configuration and
/// the event log.
///
/// The session is passed explicitly to every unit invocation through
/// [`UnitContext`](crate::compiler::UnitContext); there is no global session. While a plan
/// executes the executor holds the only mutable borrow, so nothing outside the running units
/// can observe or change the state mid-step.
///
/// A session that saw an execution failure is *poisoned*: its IR is in a defined but unfinished
/// state and further executions fail with [`Error::SessionPoisoned`](crate::Error::SessionPoisoned).
#[derive(Debug)]
pub struct Session {
    tree: IrTree,
    state: StateStore,
    features: Features,
    events: EventLog,
    /// Serializes invocations of exclusive units
    exclusive: Mutex<()>,
    poisoned: AtomicBool,
}

impl Session {
    /// Creates a session for `tree` with the given feature configuration.
    #[must_use]
    pub fn new(tree: IrTree, features: Features) -> Self {
        Self {
            tree,
            state: StateStore::new(),
            features,
            events: EventLog::new(),
            exclusive: Mutex::new(()),
            poisoned: AtomicBool::new(false),
        }
    }

    /// The program tree
    #[must_use]
    pub fn tree(&self) -> &IrTree {
        &self.tree
    }

    /// Tags and markers of all nodes
    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// The feature configuration, fixed for the session
    #[must_use]
    pub fn features(&self) -> &Features {
        &self.features
    }

    /// The session's event log
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Returns true if an earlier execution failed.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Marks every live node with the tags of `initial` scoped to its kind.
    ///
    /// Used for the facts the front end establishes before the first step. Marker facts in
    /// `initial` are not materialized: the caller asserts them, and the executor trusts the
    /// assertion until a step adds or removes that marker kind.
    pub fn seed(&self, initial: &TagState) {
        for tag in initial.iter().filter_map(|fact| fact.as_tag()) {
            for node in self.tree.nodes_of_kind(tag.scope()) {
                self.state.insert_tag(node, tag);
            }
        }
    }

    /// Takes the tree and state out of the session.
    #[must_use]
    pub fn into_parts(self) -> (IrTree, StateStore, EventLog) {
        (self.tree, self.state, self.events)
    }

    pub(crate) fn exclusive(&self) -> &Mutex<()> {
        &self.exclusive
    }

    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
    }
}
