//! Goals and plans.

use std::{collections::BTreeSet, fmt, fmt::Write};

use crate::{
    ir::NodeKind,
    planning::{features::Feature, registry::Registry},
    state::{Fact, TagState},
};

/// What a plan has to achieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Goal {
    /// Make every listed fact true
    Facts(BTreeSet<Fact>),
    /// Run every unit whose features are enabled and whose needs can be satisfied
    Maximal,
}

impl Goal {
    /// Goal of a single fact.
    #[must_use]
    pub fn fact(fact: impl Into<Fact>) -> Self {
        Goal::Facts(BTreeSet::from([fact.into()]))
    }

    /// Goal of several facts.
    #[must_use]
    pub fn facts<F: Into<Fact>>(facts: impl IntoIterator<Item = F>) -> Self {
        Goal::Facts(facts.into_iter().map(Into::into).collect())
    }

    /// The facts that must hold at the end, empty for [`Goal::Maximal`].
    #[must_use]
    pub fn required(&self) -> BTreeSet<Fact> {
        match self {
            Goal::Facts(facts) => facts.clone(),
            Goal::Maximal => BTreeSet::new(),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Facts(facts) => {
                let facts: Vec<String> = facts.iter().map(ToString::to_string).collect();
                write!(f, "facts [{}]", facts.join(", "))
            }
            Goal::Maximal => f.write_str("maximal"),
        }
    }
}

/// One step of a plan: run `unit` over every node of `granularity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanStep {
    /// Name of the unit
    pub unit: String,
    /// Granularity the step expands to
    pub granularity: NodeKind,
    /// Copied from the descriptor, serializes the step's invocations
    pub exclusive: bool,
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{}", self.unit, self.granularity)?;
        if self.exclusive {
            f.write_str(" (exclusive)")?;
        }
        Ok(())
    }
}

/// Non-fatal observations made while planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanWarning {
    /// A unit was left out because one of its features is disabled
    FeatureGated {
        /// The omitted unit
        unit: String,
        /// The first disabled feature
        feature: Feature,
    },
    /// A maximal plan left out a unit whose needs cannot be satisfied
    Unreachable {
        /// The omitted unit
        unit: String,
        /// The first need that cannot be produced
        fact: Fact,
    },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::FeatureGated { unit, feature } => {
                write!(f, "{unit} omitted, feature {feature} is disabled")
            }
            PlanWarning::Unreachable { unit, fact } => {
                write!(f, "{unit} omitted, {fact} cannot be produced")
            }
        }
    }
}

/// A totally ordered, constraint-satisfying sequence of steps.
///
/// Plans are immutable; [`Executor::execute`](crate::compiler::Executor::execute) consumes
/// them. Two plans compare equal only if goal, initial state, steps, final state and warnings
/// are identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    goal: Goal,
    initial: TagState,
    steps: Vec<PlanStep>,
    final_state: TagState,
    warnings: Vec<PlanWarning>,
}

impl Plan {
    pub(crate) fn new(
        goal: Goal,
        initial: TagState,
        steps: Vec<PlanStep>,
        final_state: TagState,
        warnings: Vec<PlanWarning>,
    ) -> Self {
        Self {
            goal,
            initial,
            steps,
            final_state,
            warnings,
        }
    }

    /// The goal this plan was built for
    #[must_use]
    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    /// The facts assumed true before the first step
    #[must_use]
    pub fn initial(&self) -> &TagState {
        &self.initial
    }

    /// The steps in execution order
    #[must_use]
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// The facts true after the last step
    #[must_use]
    pub fn final_state(&self) -> &TagState {
        &self.final_state
    }

    /// Warnings collected while planning
    #[must_use]
    pub fn warnings(&self) -> &[PlanWarning] {
        &self.warnings
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if nothing has to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Unit names in execution order.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.unit.as_str()).collect()
    }

    /// Position of the first step running `unit`.
    #[must_use]
    pub fn position(&self, unit: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.unit == unit)
    }

    /// Returns the plan as a formatted string for debugging.
    ///
    /// # Arguments
    ///
    /// * `registry` - The catalog the plan was built from, used to print each step's contract.
    #[must_use]
    pub fn dump(&self, registry: &Registry) -> String {
        fn join(facts: &BTreeSet<Fact>) -> String {
            if facts.is_empty() {
                "None".to_string()
            } else {
                facts
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        let mut result = String::new();
        let _ = writeln!(result, "Goal: {}", self.goal);
        let _ = writeln!(result, "Initial: {}", self.initial);

        for (index, step) in self.steps.iter().enumerate() {
            let _ = write!(result, "Step {index}: {step}");
            if let Some(descriptor) = registry.descriptor(&step.unit) {
                let _ = write!(
                    result,
                    " (needs: {}; adds: {}; removes: {})",
                    join(descriptor.needs()),
                    join(descriptor.adds()),
                    join(descriptor.removes())
                );
            }
            let _ = writeln!(result);
        }

        let _ = writeln!(result, "Final: {}", self.final_state);
        for warning in &self.warnings {
            let _ = writeln!(result, "Warning: {warning}");
        }

        result
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.unit_names().join(", "))
    }
}
