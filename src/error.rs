use thiserror::Error;

use crate::{ir::NodeId, state::Fact};

/// Builds an [`Error::Failure`] carrying the source location of the call site.
///
/// Intended for [`crate::planning::Unit::apply`] implementations that need to
/// report a failure that is not wrapping another error.
///
/// ```rust,ignore
/// return Err(failure!("method {} has no body", name));
/// ```
#[macro_export]
macro_rules! failure {
    // Single string version
    ($msg:expr) => {
        $crate::Error::Failure {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Failure {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Variants are grouped by the stage that detects them. Callers that only need the stage can
/// use [`Error::is_configuration`], [`Error::is_planning`], [`Error::is_invocation`] and
/// [`Error::is_internal`].
///
/// # Error Categories
///
/// ## Configuration defects (registry validation)
/// - [`Error::DuplicateDescriptor`] - Two units registered under the same name
/// - [`Error::ContradictoryDescriptor`] - Overlapping add/remove sets, or a self-removed need
/// - [`Error::UnproducibleFact`] - A needed fact that no registered unit produces
/// - [`Error::UnresolvedUses`] - A `uses` reference to an unregistered unit
/// - [`Error::MissingAdapter`] - No adapter chain reaches a granularity in use
/// - [`Error::InvalidScope`] - A tag effect scoped coarser than the unit granularity
///
/// ## Planning failures
/// - [`Error::Unsatisfiable`] - A precondition that cannot be established
/// - [`Error::DependencyCycle`] - Units that require each other's output
/// - [`Error::FeatureDisabled`] - The goal depends on a feature-gated unit
///
/// ## Invocation failures
/// - [`Error::Invocation`] - A unit's `apply` failed on a node
/// - [`Error::Failure`] - Failure reported by unit code via [`failure!`](crate::failure)
/// - [`Error::OwnershipViolation`] - A unit touched state outside its subtree
/// - [`Error::Tree`] - An invalid structural edit
///
/// ## Internal errors
/// - [`Error::Consistency`] - Executor post-step assertion failed (a scheduler defect)
/// - [`Error::SessionPoisoned`] - A failed session was reused
/// - [`Error::LockError`] - Thread synchronization failure
/// - [`Error::ThreadPool`] - The worker pool could not be created
#[derive(Error, Debug)]
pub enum Error {
    // Configuration defects
    /// A unit with the same name is already registered.
    #[error("Duplicate descriptor - {0}")]
    DuplicateDescriptor(String),

    /// A descriptor declares sets that contradict each other.
    ///
    /// Raised at construction for facts that are both added and removed, and at validation for
    /// a need the unit removes itself when no other unit can re-add it.
    #[error("Contradictory descriptor {unit}: {reason}")]
    ContradictoryDescriptor {
        /// Name of the offending unit
        unit: String,
        /// What is contradictory
        reason: String,
    },

    /// A fact is needed but no unit in the catalog produces it.
    #[error("Fact {fact} needed by {unit} has no producer")]
    UnproducibleFact {
        /// The fact without producer
        fact: Fact,
        /// The unit needing it
        unit: String,
    },

    /// A unit declares a `uses` dependency on a unit that is not registered.
    #[error("Unit {unit} uses unregistered unit {target}")]
    UnresolvedUses {
        /// The unit declaring the dependency
        unit: String,
        /// The missing unit name
        target: String,
    },

    /// No adapter chain leads from the program root to a granularity used by the catalog.
    #[error("No adapter chain reaches {0}")]
    MissingAdapter(crate::ir::NodeKind),

    /// A tag is scoped at a granularity the unit cannot reach from its own node.
    #[error("Invalid scope in {unit}: {reason}")]
    InvalidScope {
        /// Name of the offending unit
        unit: String,
        /// Why the scope is invalid
        reason: String,
    },

    // Planning failures
    /// A unit's precondition cannot be made true at the point it would run.
    #[error("Cannot satisfy {fact} for {unit}")]
    Unsatisfiable {
        /// The fact that cannot be established
        fact: Fact,
        /// The unit that needs it (or `<goal>`)
        unit: String,
    },

    /// The units relevant to the goal depend on each other in a cycle.
    ///
    /// The associated list names the units on the cycle, in dependency order.
    #[error("Dependency cycle between units: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// The goal requires output that only a feature-gated, disabled unit provides.
    #[error("Fact {fact} is only produced by {unit}, which needs disabled feature {feature}")]
    FeatureDisabled {
        /// The required fact
        fact: Fact,
        /// The disabled producer
        unit: String,
        /// The first feature that is not enabled
        feature: String,
    },

    // Invocation failures
    /// A unit failed while transforming a node.
    #[error("Unit {unit} failed on node {node}: {source}")]
    Invocation {
        /// Name of the failing unit
        unit: String,
        /// The node the unit ran on
        node: NodeId,
        /// The error returned by the unit
        #[source]
        source: Box<Error>,
    },

    /// Failure raised by unit code.
    ///
    /// # Fields
    ///
    /// * `message` - Description of the failure
    /// * `file` - Source file where the failure was raised
    /// * `line` - Source line where the failure was raised
    #[error("Failure - {file}:{line}: {message}")]
    Failure {
        /// The message to be printed for the Failure error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A unit attempted to modify a node outside the subtree it owns.
    #[error("Node {target} is outside the subtree of {owner}")]
    OwnershipViolation {
        /// The node the invocation owns
        owner: NodeId,
        /// The node that was touched
        target: NodeId,
    },

    /// An invalid structural edit of the IR tree.
    #[error("{0}")]
    Tree(String),

    // Internal errors
    /// The executor detected state that the plan promised would not occur.
    ///
    /// This always indicates a defect in the planner or executor, never a user error.
    #[error("Internal consistency violation - {0}")]
    Consistency(String),

    /// The session already failed and must not be executed again.
    #[error("Session was poisoned by an earlier failure")]
    SessionPoisoned,

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// The worker pool could not be built.
    #[error("{0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Returns true for configuration defects detected before planning.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateDescriptor(_)
                | Self::ContradictoryDescriptor { .. }
                | Self::UnproducibleFact { .. }
                | Self::UnresolvedUses { .. }
                | Self::MissingAdapter(_)
                | Self::InvalidScope { .. }
        )
    }

    /// Returns true for planning failures.
    #[must_use]
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            Self::Unsatisfiable { .. } | Self::DependencyCycle(_) | Self::FeatureDisabled { .. }
        )
    }

    /// Returns true for failures raised while a unit was running.
    #[must_use]
    pub fn is_invocation(&self) -> bool {
        matches!(
            self,
            Self::Invocation { .. }
                | Self::Failure { .. }
                | Self::OwnershipViolation { .. }
                | Self::Tree(_)
        )
    }

    /// Returns true for scheduler defects.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Consistency(_) | Self::SessionPoisoned | Self::LockError | Self::ThreadPool(_)
        )
    }
}
