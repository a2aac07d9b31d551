//! The capability interface of schedulable units.

use crate::{compiler::UnitContext, planning::descriptor::Descriptor, Result};

/// A schedulable transformation unit.
///
/// The scheduler only ever calls [`Unit::descriptor`] and [`Unit::apply`]. Everything the
/// transformation does to the IR is opaque to it; tag changes are derived from the descriptor
/// and committed by the executor once the invocation returned successfully.
///
/// Units must be thread-safe (Send + Sync): invocations of one step run in parallel on
/// disjoint subtrees.
pub trait Unit: Send + Sync {
    /// The unit's contract.
    fn descriptor(&self) -> &Descriptor;

    /// Transforms the node of `cx`.
    ///
    /// # Errors
    ///
    /// Any error aborts the session. Failures are assumed deterministic and never retried.
    fn apply(&self, cx: &mut UnitContext<'_>) -> Result<()>;
}

/// A unit backed by a closure.
pub struct FnUnit<F> {
    descriptor: Descriptor,
    body: F,
}

impl<F> FnUnit<F>
where
    F: Fn(&mut UnitContext<'_>) -> Result<()> + Send + Sync,
{
    /// Creates a unit running `body` on each node.
    #[must_use]
    pub fn new(descriptor: Descriptor, body: F) -> Self {
        Self { descriptor, body }
    }
}

/// A [`FnUnit`] without body, see [`FnUnit::passive`].
pub type PassiveUnit = FnUnit<fn(&mut UnitContext<'_>) -> Result<()>>;

impl PassiveUnit {
    /// Creates a unit whose only effect is its declared tag changes.
    #[must_use]
    pub fn passive(descriptor: Descriptor) -> Self {
        fn nothing(_: &mut UnitContext<'_>) -> Result<()> {
            Ok(())
        }
        Self {
            descriptor,
            body: nothing,
        }
    }
}

impl<F> Unit for FnUnit<F>
where
    F: Fn(&mut UnitContext<'_>) -> Result<()> + Send + Sync,
{
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn apply(&self, cx: &mut UnitContext<'_>) -> Result<()> {
        (self.body)(cx)
    }
}
