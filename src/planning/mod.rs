//! Declarative description and planning of transformation units.
//!
//! Units never call each other. Each one states a [`Descriptor`] (needs, adds, removes,
//! features, granularity) and the [`Planner`] derives a [`Plan`] that reaches a [`Goal`] from an
//! initial [`TagState`](crate::state::TagState).
//!
//! # Key Types
//!
//! - [`Unit`] / [`FnUnit`] - Schedulable transformation with its contract
//! - [`Registry`] - Indexed catalog of units, validated before planning
//! - [`Planner`] / [`PlannerConfig`] - STRIPS-style plan construction
//! - [`Plan`] / [`PlanStep`] - Immutable, totally ordered result
//! - [`Features`] - Enabled/disabled feature flags gating units
//!
//! # Example
//!
//! ```rust
//! use passplan::prelude::*;
//!
//! const RAW: Tag = Tag::new("raw", NodeKind::Method);
//! const DESUGARED: Tag = Tag::new("desugared", NodeKind::Method);
//!
//! let mut registry = Registry::new();
//! registry.register(PassiveUnit::passive(
//!     Descriptor::builder("parse").granularity(NodeKind::Method).adds(RAW).build()?,
//! ))?;
//! registry.register(PassiveUnit::passive(
//!     Descriptor::builder("desugar")
//!         .granularity(NodeKind::Method)
//!         .needs(RAW)
//!         .adds(DESUGARED)
//!         .build()?,
//! ))?;
//!
//! let features = Features::new();
//! let plan = Planner::new(&registry, &features).plan(&TagState::new(), &Goal::fact(DESUGARED))?;
//! assert_eq!(plan.unit_names(), vec!["parse", "desugar"]);
//! # Ok::<(), passplan::Error>(())
//! ```

mod descriptor;
mod features;
mod plan;
mod planner;
mod registry;
mod unit;

pub use descriptor::{Descriptor, DescriptorBuilder, Filter};
pub use features::{Feature, Features};
pub use plan::{Goal, Plan, PlanStep, PlanWarning};
pub use planner::{FeatureGatePolicy, Planner, PlannerConfig};
pub use registry::{Registry, ValidationReport};
pub use unit::{FnUnit, PassiveUnit, Unit};
