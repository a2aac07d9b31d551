//! # passplan Prelude
//!
//! The types needed to declare units, build plans and run them.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all passplan operations
pub use crate::Error;

/// The result type used throughout passplan
pub use crate::Result;

// ================================================================================================
// Program Tree
// ================================================================================================

/// Nodes, kinds and the tree itself
pub use crate::ir::{IrTree, Node, NodeId, NodeKind};

/// Granularity expansion
pub use crate::ir::{Adapter, AdapterSet, DescendantAdapter};

// ================================================================================================
// Analysis State
// ================================================================================================

/// Facts and their storage
pub use crate::state::{
    ClonePolicy, Fact, Marker, MarkerKind, NodeState, StateStore, Tag, TagState,
};

// ================================================================================================
// Planning
// ================================================================================================

/// Unit contracts and implementations
pub use crate::planning::{Descriptor, DescriptorBuilder, FnUnit, PassiveUnit, Unit};

/// Feature gating
pub use crate::planning::{Feature, Features};

/// Catalog, planner and plans
pub use crate::planning::{
    FeatureGatePolicy, Goal, Plan, PlanStep, PlanWarning, Planner, PlannerConfig, Registry,
};

// ================================================================================================
// Execution
// ================================================================================================

/// Sessions, execution and observability
pub use crate::compiler::{
    Event, EventKind, EventLog, ExecutionReport, Executor, ExecutorConfig, Pipeline, PipelineConfig,
    Probe, Session, UnitContext,
};

/// Failure construction for unit code
pub use crate::failure;
