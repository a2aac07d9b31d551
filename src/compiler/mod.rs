//! Execution of plans against a compilation session.
//!
//! This module is the runtime half of the crate:
//!
//! - [`crate::planning`] decides *what* runs in which order
//! - [`compiler`](self) runs it against a live [`Session`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Execution                                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Session                     Explicit per-compilation context    │
//! │    ├─ IrTree                  (program tree)                     │
//! │    ├─ StateStore              (tags and markers per node)        │
//! │    ├─ Features                (fixed feature configuration)      │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  Executor                    One barrier per plan step           │
//! │    ├─ expand                  AdapterSet: root → granularity     │
//! │    ├─ verify                  needs hold on the target nodes     │
//! │    ├─ invoke                  rayon pool, exclusive lock         │
//! │    └─ commit                  staged markers, declared tags      │
//! │                                                                  │
//! │  UnitContext                 Subtree-scoped handle per invocation│
//! │  Probe                       Optional metrics hook               │
//! │  Pipeline                    validate → plan → execute           │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod context;
mod events;
mod executor;
mod pipeline;
mod session;

pub use config::{ExecutorConfig, PipelineConfig};
pub use context::UnitContext;
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter, Probe};
pub use executor::{ExecutionReport, Executor, StepReport};
pub use pipeline::Pipeline;
pub use session::Session;
