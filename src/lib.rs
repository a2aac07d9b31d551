// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # passplan
//!
//! Declarative pass scheduling for tree-shaped compiler IRs.
//!
//! A transformation pipeline is made of many independently written units (desugaring, cast
//! simplification, dead-branch elimination, reachability marking, ...). None of them calls
//! another. Instead every unit declares a contract: which analysis facts it needs, which it adds
//! and which it invalidates, at which node granularity it runs and which features gate it.
//! `passplan` derives a correct order from those contracts and runs it against a live IR,
//! in parallel across independent subtrees.
//!
//! ## Features
//!
//! - **Declarative contracts** - needs / adds / removes over scoped tags and typed markers
//! - **STRIPS-style planning** - minimal, deterministic plans with cycle and threat detection
//! - **Parallel execution** - rayon worker pool, one barrier per step, exclusive units
//! - **Isolated state** - staged marker writes and declared tag effects committed per step
//! - **Structured failures** - one error enum, the first failure wins, no rollback
//!
//! ## Quick Start
//!
//! ```rust
//! use passplan::prelude::*;
//!
//! const RAW: Tag = Tag::new("raw", NodeKind::Method);
//! const DESUGARED: Tag = Tag::new("desugared", NodeKind::Method);
//! const OPTIMIZED: Tag = Tag::new("optimized", NodeKind::Method);
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
//! registry.register(FnUnit::new(
//!     Descriptor::builder("optimize")
//!         .granularity(NodeKind::Method)
//!         .needs(DESUGARED)
//!         .removes(DESUGARED)
//!         .adds(OPTIMIZED)
//!         .build()?,
//!     |cx: &mut UnitContext<'_>| {
//!         cx.events().info(format!("optimizing {}", cx.node()));
//!         Ok(())
//!     },
//! ))?;
//!
//! let tree = IrTree::new("app");
//! let package = tree.add_child(tree.root(), NodeKind::Package, "com.example")?;
//! let ty = tree.add_child(package, NodeKind::Type, "Main")?;
//! let method = tree.add_child(ty, NodeKind::Method, "main")?;
//!
//! let pipeline = Pipeline::new(registry);
//! let mut session = Session::new(tree, Features::new());
//!
//! let plan = pipeline.plan(&session, &TagState::new(), &Goal::fact(OPTIMIZED))?;
//! assert_eq!(plan.unit_names(), vec!["parse", "desugar", "optimize"]);
//!
//! pipeline.run(&mut session, &TagState::new(), &Goal::fact(OPTIMIZED))?;
//! assert!(session.state().has_tag(method, OPTIMIZED));
//! assert!(session.state().has_tag(method, RAW));
//! assert!(!session.state().has_tag(method, DESUGARED));
//! # Ok::<(), passplan::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Program tree, node kinds and granularity adapters
//! - [`state`] - Tags, markers and the per-node state store
//! - [`planning`] - Descriptors, registry, planner and plans
//! - [`compiler`] - Session, executor, unit context, events and the pipeline facade
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`], an alias over [`Error`]. Errors are grouped
//! into configuration defects, planning failures, invocation failures and internal consistency
//! violations; see [`Error`] for the classification helpers.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use passplan::prelude::*;
///
/// let features = Features::parse("inline,-shrink");
/// assert!(features.is_enabled(Feature::new("inline")));
/// assert!(!features.is_enabled(Feature::new("shrink")));
/// ```
pub mod prelude;

pub mod compiler;
pub mod ir;
pub mod planning;
pub mod state;

/// `passplan` Result type
pub type Result<T> = std::result::Result<T, Error>;

/// `passplan` Error type
pub use error::Error;
