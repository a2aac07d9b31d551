//! Plan execution.
//!
//! The [`Executor`] is a single-threaded driver that walks a [`Plan`] step by step. Each step
//! is expanded through the adapter chain into the live nodes of its granularity, and the
//! invocations for those nodes run in parallel on a bounded rayon pool. Steps are separated by
//! a barrier: the next step starts only after every invocation of the previous one returned
//! and its effects were committed.
//!
//! # Commit Protocol
//!
//! Invocations never write analysis state directly. Marker writes are staged in the
//! [`UnitContext`] and, together with the unit's declared tag effects, committed for every
//! successful invocation once the whole step has finished. Siblings therefore never observe
//! each other's state changes mid-step.
//!
//! # Filtered nodes
//!
//! A node rejected by the unit's applicability filter is not invoked and is reported as
//! skipped, but the step's declared effects are still committed to it: tags are added and
//! removed, and removed marker kinds are cleared, exactly as for invoked nodes. The tag state
//! after a step therefore always matches what the plan promised, whatever the filter decided.
//! Units that must leave some nodes untouched at the tag level should run at a granularity
//! where those nodes are not targets, not rely on the filter.
//!
//! Markers cannot be fabricated for skipped nodes. A unit needing a marker is only checked on
//! the targets its own filter accepts, so producer and consumer filters have to agree.
//!
//! # Failure
//!
//! The first failing invocation cancels the step: invocations that have not started yet are
//! skipped, those in flight finish. Effects of the invocations that succeeded are still
//! committed (there is no rollback), no further step runs, the session is poisoned and the
//! originating error is returned.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{debug, error, trace};
use rayon::prelude::*;

use crate::{
    compiler::{
        config::ExecutorConfig,
        context::{Staged, UnitContext},
        events::{EventKind, Probe},
        session::Session,
    },
    ir::{AdapterSet, NodeId, NodeKind},
    planning::{Descriptor, Plan, PlanStep, Registry, Unit},
    state::{Fact, MarkerKind, TagState},
    Error, Result,
};

/// Statistics of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Name of the unit
    pub unit: String,
    /// Granularity the step ran at
    pub granularity: NodeKind,
    /// Number of target nodes
    pub nodes: usize,
    /// Number of invocations of the unit
    pub invoked: usize,
    /// Number of nodes rejected by the unit's filter
    pub skipped: usize,
    /// Number of nodes created by the step
    pub created: usize,
    /// Number of nodes removed by the step
    pub removed: usize,
    /// Wall time of the step including the commit
    pub elapsed: Duration,
}

/// Result of a successful plan execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    steps: Vec<StepReport>,
    elapsed: Duration,
}

impl ExecutionReport {
    /// Per-step statistics, in plan order
    #[must_use]
    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    /// The statistics of the step running `unit`.
    #[must_use]
    pub fn step(&self, unit: &str) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.unit == unit)
    }

    /// Number of executed steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step was executed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total number of unit invocations
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.steps.iter().map(|step| step.invoked).sum()
    }

    /// Wall time of the whole execution
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// How one invocation ended.
enum Outcome {
    /// The filter rejected the node; declared effects still apply
    Skipped,
    Completed(Staged),
    /// `error` is only set for the failure that cancelled the step
    Failed {
        staged: Staged,
        error: Option<Error>,
    },
    /// Not started because the step was already cancelled
    Cancelled,
}

/// Runs plans against a session.
pub struct Executor {
    config: ExecutorConfig,
    pool: rayon::ThreadPool,
    probe: Option<Arc<dyn Probe>>,
}

impl Executor {
    /// Creates an executor with its own worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadPool`] if the pool cannot be created.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.unwrap_or(0))
            .thread_name(move |index| format!("{prefix}-{index}"))
            .build()?;

        Ok(Self {
            config,
            pool,
            probe: None,
        })
    }

    /// Attaches an observability probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// The executor's configuration
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Number of worker threads
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Executes `plan` against `session`, consuming the plan.
    ///
    /// The plan's initial facts are first materialized on the session's nodes through
    /// [`Session::seed`].
    ///
    /// # Arguments
    ///
    /// * `plan` - The plan to run, built from `registry`.
    /// * `registry` - Supplies the unit implementations.
    /// * `adapters` - Expands each step's granularity into nodes.
    /// * `session` - The session to transform, exclusively borrowed for the whole execution.
    ///
    /// # Errors
    ///
    /// [`Error::SessionPoisoned`] if the session failed before, the originating
    /// [`Error::Invocation`] of a failed step, [`Error::Consistency`] if a step's needs do not
    /// hold, and [`Error::MissingAdapter`] for an unreachable granularity. Any error poisons the
    /// session.
    pub fn execute(
        &self,
        plan: Plan,
        registry: &Registry,
        adapters: &AdapterSet,
        session: &mut Session,
    ) -> Result<ExecutionReport> {
        if session.is_poisoned() {
            return Err(Error::SessionPoisoned);
        }

        let session: &Session = session;
        let result = self.run(&plan, registry, adapters, session);
        if let Err(err) = &result {
            session.poison();
            session.events().error(format!("Execution of {plan} failed: {err}"));
            error!("execution of {plan} failed: {err}");
        }
        result
    }

    fn run(
        &self,
        plan: &Plan,
        registry: &Registry,
        adapters: &AdapterSet,
        session: &Session,
    ) -> Result<ExecutionReport> {
        let started = Instant::now();
        session.seed(plan.initial());
        for warning in plan.warnings() {
            session
                .events()
                .record(EventKind::PlanWarning)
                .message(warning.to_string());
        }

        let mut expected = plan.initial().clone();
        let mut assumed: BTreeSet<MarkerKind> = plan
            .initial()
            .iter()
            .filter_map(Fact::as_marker)
            .collect();
        let mut report = ExecutionReport::default();

        for step in plan.steps() {
            let unit = registry.get(&step.unit).ok_or_else(|| {
                Error::Consistency(format!("Planned unit {} is not registered", step.unit))
            })?;
            let descriptor = unit.descriptor();
            let targets = adapters.expand_root(session.tree(), step.granularity)?;

            if self.config.verify_consistency {
                verify_needs(session, descriptor, &targets, &assumed)?;
            }

            let stats = self.run_step(step, unit.as_ref(), &targets, &expected, session)?;
            expected.apply(descriptor.adds(), descriptor.removes());
            for kind in descriptor
                .adds()
                .iter()
                .chain(descriptor.removes())
                .filter_map(Fact::as_marker)
            {
                assumed.remove(&kind);
            }
            report.steps.push(stats);
        }

        report.elapsed = started.elapsed();
        debug!(
            "executed {} steps with {} invocations in {:?}",
            report.len(),
            report.invocations(),
            report.elapsed
        );
        Ok(report)
    }

    fn run_step(
        &self,
        step: &PlanStep,
        unit: &dyn Unit,
        targets: &[NodeId],
        expected: &TagState,
        session: &Session,
    ) -> Result<StepReport> {
        let started = Instant::now();
        debug!("step {step} on {} nodes", targets.len());
        session
            .events()
            .record(EventKind::StepStarted)
            .unit(&step.unit)
            .message(format!("{step} on {} nodes", targets.len()));
        if let Some(probe) = &self.probe {
            probe.step_started(step, targets.len());
        }

        let cancelled = AtomicBool::new(false);
        let outcomes: Vec<(NodeId, Outcome)> = self.pool.install(|| {
            targets
                .par_iter()
                .map(|node| (*node, self.invoke(step, unit, *node, session, &cancelled)))
                .collect()
        });

        let mut report = StepReport {
            unit: step.unit.clone(),
            granularity: step.granularity,
            nodes: targets.len(),
            invoked: 0,
            skipped: 0,
            created: 0,
            removed: 0,
            elapsed: Duration::ZERO,
        };
        let mut failure = None;

        // Commit in target order, subtrees are disjoint so the order is not observable
        for (node, outcome) in outcomes {
            match outcome {
                Outcome::Skipped => {
                    report.skipped += 1;
                    commit_effects(session, unit.descriptor(), node);
                }
                Outcome::Completed(staged) => {
                    report.invoked += 1;
                    report.created += staged.created.len();
                    report.removed += staged.removed.len();
                    commit_staged(session, staged, expected);
                    commit_effects(session, unit.descriptor(), node);
                }
                Outcome::Failed { staged, error } => {
                    report.invoked += 1;
                    for removed in &staged.removed {
                        session.state().drop_node(*removed);
                    }
                    if error.is_some() {
                        failure = error;
                    }
                }
                Outcome::Cancelled => {}
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        report.elapsed = started.elapsed();
        session
            .events()
            .record(EventKind::StepCompleted)
            .unit(&step.unit)
            .duration(report.elapsed)
            .message(format!(
                "{step}: {} invoked, {} skipped, {} created, {} removed",
                report.invoked, report.skipped, report.created, report.removed
            ));
        if let Some(probe) = &self.probe {
            probe.step_finished(step, report.elapsed);
        }
        Ok(report)
    }

    fn invoke(
        &self,
        step: &PlanStep,
        unit: &dyn Unit,
        node: NodeId,
        session: &Session,
        cancelled: &AtomicBool,
    ) -> Outcome {
        if cancelled.load(Ordering::Acquire) {
            return Outcome::Cancelled;
        }

        let applies = session
            .tree()
            .get(node)
            .is_some_and(|target| unit.descriptor().applies_to(&target));
        if !applies {
            trace!("{} skips {node}", step.unit);
            session
                .events()
                .record(EventKind::NodeSkipped)
                .unit(&step.unit)
                .node(node);
            return Outcome::Skipped;
        }

        let mut cx = UnitContext::new(session, &step.unit, node, step.granularity);
        let started = Instant::now();
        let result = apply(unit, &mut cx, step.exclusive, session);
        let elapsed = started.elapsed();
        let staged = cx.into_staged();

        match result {
            Ok(()) => {
                trace!("{} on {node} took {elapsed:?}", step.unit);
                session
                    .events()
                    .record(EventKind::InvocationCompleted)
                    .unit(&step.unit)
                    .node(node)
                    .duration(elapsed);
                if let Some(probe) = &self.probe {
                    probe.invocation_finished(&step.unit, node, elapsed);
                }
                Outcome::Completed(staged)
            }
            Err(source) => {
                let err = Error::Invocation {
                    unit: step.unit.clone(),
                    node,
                    source: Box::new(source),
                };
                let originating = cancelled
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if originating {
                    error!("{err}");
                } else {
                    debug!("further failure in cancelled step: {err}");
                }

                session
                    .events()
                    .record(EventKind::InvocationFailed)
                    .unit(&step.unit)
                    .node(node)
                    .duration(elapsed)
                    .message(err.to_string());
                if let Some(probe) = &self.probe {
                    probe.invocation_failed(&step.unit, node, &err);
                }

                Outcome::Failed {
                    staged,
                    error: originating.then_some(err),
                }
            }
        }
    }
}

/// Runs the unit, holding the session-wide lock for exclusive units.
fn apply(unit: &dyn Unit, cx: &mut UnitContext<'_>, exclusive: bool, session: &Session) -> Result<()> {
    if exclusive {
        let _guard = lock!(session.exclusive());
        unit.apply(cx)
    } else {
        unit.apply(cx)
    }
}

/// Commits the structural bookkeeping and staged markers of a successful invocation.
///
/// Created nodes receive the tags the plan guarantees for their kind before the step.
fn commit_staged(session: &Session, staged: Staged, expected: &TagState) {
    let tree = session.tree();
    let state = session.state();

    for node in &staged.removed {
        state.drop_node(*node);
    }
    for node in &staged.created {
        if let Some(kind) = tree.kind(*node) {
            for tag in expected.tags_of(kind) {
                state.insert_tag(*node, tag);
            }
        }
    }
    for (node, changes) in staged.markers {
        if tree.contains(node) {
            state.apply_marker_changes(node, changes);
        }
    }
}

/// Applies the declared effects to `target` and its subtree.
///
/// Tags change on every node of the tag's scope below `target`, removed marker kinds are cleared
/// from every node of the subtree.
fn commit_effects(session: &Session, descriptor: &Descriptor, target: NodeId) {
    let tree = session.tree();
    let state = session.state();
    if !tree.contains(target) {
        return;
    }

    let subtree: Vec<(NodeId, NodeKind)> = tree
        .descendants(target)
        .into_iter()
        .filter_map(|node| tree.kind(node).map(|kind| (node, kind)))
        .collect();

    for tag in descriptor.removes().iter().filter_map(Fact::as_tag) {
        for (node, _) in subtree.iter().filter(|(_, kind)| *kind == tag.scope()) {
            state.remove_tag(*node, tag);
        }
    }
    for tag in descriptor.adds().iter().filter_map(Fact::as_tag) {
        for (node, _) in subtree.iter().filter(|(_, kind)| *kind == tag.scope()) {
            state.insert_tag(*node, tag);
        }
    }
    for kind in descriptor.removes().iter().filter_map(Fact::as_marker) {
        for (node, _) in &subtree {
            state.remove_marker_kind(*node, kind);
        }
    }
}

/// Checks that the needs of a step hold on the nodes it is about to run on.
///
/// Tag needs scoped at or below the granularity are checked in the targets' subtrees, coarser
/// needs on the enclosing ancestors, unrelated scopes on every live node of that scope. A marker
/// need holds for a target accepted by the filter when the target, a node below it or one of its
/// ancestors carries a marker of that kind. Marker kinds in `assumed` were asserted by the
/// caller's initial state and are not checked.
fn verify_needs(
    session: &Session,
    descriptor: &Descriptor,
    targets: &[NodeId],
    assumed: &BTreeSet<MarkerKind>,
) -> Result<()> {
    let tree = session.tree();
    let granularity = descriptor.granularity();

    for tag in descriptor.needs().iter().filter_map(Fact::as_tag) {
        let scope = tag.scope();
        let holders: Vec<NodeId> = if granularity.encloses(scope) {
            targets
                .iter()
                .flat_map(|target| tree.descendants_of_kind(*target, scope))
                .collect()
        } else if scope.encloses(granularity) {
            targets
                .iter()
                .filter_map(|target| tree.ancestor_of_kind(*target, scope))
                .collect()
        } else {
            tree.nodes_of_kind(scope)
        };

        if let Some(node) = holders
            .into_iter()
            .find(|node| !session.state().has_tag(*node, tag))
        {
            return Err(Error::Consistency(format!(
                "{} needs {tag} but node {node} does not carry it",
                descriptor.name()
            )));
        }
    }

    let markers: Vec<MarkerKind> = descriptor
        .needs()
        .iter()
        .filter_map(Fact::as_marker)
        .filter(|kind| !assumed.contains(kind))
        .collect();
    if markers.is_empty() {
        return Ok(());
    }

    for target in targets {
        let applies = tree
            .get(*target)
            .is_some_and(|node| descriptor.applies_to(&node));
        if !applies {
            continue;
        }
        if let Some(kind) = markers
            .iter()
            .find(|kind| !marker_in_reach(session, *target, **kind))
        {
            return Err(Error::Consistency(format!(
                "{} needs {kind} but node {target} has none in reach",
                descriptor.name()
            )));
        }
    }

    Ok(())
}

/// Returns true if `node`, a node below it or one of its ancestors carries a `kind` marker.
fn marker_in_reach(session: &Session, node: NodeId, kind: MarkerKind) -> bool {
    let tree = session.tree();
    let state = session.state();

    if tree
        .descendants(node)
        .into_iter()
        .any(|below| state.has_marker(below, kind))
    {
        return true;
    }

    let mut current = tree.parent(node);
    while let Some(ancestor) = current {
        if state.has_marker(ancestor, kind) {
            return true;
        }
        current = tree.parent(ancestor);
    }
    false
}
