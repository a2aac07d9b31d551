//! Validate → plan → execute in one call.

use std::sync::Arc;

use log::{debug, info};

use crate::{
    compiler::{
        config::PipelineConfig,
        events::Probe,
        executor::{ExecutionReport, Executor},
        session::Session,
    },
    ir::AdapterSet,
    planning::{Goal, Plan, Planner, Registry, ValidationReport},
    state::TagState,
    Result,
};

/// A registry, the adapters for its granularities and the settings to run it with.
///
/// # Example
///
/// ```rust
/// use passplan::prelude::*;
///
/// const RAW: Tag = Tag::new("raw", NodeKind::Method);
///
/// let mut registry = Registry::new();
/// registry.register(FnUnit::new(
///     Descriptor::builder("parse").granularity(NodeKind::Method).adds(RAW).build()?,
///     |_cx: &mut UnitContext<'_>| Ok(()),
/// ))?;
///
/// let tree = IrTree::new("app");
/// let package = tree.add_child(tree.root(), NodeKind::Package, "app")?;
/// let ty = tree.add_child(package, NodeKind::Type, "Main")?;
/// let method = tree.add_child(ty, NodeKind::Method, "main")?;
///
/// let mut session = Session::new(tree, Features::new());
/// let report = Pipeline::new(registry).run(&mut session, &TagState::new(), &Goal::fact(RAW))?;
/// assert_eq!(report.invocations(), 1);
/// assert!(session.state().has_tag(method, RAW));
/// # Ok::<(), passplan::Error>(())
/// ```
pub struct Pipeline {
    registry: Registry,
    adapters: AdapterSet,
    config: PipelineConfig,
    probe: Option<Arc<dyn Probe>>,
}

impl Pipeline {
    /// Creates a pipeline with the default adapters and configuration.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            adapters: AdapterSet::default(),
            config: PipelineConfig::default(),
            probe: None,
        }
    }

    /// Replaces the adapters.
    #[must_use]
    pub fn with_adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = adapters;
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches an observability probe to every execution.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// The unit catalog
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The adapters
    #[must_use]
    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// Validates the catalog and checks that every granularity in use can be reached.
    ///
    /// # Errors
    ///
    /// Fails fast on unresolved `uses`, contradictory descriptors and
    /// [`Error::MissingAdapter`](crate::Error::MissingAdapter).
    pub fn validate(&self, initial: &TagState) -> Result<ValidationReport> {
        let report = self.registry.validate_with(initial)?;
        for kind in self.registry.granularities() {
            self.adapters.chain(kind)?;
        }
        Ok(report)
    }

    /// Builds the plan for `goal` with the session's features.
    ///
    /// # Errors
    ///
    /// Any configuration defect or planning failure.
    pub fn plan(&self, session: &Session, initial: &TagState, goal: &Goal) -> Result<Plan> {
        Planner::new(&self.registry, session.features())
            .with_config(self.config.planner.clone())
            .plan(initial, goal)
    }

    /// Validates, plans and executes `goal` against `session`.
    ///
    /// # Errors
    ///
    /// The first configuration defect, planning failure or execution failure. Only execution
    /// failures poison the session.
    pub fn run(
        &self,
        session: &mut Session,
        initial: &TagState,
        goal: &Goal,
    ) -> Result<ExecutionReport> {
        self.validate(initial)?.into_result()?;

        let plan = self.plan(session, initial, goal)?;
        debug!("plan for {goal}:\n{}", plan.dump(&self.registry));

        let mut executor = Executor::new(self.config.executor.clone())?;
        if let Some(probe) = &self.probe {
            executor = executor.with_probe(Arc::clone(probe));
        }

        let report = executor.execute(plan, &self.registry, &self.adapters, session)?;
        info!(
            "{goal}: {} steps, {} invocations in {:?}",
            report.len(),
            report.invocations(),
            report.elapsed()
        );
        Ok(report)
    }
}
