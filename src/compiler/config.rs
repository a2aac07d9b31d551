//! Executor and pipeline configuration.

use crate::planning::PlannerConfig;

/// Configuration of the [`Executor`](crate::compiler::Executor).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Size of the worker pool. `None` lets rayon pick (one worker per logical CPU).
    pub worker_threads: Option<usize>,

    /// Assert before every step that the nodes it runs on satisfy its needs (default: true).
    pub verify_consistency: bool,

    /// Prefix of the worker thread names (default: `"passplan-worker"`).
    pub thread_name_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            verify_consistency: true,
            thread_name_prefix: "passplan-worker".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Enables or disables the consistency check before each step.
    #[must_use]
    pub fn with_consistency_checks(mut self, enabled: bool) -> Self {
        self.verify_consistency = enabled;
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

/// Configuration of a [`Pipeline`](crate::compiler::Pipeline).
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Planner settings
    pub planner: PlannerConfig,
    /// Executor settings
    pub executor: ExecutorConfig,
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the planner settings.
    #[must_use]
    pub fn with_planner(mut self, planner: PlannerConfig) -> Self {
        self.planner = planner;
        self
    }

    /// Replaces the executor settings.
    #[must_use]
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }
}
