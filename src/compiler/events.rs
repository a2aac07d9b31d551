//! Event logging for plan execution.
//!
//! The executor records what happens during a session (steps, invocations, structural edits,
//! failures) into the session's [`EventLog`]. Units may add their own entries through
//! [`UnitContext::events`](crate::compiler::UnitContext::events). Events can be inspected for
//! debugging or safely ignored when not needed.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Collection of events with query and summary capabilities
//! - [`EventBuilder`] - Fluent API for creating events
//! - [`Probe`] - Optional hook notified of step and invocation timing
//!
//! # Example
//!
//! ```rust
//! use passplan::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::StepStarted)
//!     .unit("desugar")
//!     .message("desugar on 12 method nodes");
//! log.info("execution started");
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(log.count_kind(EventKind::StepStarted), 1);
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    time::Duration,
};

use crate::{ir::NodeId, planning::PlanStep, Error};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A plan step started.
    StepStarted,
    /// A plan step completed and its effects were committed.
    StepCompleted,
    /// A unit returned successfully on a node.
    InvocationCompleted,
    /// A unit failed on a node.
    InvocationFailed,
    /// A node was skipped because the unit's filter rejected it.
    NodeSkipped,
    /// An invocation created a node.
    NodeCreated,
    /// An invocation removed a node.
    NodeRemoved,
    /// The planner reported a non-fatal observation.
    PlanWarning,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::StepStarted => "step started",
            Self::StepCompleted => "step completed",
            Self::InvocationCompleted => "invocation completed",
            Self::InvocationFailed => "invocation failed",
            Self::NodeSkipped => "node skipped",
            Self::NodeCreated => "node created",
            Self::NodeRemoved => "node removed",
            Self::PlanWarning => "plan warning",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a structural edit of the tree.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::NodeCreated | Self::NodeRemoved)
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(
            self,
            Self::Info | Self::Warning | Self::Error | Self::PlanWarning
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The unit the event belongs to (if applicable).
    pub unit: Option<String>,
    /// The node where the event occurred (if applicable).
    pub node: Option<NodeId>,
    /// Human-readable description.
    pub message: String,
    /// Measured duration (steps and invocations).
    pub duration: Option<Duration>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            unit: None,
            node: None,
            message: message.into(),
            duration: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    unit: Option<String>,
    node: Option<NodeId>,
    message: Option<String>,
    duration: Option<Duration>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            unit: None,
            node: None,
            message: None,
            duration: None,
        }
    }

    /// Associates the event with a unit.
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the node where the event occurred.
    pub fn node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Attaches a measured duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            unit: self.unit.take(),
            node: self.node.take(),
            message,
            duration: self.duration.take(),
        });
    }
}

/// Collection of events of one session.
///
/// This type is thread-safe: events can be appended concurrently from worker threads using
/// shared references (`&self`).
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        for (_, event) in &self.events {
            new_log.events.push(event.clone());
        }
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Returns an iterator over events of a specific unit.
    pub fn filter_unit<'a>(&'a self, unit: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events
            .iter()
            .filter_map(move |(_, e)| (e.unit.as_deref() == Some(unit)).then_some(e))
    }

    /// Returns an iterator over diagnostic events only.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(|(_, e)| e.kind.is_diagnostic().then_some(e))
    }

    /// Returns an iterator over error events.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Sums the invocation time per unit.
    #[must_use]
    pub fn time_by_unit(&self) -> BTreeMap<String, Duration> {
        let mut times = BTreeMap::new();
        for (_, event) in &self.events {
            if let (EventKind::InvocationCompleted, Some(unit), Some(duration)) =
                (event.kind, &event.unit, event.duration)
            {
                *times.entry(unit.clone()).or_insert(Duration::ZERO) += duration;
            }
        }
        times
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut counts: Vec<(EventKind, usize)> = self.count_by_kind().into_iter().collect();
        counts.sort();
        let mut parts: Vec<String> = counts
            .iter()
            .map(|(kind, count)| format!("{count} {}", kind.description()))
            .collect();

        for (unit, time) in self.time_by_unit() {
            parts.push(format!("{unit}: {time:?}"));
        }

        parts.join(", ")
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

/// Iterator wrapper for EventLog that yields &Event
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

/// Observability hook for external metrics collection.
///
/// All methods default to doing nothing; attaching a probe never changes scheduling or results.
/// Probes are called from worker threads and must be thread-safe.
pub trait Probe: Send + Sync {
    /// A step is about to fan out over `nodes` nodes.
    fn step_started(&self, _step: &PlanStep, _nodes: usize) {}

    /// A step finished and its effects were committed.
    fn step_finished(&self, _step: &PlanStep, _elapsed: Duration) {}

    /// `unit` returned successfully on `node`.
    fn invocation_finished(&self, _unit: &str, _node: NodeId, _elapsed: Duration) {}

    /// `unit` failed on `node`.
    fn invocation_failed(&self, _unit: &str, _node: NodeId, _error: &Error) {}
}
