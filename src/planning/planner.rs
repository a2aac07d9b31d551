//! Plan construction.
//!
//! The planner treats every unit as a STRIPS action: precondition = needs, effect = adds and
//! not removes. Building a plan happens in three phases:
//!
//! 1. **Selection**: backward closure from the goal facts. For every fact that is not initially
//!    true and not yet produced by a selected unit, one producer is selected, preferring
//!    producers reachable from the initial state, then by `(order_hint, name)`. A maximal goal
//!    selects every eligible, reachable unit instead.
//! 2. **Ordering**: every need of a selected unit, and every goal fact, is supported by one
//!    causal link from the initial state or from one selected producer. `uses` targets precede
//!    their users, and so does the only possible producer of a need; a cycle among these edges
//!    is a dependency cycle. A unit removing the fact of a link is ordered after the link's
//!    consumer (demotion) or before its producer (promotion). Supporter and threat choices are
//!    searched with backtracking, and the resulting graph is linearized with Kahn's algorithm,
//!    always picking the smallest `(order_hint, name)` among ready units.
//! 3. **Re-production**: when some need cannot be supported, an additional producer of the
//!    missing fact is selected and ordering starts over. The linearization is finally simulated
//!    from the initial state.
//!
//! Every collection involved is ordered, so identical inputs yield identical plans regardless of
//! registration order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, warn};

use crate::{
    planning::{
        descriptor::Descriptor,
        features::Features,
        plan::{Goal, Plan, PlanStep, PlanWarning},
        registry::Registry,
    },
    state::{Fact, TagState},
    Error, Result,
};

/// Name used for the goal when it is the consumer of a fact.
const GOAL: &str = "<goal>";

/// What to do about units left out because their features are disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeatureGatePolicy {
    /// Omit them without a trace
    Silent,
    /// Log a warning and record a [`PlanWarning::FeatureGated`] in the plan
    #[default]
    Warn,
}

/// Configuration of the [`Planner`].
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Treatment of feature-gated units (default: [`FeatureGatePolicy::Warn`]).
    pub feature_gate_policy: FeatureGatePolicy,

    /// Run [`Registry::validate_with`] before planning and fail on any defect (default: true).
    pub validate_catalog: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            feature_gate_policy: FeatureGatePolicy::Warn,
            validate_catalog: true,
        }
    }
}

impl PlannerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the feature gate policy.
    #[must_use]
    pub fn with_feature_gate_policy(mut self, policy: FeatureGatePolicy) -> Self {
        self.feature_gate_policy = policy;
        self
    }

    /// Enables or disables catalog validation.
    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_catalog = validate;
        self
    }
}

/// Builds plans from a registry and a feature configuration.
pub struct Planner<'a> {
    registry: &'a Registry,
    features: &'a Features,
    config: PlannerConfig,
}

impl<'a> Planner<'a> {
    /// Creates a planner with the default configuration.
    #[must_use]
    pub fn new(registry: &'a Registry, features: &'a Features) -> Self {
        Self {
            registry,
            features,
            config: PlannerConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Computes the plan for `goal`, starting from the facts in `initial`.
    ///
    /// # Errors
    ///
    /// Configuration defects when catalog validation is enabled, and
    /// [`Error::UnproducibleFact`], [`Error::FeatureDisabled`], [`Error::DependencyCycle`] or
    /// [`Error::Unsatisfiable`] when no plan exists. No partial plan is ever returned.
    pub fn plan(&self, initial: &TagState, goal: &Goal) -> Result<Plan> {
        if self.config.validate_catalog {
            self.registry.validate_with(initial)?.into_result()?;
        }

        let search = Search::new(self.registry, self.features, initial);
        let required = goal.required();
        let mut warnings = Vec::new();

        let mut selected = BTreeSet::new();
        match goal {
            Goal::Maximal => {
                for (index, descriptor) in search.units.iter().enumerate() {
                    if !search.eligible[index] {
                        continue;
                    }
                    if search.reachable[index] {
                        selected.insert(index);
                    } else if let Some(fact) = descriptor
                        .needs()
                        .iter()
                        .find(|fact| !search.reachable_facts.contains(*fact))
                    {
                        debug!("{} is unreachable, {fact} cannot be produced", descriptor.name());
                        warnings.push(PlanWarning::Unreachable {
                            unit: descriptor.name().to_string(),
                            fact: *fact,
                        });
                    }
                }
            }
            Goal::Facts(facts) => {
                let queue = facts.iter().map(|fact| (*fact, GOAL.to_string())).collect();
                search.close(queue, &mut selected)?;
            }
        }

        let (order, final_state) = loop {
            match search.order(&selected, &required)? {
                Ordering::Done { order, state } => break (order, state),
                Ordering::Stuck { fact, unit } => {
                    let producer = search.choose_producer(&fact, &unit, &selected, true)?;
                    debug!(
                        "{fact} is not available to {unit}, adding producer {}",
                        search.units[producer].name()
                    );
                    search.add(producer, &mut selected)?;
                }
            }
        };

        if self.config.feature_gate_policy == FeatureGatePolicy::Warn {
            let relevant: BTreeSet<Fact> = selected
                .iter()
                .flat_map(|index| search.units[*index].needs().iter().copied())
                .chain(required.iter().copied())
                .collect();

            for (index, descriptor) in search.units.iter().enumerate() {
                if search.eligible[index] {
                    continue;
                }
                let omitted = *goal == Goal::Maximal
                    || descriptor.adds().iter().any(|fact| relevant.contains(fact));
                if let (true, Some(feature)) =
                    (omitted, self.features.first_disabled(descriptor.features()))
                {
                    warn!(
                        "{} omitted from plan, feature {feature} is disabled",
                        descriptor.name()
                    );
                    warnings.push(PlanWarning::FeatureGated {
                        unit: descriptor.name().to_string(),
                        feature,
                    });
                }
            }
        }

        let steps: Vec<PlanStep> = order
            .into_iter()
            .map(|index| {
                let descriptor = search.units[index];
                PlanStep {
                    unit: descriptor.name().to_string(),
                    granularity: descriptor.granularity(),
                    exclusive: descriptor.is_exclusive(),
                }
            })
            .collect();
        debug!(
            "planned {} steps for goal {goal}: {}",
            steps.len(),
            steps
                .iter()
                .map(|step| step.unit.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Plan::new(
            goal.clone(),
            initial.clone(),
            steps,
            final_state,
            warnings,
        ))
    }
}

/// Result of one ordering attempt.
enum Ordering {
    /// A verified linearization and the state after it
    Done { order: Vec<usize>, state: TagState },
    /// `fact` is not available when `unit` needs it
    Stuck { fact: Fact, unit: String },
}

/// Working data of one planning run.
///
/// Units are addressed by their index in `units`, which is sorted by `(order_hint, name)`, so
/// ascending index order is the tie-break order.
struct Search<'a> {
    registry: &'a Registry,
    features: &'a Features,
    initial: &'a TagState,
    units: Vec<&'a Descriptor>,
    index: BTreeMap<&'a str, usize>,
    eligible: Vec<bool>,
    reachable: Vec<bool>,
    reachable_facts: BTreeSet<Fact>,
}

impl<'a> Search<'a> {
    fn new(registry: &'a Registry, features: &'a Features, initial: &'a TagState) -> Self {
        let mut units: Vec<&Descriptor> = registry.descriptors().collect();
        units.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let index = units
            .iter()
            .enumerate()
            .map(|(position, descriptor)| (descriptor.name(), position))
            .collect();
        let eligible: Vec<bool> = units
            .iter()
            .map(|descriptor| features.first_disabled(descriptor.features()).is_none())
            .collect();

        // Optimistic forward fixpoint, removals are ignored
        let mut reachable_facts: BTreeSet<Fact> = initial.iter().copied().collect();
        let mut reachable = vec![false; units.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for (position, descriptor) in units.iter().enumerate() {
                if !reachable[position]
                    && eligible[position]
                    && descriptor
                        .needs()
                        .iter()
                        .all(|fact| reachable_facts.contains(fact))
                {
                    reachable[position] = true;
                    reachable_facts.extend(descriptor.adds().iter().copied());
                    changed = true;
                }
            }
        }

        Self {
            registry,
            features,
            initial,
            units,
            index,
            eligible,
            reachable,
            reachable_facts,
        }
    }

    /// Indices of all registered producers of `fact`, in tie-break order.
    fn producers(&self, fact: &Fact) -> Vec<usize> {
        let mut producers: Vec<usize> = self
            .registry
            .producers_of(fact)
            .filter_map(|name| self.index.get(name).copied())
            .collect();
        producers.sort_unstable();
        producers
    }

    /// Picks the producer of `fact` for `requester`.
    ///
    /// With `fresh` set, producers that are already selected are not considered.
    fn choose_producer(
        &self,
        fact: &Fact,
        requester: &str,
        selected: &BTreeSet<usize>,
        fresh: bool,
    ) -> Result<usize> {
        let producers = self.producers(fact);
        let candidates: Vec<usize> = producers
            .iter()
            .copied()
            .filter(|producer| self.eligible[*producer])
            .filter(|producer| !(fresh && selected.contains(producer)))
            .collect();

        if let Some(producer) = candidates
            .iter()
            .find(|producer| self.reachable[**producer])
            .or_else(|| candidates.first())
        {
            return Ok(*producer);
        }

        if producers.is_empty() {
            return Err(Error::UnproducibleFact {
                fact: *fact,
                unit: requester.to_string(),
            });
        }

        for producer in &producers {
            let descriptor = self.units[*producer];
            if let Some(feature) = self.features.first_disabled(descriptor.features()) {
                return Err(Error::FeatureDisabled {
                    fact: *fact,
                    unit: descriptor.name().to_string(),
                    feature: feature.name().to_string(),
                });
            }
        }

        Err(Error::Unsatisfiable {
            fact: *fact,
            unit: requester.to_string(),
        })
    }

    /// Selects `unit` and everything needed to produce its needs.
    fn add(&self, unit: usize, selected: &mut BTreeSet<usize>) -> Result<()> {
        selected.insert(unit);
        let name = self.units[unit].name();
        let queue = self.units[unit]
            .needs()
            .iter()
            .map(|fact| (*fact, name.to_string()))
            .collect();
        self.close(queue, selected)
    }

    /// Backward closure: selects producers until every queued fact is initially true or
    /// produced by a selected unit.
    fn close(
        &self,
        mut queue: VecDeque<(Fact, String)>,
        selected: &mut BTreeSet<usize>,
    ) -> Result<()> {
        while let Some((fact, requester)) = queue.pop_front() {
            if self.initial.contains(fact)
                || selected
                    .iter()
                    .any(|unit| self.units[*unit].adds().contains(&fact))
            {
                continue;
            }

            let producer = self.choose_producer(&fact, &requester, selected, false)?;
            let descriptor = self.units[producer];
            debug!("selected {} to produce {fact} for {requester}", descriptor.name());

            selected.insert(producer);
            queue.extend(
                descriptor
                    .needs()
                    .iter()
                    .map(|need| (*need, descriptor.name().to_string())),
            );
        }
        Ok(())
    }

    /// Orders the selected units and verifies the result.
    ///
    /// Every need is supported by exactly one causal link: the initial state or one selected
    /// producer. Graph nodes `0..n` are the selected units, `n` is the start of the plan (before
    /// every unit) and `n + 1` its end, the consumer of the goal facts.
    fn order(&self, selected: &BTreeSet<usize>, required: &BTreeSet<Fact>) -> Result<Ordering> {
        let nodes: Vec<usize> = selected.iter().copied().collect();
        let position: BTreeMap<usize, usize> = nodes
            .iter()
            .enumerate()
            .map(|(position, unit)| (*unit, position))
            .collect();
        let start = nodes.len();
        let finish = start + 1;
        let mut graph = Graph::new(nodes.len() + 2);
        graph.add(start, finish);
        for node in 0..nodes.len() {
            graph.add(start, node);
            graph.add(node, finish);
        }

        let mut needs = Vec::new();
        for (consumer, unit) in nodes.iter().enumerate() {
            for fact in self.units[*unit].needs() {
                needs.push(self.link_candidates(consumer, *fact, &nodes, start));
            }
        }
        for fact in required {
            needs.push(self.link_candidates(finish, *fact, &nodes, start));
        }

        // Used units before users, and producers that are the only way to support a need
        for (consumer, unit) in nodes.iter().enumerate() {
            for used in self.units[*unit].uses() {
                let used = self
                    .index
                    .get(used.as_str())
                    .and_then(|unit| position.get(unit));
                match used {
                    Some(&used) if used != consumer => graph.add(used, consumer),
                    _ => {}
                }
            }
        }
        for need in &needs {
            if let [only] = need.candidates.as_slice() {
                if *only != start {
                    graph.add(*only, need.consumer);
                }
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(Error::DependencyCycle(
                cycle
                    .into_iter()
                    .map(|node| self.units[nodes[node]].name().to_string())
                    .collect(),
            ));
        }

        let mut removers: BTreeMap<Fact, Vec<usize>> = BTreeMap::new();
        for (node, unit) in nodes.iter().enumerate() {
            for fact in self.units[*unit].removes() {
                removers.entry(*fact).or_default().push(node);
            }
        }

        let mut links = Links {
            needs: &needs,
            removers: &removers,
            budget: LINK_BUDGET,
            failure: None,
        };
        let Some(graph) = links.support(&graph, 0) else {
            let Some((consumer, fact)) = links.failure else {
                return Err(Error::Consistency(
                    "link search failed without an unsupported need".to_string(),
                ));
            };
            let unit = if consumer == finish {
                GOAL.to_string()
            } else {
                self.units[nodes[consumer]].name().to_string()
            };
            return Ok(Ordering::Stuck { fact, unit });
        };

        let Some(linear) = graph.topological_order() else {
            return Err(Error::Consistency(
                "constraint graph became cyclic while resolving removals".to_string(),
            ));
        };
        let order: Vec<usize> = linear
            .into_iter()
            .filter(|node| *node < start)
            .map(|node| nodes[node])
            .collect();

        let mut state = self.initial.clone();
        for unit in &order {
            let descriptor = self.units[*unit];
            if let Some(fact) = descriptor.needs().iter().find(|fact| !state.contains(**fact)) {
                return Ok(Ordering::Stuck {
                    fact: *fact,
                    unit: descriptor.name().to_string(),
                });
            }
            state.apply(descriptor.adds(), descriptor.removes());
        }
        if let Some(fact) = required.iter().find(|fact| !state.contains(**fact)) {
            return Ok(Ordering::Stuck {
                fact: *fact,
                unit: GOAL.to_string(),
            });
        }

        Ok(Ordering::Done { order, state })
    }

    /// Possible supporters of `fact` for `consumer`: the start node if the fact holds
    /// initially, then every other selected producer in tie-break order.
    fn link_candidates(
        &self,
        consumer: usize,
        fact: Fact,
        nodes: &[usize],
        start: usize,
    ) -> Need {
        let mut candidates = Vec::new();
        if self.initial.contains(fact) {
            candidates.push(start);
        }
        candidates.extend(
            nodes
                .iter()
                .enumerate()
                .filter(|(node, unit)| {
                    *node != consumer && self.units[**unit].adds().contains(&fact)
                })
                .map(|(node, _)| node),
        );
        Need {
            consumer,
            fact,
            candidates,
        }
    }
}

/// Upper bound on threat resolutions explored by one ordering attempt.
const LINK_BUDGET: usize = 100_000;

/// A fact some graph node needs, with the nodes that could supply it.
struct Need {
    consumer: usize,
    fact: Fact,
    candidates: Vec<usize>,
}

/// Backtracking search for one supporter per need, with every removal threat resolved.
///
/// A remover threatens the link `producer → consumer` of a fact it removes unless it is
/// ordered before the producer or after the consumer. Demotion (after the consumer) is tried
/// before promotion (before the producer). Edges are only ever added, so a resolved threat
/// stays resolved.
struct Links<'n> {
    needs: &'n [Need],
    removers: &'n BTreeMap<Fact, Vec<usize>>,
    budget: usize,
    /// First need that could not be supported
    failure: Option<(usize, Fact)>,
}

impl Links<'_> {
    fn support(&mut self, graph: &Graph, index: usize) -> Option<Graph> {
        let needs = self.needs;
        let Some(need) = needs.get(index) else {
            return Some(graph.clone());
        };

        for &producer in &need.candidates {
            if graph.reaches(need.consumer, producer) {
                continue;
            }
            let mut linked = graph.clone();
            linked.add(producer, need.consumer);
            if let Some(done) = self.protect(linked, index, producer, 0) {
                return Some(done);
            }
        }

        if self.failure.is_none() {
            self.failure = Some((need.consumer, need.fact));
        }
        None
    }

    fn protect(
        &mut self,
        graph: Graph,
        index: usize,
        producer: usize,
        from: usize,
    ) -> Option<Graph> {
        if self.budget == 0 {
            return None;
        }
        self.budget -= 1;

        let (needs, removers) = (self.needs, self.removers);
        let need = &needs[index];
        let consumer = need.consumer;
        let threats = removers
            .get(&need.fact)
            .map_or(&[][..], Vec::as_slice);

        let Some((offset, remover)) = threats
            .iter()
            .copied()
            .enumerate()
            .skip(from)
            .find(|(_, remover)| {
                *remover != consumer
                    && *remover != producer
                    && !graph.reaches(*remover, producer)
                    && !graph.reaches(consumer, *remover)
            })
        else {
            return self.support(&graph, index + 1);
        };

        if !graph.reaches(remover, consumer) {
            let mut demoted = graph.clone();
            demoted.add(consumer, remover);
            if let Some(done) = self.protect(demoted, index, producer, offset + 1) {
                return Some(done);
            }
        }
        if !graph.reaches(producer, remover) {
            let mut promoted = graph;
            promoted.add(remover, producer);
            if let Some(done) = self.protect(promoted, index, producer, offset + 1) {
                return Some(done);
            }
        }
        None
    }
}

/// Small directed graph over dense node indices.
#[derive(Clone)]
struct Graph {
    edges: Vec<BTreeSet<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

impl Graph {
    fn new(size: usize) -> Self {
        Self {
            edges: vec![BTreeSet::new(); size],
        }
    }

    fn add(&mut self, from: usize, to: usize) {
        self.edges[from].insert(to);
    }

    /// Returns true if `to` can be reached from `from` (including `from == to`).
    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut visited = vec![false; self.edges.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if std::mem::replace(&mut visited[node], true) {
                continue;
            }
            stack.extend(self.edges[node].iter().copied());
        }
        false
    }

    /// Returns the nodes of one cycle, first node repeated at the end.
    fn find_cycle(&self) -> Option<Vec<usize>> {
        let mut marks = vec![Mark::New; self.edges.len()];
        let mut stack = Vec::new();

        for start in 0..self.edges.len() {
            if marks[start] == Mark::New {
                if let Some(cycle) = self.detect_cycle(start, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn detect_cycle(
        &self,
        node: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::Active;
        stack.push(node);

        for &next in &self.edges[node] {
            match marks[next] {
                Mark::Active => {
                    let begin = stack.iter().position(|entry| *entry == next)?;
                    let mut cycle = stack[begin..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Mark::New => {
                    if let Some(cycle) = self.detect_cycle(next, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    /// Kahn's algorithm, smallest ready index first. `None` if the graph is cyclic.
    fn topological_order(&self) -> Option<Vec<usize>> {
        let mut incoming = vec![0usize; self.edges.len()];
        for targets in &self.edges {
            for target in targets {
                incoming[*target] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.edges.len())
            .filter(|node| incoming[*node] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for target in &self.edges[node] {
                incoming[*target] -= 1;
                if incoming[*target] == 0 {
                    ready.insert(*target);
                }
            }
        }

        (order.len() == self.edges.len()).then_some(order)
    }
}
