//! Planner integration tests.
//!
//! These tests drive the planner through the public API only:
//! 1. Declare descriptors and register passive units
//! 2. Plan for a goal from an initial state
//! 3. Check order, minimality, warnings and failures

use passplan::prelude::*;
use proptest::prelude::*;

const RAW: Tag = Tag::new("raw", NodeKind::Method);
const DESUGARED: Tag = Tag::new("desugared", NodeKind::Method);
const OPTIMIZED: Tag = Tag::new("optimized", NodeKind::Method);
const INLINED: Tag = Tag::new("inlined", NodeKind::Method);
const FOLDED: Tag = Tag::new("folded", NodeKind::Method);
const LINTED: Tag = Tag::new("linted", NodeKind::Method);
const VERIFIED: Tag = Tag::new("verified", NodeKind::Method);
const TYPED: Tag = Tag::new("typed", NodeKind::Type);

fn method_unit(name: &str) -> DescriptorBuilder {
    Descriptor::builder(name).granularity(NodeKind::Method)
}

fn registry(builders: Vec<DescriptorBuilder>) -> Registry {
    let mut registry = Registry::new();
    for builder in builders {
        registry
            .register(PassiveUnit::passive(builder.build().unwrap()))
            .unwrap();
    }
    registry
}

fn plan_with(registry: &Registry, features: &Features, initial: &TagState, goal: Goal) -> Result<Plan> {
    Planner::new(registry, features).plan(initial, &goal)
}

fn plan(registry: &Registry, goal: Goal) -> Result<Plan> {
    plan_with(registry, &Features::new(), &TagState::new(), goal)
}

/// Replays a plan from its initial state and checks every need at the moment it runs.
fn assert_executable(registry: &Registry, plan: &Plan) {
    let mut state = plan.initial().clone();
    for step in plan.steps() {
        let descriptor = registry.descriptor(&step.unit).unwrap();
        assert!(
            state.contains_all(descriptor.needs()),
            "{} runs without its needs in {state}",
            step.unit
        );
        state.apply(descriptor.adds(), descriptor.removes());
    }
    assert_eq!(&state, plan.final_state());
}

fn pipeline_catalog() -> Vec<Descriptor> {
    vec![
        method_unit("parse").adds(RAW),
        method_unit("parse-fast").adds(RAW).order_hint(1),
        method_unit("desugar").needs(RAW).adds(DESUGARED),
        method_unit("inline").needs(DESUGARED).adds(INLINED),
        method_unit("fold").needs(DESUGARED).adds(FOLDED),
        method_unit("optimize")
            .needs(INLINED)
            .needs(FOLDED)
            .needs(DESUGARED)
            .removes(DESUGARED)
            .adds(OPTIMIZED),
        method_unit("lint").needs(RAW).adds(LINTED),
        method_unit("verify").needs(OPTIMIZED).adds(VERIFIED),
    ]
    .into_iter()
    .map(|builder| builder.build().unwrap())
    .collect()
}

#[test]
fn test_linear_scenario() -> Result<()> {
    let registry = registry(vec![
        method_unit("U1").adds(RAW),
        method_unit("U2").needs(RAW).adds(DESUGARED),
        method_unit("U3")
            .needs(DESUGARED)
            .removes(DESUGARED)
            .adds(OPTIMIZED),
    ]);

    let plan = plan(&registry, Goal::fact(OPTIMIZED))?;
    assert_eq!(plan.unit_names(), vec!["U1", "U2", "U3"]);
    assert!(plan.final_state().contains(OPTIMIZED));
    assert!(plan.final_state().contains(RAW));
    assert!(!plan.final_state().contains(DESUGARED));
    assert_executable(&registry, &plan);
    Ok(())
}

#[test]
fn test_minimality_skips_unneeded_producers() -> Result<()> {
    let registry = registry(vec![
        method_unit("U1").adds(RAW),
        method_unit("U2").needs(RAW).adds(DESUGARED),
        method_unit("U3").needs(RAW).adds(OPTIMIZED),
        method_unit("lint").needs(RAW).adds(LINTED),
    ]);

    let plan = plan(&registry, Goal::fact(OPTIMIZED))?;
    assert_eq!(plan.unit_names(), vec!["U1", "U3"]);
    Ok(())
}

#[test]
fn test_unproducible_fact_names_fact_and_unit() {
    let registry = registry(vec![
        method_unit("U1").adds(RAW),
        method_unit("U2").needs(DESUGARED).adds(OPTIMIZED),
    ]);

    let err = plan(&registry, Goal::fact(OPTIMIZED)).unwrap_err();
    match err {
        Error::UnproducibleFact { fact, unit } => {
            assert_eq!(fact, Fact::from(DESUGARED));
            assert_eq!(unit, "U2");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_cycle_rejected() {
    let registry = registry(vec![
        method_unit("a").needs(DESUGARED).adds(OPTIMIZED),
        method_unit("b").needs(OPTIMIZED).adds(DESUGARED),
    ]);

    let err = plan(&registry, Goal::fact(OPTIMIZED)).unwrap_err();
    assert!(err.is_planning());
    match err {
        Error::DependencyCycle(units) => {
            assert_eq!(units, vec!["a", "b", "a"]);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_uses_orders_without_selecting() -> Result<()> {
    let registry = registry(vec![
        method_unit("a").adds(RAW).uses("b"),
        method_unit("b").adds(LINTED),
        method_unit("c").adds(FOLDED).uses("b"),
    ]);

    let plan_ab = plan(&registry, Goal::facts([RAW, LINTED]))?;
    assert_eq!(plan_ab.unit_names(), vec!["b", "a"]);

    let plan_c = plan(&registry, Goal::fact(FOLDED))?;
    assert_eq!(plan_c.unit_names(), vec!["c"]);
    Ok(())
}

#[test]
fn test_uses_cycle_rejected() {
    let registry = registry(vec![
        method_unit("a").adds(RAW).uses("b"),
        method_unit("b").adds(LINTED).uses("a"),
    ]);
    assert!(matches!(
        plan(&registry, Goal::facts([RAW, LINTED])),
        Err(Error::DependencyCycle(_))
    ));
}

#[test]
fn test_feature_gated_goal_fails() {
    let registry = registry(vec![
        method_unit("parse").adds(RAW),
        method_unit("shrink")
            .needs(RAW)
            .adds(OPTIMIZED)
            .feature(Feature::new("shrink")),
    ]);

    let err = plan(&registry, Goal::fact(OPTIMIZED)).unwrap_err();
    match err {
        Error::FeatureDisabled {
            fact,
            unit,
            feature,
        } => {
            assert_eq!(fact, Fact::from(OPTIMIZED));
            assert_eq!(unit, "shrink");
            assert_eq!(feature, "shrink");
        }
        other => panic!("unexpected error {other}"),
    }

    let features = Features::parse("shrink");
    let plan = plan_with(
        &registry,
        &features,
        &TagState::new(),
        Goal::fact(OPTIMIZED),
    )
    .unwrap();
    assert_eq!(plan.unit_names(), vec!["parse", "shrink"]);
}

#[test]
fn test_feature_gated_alternative_is_reported() -> Result<()> {
    let registry = registry(vec![
        method_unit("fast-opt")
            .adds(OPTIMIZED)
            .feature(Feature::new("experimental")),
        method_unit("slow-opt").adds(OPTIMIZED),
        method_unit("lint-extra")
            .adds(LINTED)
            .feature(Feature::new("lint")),
    ]);

    let plan = plan(&registry, Goal::fact(OPTIMIZED))?;
    assert_eq!(plan.unit_names(), vec!["slow-opt"]);
    // Only the gated unit whose output mattered is reported
    assert_eq!(
        plan.warnings(),
        &[PlanWarning::FeatureGated {
            unit: "fast-opt".into(),
            feature: Feature::new("experimental"),
        }]
    );
    Ok(())
}

#[test]
fn test_removed_fact_is_reproduced_after_remover() -> Result<()> {
    let registry = registry(vec![
        method_unit("strip").removes(RAW).adds(LINTED),
        method_unit("use").needs(RAW).needs(LINTED).adds(OPTIMIZED),
        method_unit("retag").adds(RAW),
    ]);
    let initial: TagState = [RAW].into_iter().collect();

    let plan = plan_with(
        &registry,
        &Features::new(),
        &initial,
        Goal::fact(OPTIMIZED),
    )?;
    assert_eq!(plan.unit_names(), vec!["strip", "retag", "use"]);
    assert_executable(&registry, &plan);
    Ok(())
}

#[test]
fn test_removed_fact_without_producer_fails() {
    let registry = registry(vec![
        method_unit("strip").removes(RAW).adds(LINTED),
        method_unit("use").needs(RAW).needs(LINTED).adds(OPTIMIZED),
    ]);
    let initial: TagState = [RAW].into_iter().collect();

    let err = plan_with(
        &registry,
        &Features::new(),
        &initial,
        Goal::fact(OPTIMIZED),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::UnproducibleFact { fact, ref unit } if fact == Fact::from(RAW) && unit == "use"
    ));
}

/// `strip` invalidates RAW between its first consumer and `emit`, which needs it again.
fn reproduction_catalog() -> Registry {
    registry(vec![
        method_unit("parse").adds(RAW),
        method_unit("reparse").adds(RAW),
        method_unit("check").needs(RAW).adds(LINTED),
        method_unit("strip")
            .needs(LINTED)
            .removes(RAW)
            .adds(DESUGARED),
        method_unit("emit")
            .needs(RAW)
            .needs(DESUGARED)
            .adds(OPTIMIZED),
    ])
}

#[test]
fn test_planned_fact_is_reproduced_after_remover() -> Result<()> {
    let registry = reproduction_catalog();

    let plan = plan(&registry, Goal::fact(OPTIMIZED))?;
    assert_eq!(
        plan.unit_names(),
        vec!["parse", "check", "strip", "reparse", "emit"]
    );
    assert_executable(&registry, &plan);
    assert!(plan.final_state().contains(RAW));
    Ok(())
}

#[test]
fn test_maximal_plan_reproduces_between_removers() -> Result<()> {
    let registry = reproduction_catalog();

    let plan = plan(&registry, Goal::Maximal)?;
    assert_eq!(
        plan.unit_names(),
        vec!["parse", "check", "strip", "reparse", "emit"]
    );
    assert_executable(&registry, &plan);
    Ok(())
}

#[test]
fn test_removed_fact_required_by_goal_is_reproduced() -> Result<()> {
    let registry = reproduction_catalog();

    let plan = plan(&registry, Goal::facts([RAW, DESUGARED]))?;
    assert_eq!(plan.unit_names(), vec!["parse", "check", "strip", "reparse"]);
    assert_executable(&registry, &plan);
    assert!(plan.final_state().contains(RAW));
    Ok(())
}

#[test]
fn test_goal_fact_protected_from_removal() -> Result<()> {
    let registry = registry(vec![
        method_unit("parse").adds(RAW),
        method_unit("compact").needs(RAW).removes(RAW).adds(FOLDED),
    ]);

    // RAW must still hold at the end, so parse has to run after compact as well
    let err = plan(&registry, Goal::facts([RAW, FOLDED])).unwrap_err();
    assert!(matches!(err, Error::Unsatisfiable { .. }));

    let plan = plan(&registry, Goal::fact(FOLDED))?;
    assert_eq!(plan.unit_names(), vec!["parse", "compact"]);
    Ok(())
}

#[test]
fn test_coarser_need_and_scoped_effects() -> Result<()> {
    let registry = registry(vec![
        Descriptor::builder("resolve")
            .granularity(NodeKind::Type)
            .adds(TYPED)
            .adds(RAW),
        method_unit("check").needs(TYPED).needs(RAW).adds(VERIFIED),
    ]);

    let plan = plan(&registry, Goal::fact(VERIFIED))?;
    assert_eq!(plan.unit_names(), vec!["resolve", "check"]);
    assert_eq!(plan.steps()[0].granularity, NodeKind::Type);
    assert_eq!(plan.steps()[1].granularity, NodeKind::Method);
    Ok(())
}

#[test]
fn test_maximal_plan() -> Result<()> {
    let descriptors = pipeline_catalog();
    let mut registry = Registry::new();
    for descriptor in descriptors {
        registry.register(PassiveUnit::passive(descriptor))?;
    }

    let plan = plan(&registry, Goal::Maximal)?;
    assert_eq!(plan.len(), registry.len());
    assert_executable(&registry, &plan);
    assert!(plan.position("parse") < plan.position("parse-fast"));
    assert!(plan.position("optimize") < plan.position("verify"));
    Ok(())
}

#[test]
fn test_goal_plan_picks_lowest_hint_producer() -> Result<()> {
    let mut registry = Registry::new();
    for descriptor in pipeline_catalog() {
        registry.register(PassiveUnit::passive(descriptor))?;
    }

    let plan = plan(&registry, Goal::fact(VERIFIED))?;
    assert_eq!(
        plan.unit_names(),
        vec!["parse", "desugar", "fold", "inline", "optimize", "verify"]
    );
    assert_executable(&registry, &plan);
    Ok(())
}

#[test]
fn test_plan_dump() -> Result<()> {
    let registry = registry(vec![
        method_unit("U1").adds(RAW),
        method_unit("U2").needs(RAW).adds(DESUGARED).exclusive(),
    ]);
    let plan = plan(&registry, Goal::fact(DESUGARED))?;

    let dump = plan.dump(&registry);
    assert!(dump.contains("Goal: facts [desugared@Method]"));
    assert!(dump.contains("Step 0: U1 @Method (needs: None; adds: raw@Method; removes: None)"));
    assert!(dump.contains("Step 1: U2 @Method (exclusive)"));
    assert_eq!(plan.to_string(), "[U1, U2]");
    Ok(())
}

#[test]
fn test_repeated_planning_is_identical() -> Result<()> {
    let mut registry = Registry::new();
    for descriptor in pipeline_catalog() {
        registry.register(PassiveUnit::passive(descriptor))?;
    }
    let first = plan(&registry, Goal::fact(VERIFIED))?;
    for _ in 0..10 {
        assert_eq!(plan(&registry, Goal::fact(VERIFIED))?, first);
    }
    Ok(())
}

proptest! {
    #[test]
    fn registration_order_does_not_change_plans(
        order in Just((0..pipeline_catalog().len()).collect::<Vec<usize>>()).prop_shuffle()
    ) {
        let catalog = pipeline_catalog();

        let mut reference = Registry::new();
        for descriptor in &catalog {
            reference.register(PassiveUnit::passive(descriptor.clone())).unwrap();
        }
        let mut shuffled = Registry::new();
        for index in &order {
            shuffled.register(PassiveUnit::passive(catalog[*index].clone())).unwrap();
        }

        for goal in [Goal::fact(VERIFIED), Goal::facts([LINTED, FOLDED]), Goal::Maximal] {
            let expected = plan(&reference, goal.clone()).unwrap();
            let actual = plan(&shuffled, goal).unwrap();
            prop_assert_eq!(expected, actual);
        }
    }
}
