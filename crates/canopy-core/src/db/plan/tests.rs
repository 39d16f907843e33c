use crate::{
    db::{
        aggregate::Aggregator,
        plan::{
            BuilderKind, CompiledPlan, FieldIndexLeaves, FieldPolicy, LeafStrategy, Leaves,
            PlanBuilder, PlanError, QueryNode, TopLevelLeaves,
        },
        store::SortedKeyCursor,
    },
    obs::{CountingTraceSink, TraceSinkHandle},
    test_support::{SAMPLE_ROW, drain_families, sample_shard, shard},
};
use std::{collections::BTreeSet, sync::Arc};

fn generic() -> FieldIndexLeaves {
    FieldIndexLeaves::new(Aggregator::identity())
}

fn top_level() -> TopLevelLeaves {
    TopLevelLeaves::new(FieldIndexLeaves::new(Aggregator::top_level()))
}

fn compile<S: LeafStrategy>(strategy: S, query: &QueryNode) -> Result<CompiledPlan, PlanError> {
    let source = sample_shard().cursor();
    PlanBuilder::new(strategy, source.as_ref()).build(query)
}

fn run(plan: CompiledPlan) -> Vec<String> {
    let mut root = plan.root.expect("plan should have a root cursor");
    root.seek(&shard(SAMPLE_ROW)).unwrap();

    drain_families(root.as_mut())
}

fn names(fields: &[&str]) -> BTreeSet<String> {
    fields.iter().map(ToString::to_string).collect()
}

#[test]
fn single_predicate_compiles_to_leaf() {
    let plan = compile(generic(), &QueryNode::equals("NAME", "alice")).unwrap();

    assert_eq!(plan.describe(), "NAME == 'alice'");
    assert_eq!((plan.includes, plan.excludes), (1, 0));
    assert!(plan.index_satisfied());
    assert_eq!(
        run(plan),
        vec![
            "typeA\0abc.def.ghi.1",
            "typeA\0abc.def.ghi.2",
            "typeA\0jkl.mno.pqr"
        ]
    );
}

#[test]
fn negation_lands_in_excludes() {
    let query = QueryNode::all(vec![
        QueryNode::equals("NAME", "alice"),
        QueryNode::negate(QueryNode::equals("AGE", "7")),
    ]);
    let plan = compile(generic(), &query).unwrap();

    assert_eq!(plan.describe(), "(NAME == 'alice' && !(AGE == '7'))");
    assert_eq!((plan.includes, plan.excludes), (1, 1));
    assert_eq!(run(plan), vec!["typeA\0abc.def.ghi.1"]);
}

#[test]
fn not_equals_matches_negated_equals() {
    let negated = QueryNode::all(vec![
        QueryNode::equals("NAME", "alice"),
        QueryNode::negate(QueryNode::equals("AGE", "7")),
    ]);
    let not_equals = QueryNode::all(vec![
        QueryNode::equals("NAME", "alice"),
        QueryNode::not_equals("AGE", "7"),
    ]);

    let left = compile(generic(), &negated).unwrap();
    let right = compile(generic(), &not_equals).unwrap();
    assert_eq!(left.fingerprint, right.fingerprint);
}

#[test]
fn double_negation_is_an_include() {
    let query = QueryNode::all(vec![
        QueryNode::equals("NAME", "alice"),
        QueryNode::negate(QueryNode::negate(QueryNode::equals("AGE", "7"))),
    ]);
    let plan = compile(generic(), &query).unwrap();

    assert_eq!(plan.describe(), "(NAME == 'alice' && AGE == '7')");
    assert_eq!(
        run(plan),
        vec!["typeA\0abc.def.ghi.2", "typeA\0jkl.mno.pqr"]
    );
}

#[test]
fn same_kind_composites_flatten_and_dedupe() {
    let query = QueryNode::all(vec![
        QueryNode::equals("NAME", "alice"),
        QueryNode::all(vec![
            QueryNode::equals("AGE", "7"),
            QueryNode::equals("NAME", "alice"),
        ]),
    ]);
    let plan = compile(generic(), &query).unwrap();

    assert_eq!(plan.describe(), "(NAME == 'alice' && AGE == '7')");
    assert_eq!(plan.includes, 2);
}

#[test]
fn opposite_polarity_is_not_a_duplicate() {
    let query = QueryNode::all(vec![
        QueryNode::equals("NAME", "alice"),
        QueryNode::not_equals("NAME", "alice"),
    ]);
    let plan = compile(generic(), &query).unwrap();

    assert_eq!((plan.includes, plan.excludes), (1, 1));
    assert!(run(plan).is_empty());
}

#[test]
fn mixed_composites_nest() {
    let query = QueryNode::all(vec![
        QueryNode::equals("AGE", "7"),
        QueryNode::any(vec![
            QueryNode::equals("NAME", "alice"),
            QueryNode::equals("NAME", "bob"),
        ]),
    ]);
    let plan = compile(generic(), &query).unwrap();

    assert_eq!(
        plan.describe(),
        "(AGE == '7' && (NAME == 'alice' || NAME == 'bob'))"
    );
    assert_eq!(
        run(plan),
        vec!["typeA\0abc.def.ghi.2", "typeA\0jkl.mno.pqr"]
    );
}

#[test]
fn top_level_strategy_folds_children() {
    let query = QueryNode::any(vec![
        QueryNode::equals("NAME", "bob"),
        QueryNode::any(vec![QueryNode::equals("AGE", "9")]),
    ]);
    let plan = compile(top_level(), &query).unwrap();

    assert_eq!(plan.describe(), "(NAME == 'bob' || AGE == '9')");
    assert_eq!(
        run(plan),
        vec!["typeA\0abc.def.ghi", "typeA\0stu.vwx.yz0"]
    );
}

#[test]
fn negation_cannot_be_the_root() {
    for query in [
        QueryNode::negate(QueryNode::equals("NAME", "bob")),
        QueryNode::not_equals("NAME", "bob"),
        QueryNode::all(vec![QueryNode::not_equals("NAME", "bob")]),
    ] {
        let err = compile(generic(), &query).err();
        assert!(
            matches!(err, Some(PlanError::InvalidPlanShape { .. })),
            "{query:?} compiled: {err:?}"
        );
    }
}

#[test]
fn null_value_in_fully_satisfied_top_level_plan_is_a_fault() {
    let query = QueryNode::all(vec![
        QueryNode::equals("AGE", "7"),
        QueryNode::equals_null("NAME"),
    ]);
    let source = sample_shard().cursor();
    let err = PlanBuilder::new(top_level(), source.as_ref())
        .fully_satisfied(true)
        .build(&query)
        .err();

    assert_eq!(
        err,
        Some(PlanError::PlannerConsistencyFault {
            field: "NAME".to_string()
        })
    );
}

#[test]
fn null_value_in_generic_plan_only_loses_coverage() {
    let query = QueryNode::all(vec![
        QueryNode::equals("AGE", "7"),
        QueryNode::equals_null("NAME"),
    ]);
    let source = sample_shard().cursor();
    let plan = PlanBuilder::new(generic(), source.as_ref())
        .fully_satisfied(true)
        .build(&query)
        .unwrap();

    assert_eq!(plan.dropped, vec!["NAME"]);
    assert!(!plan.index_satisfied());
    assert_eq!(plan.describe(), "(AGE == '7')");
}

#[test]
fn null_value_at_root_leaves_plan_unindexed() {
    let plan = compile(top_level(), &QueryNode::equals_null("NAME")).unwrap();

    assert!(plan.root.is_none());
    assert_eq!(plan.describe(), "<unindexed>");
    assert_eq!(plan.dropped, vec!["NAME"]);
}

#[test]
fn index_only_field_rejects_null() {
    let source = sample_shard().cursor();
    let err = PlanBuilder::new(generic(), source.as_ref())
        .with_index_only(names(&["NAME"]))
        .build(&QueryNode::equals_null("NAME"))
        .err();

    assert_eq!(
        err,
        Some(PlanError::IndexOnlyNullComparison {
            field: "NAME".to_string()
        })
    );
}

#[test]
fn denied_fields_drop_coverage_inside_composites() {
    let source = sample_shard().cursor();
    let builder = PlanBuilder::new(generic(), source.as_ref())
        .with_fields(FieldPolicy::new(None, names(&["AGE"])));

    let plan = builder
        .build(&QueryNode::all(vec![
            QueryNode::equals("NAME", "alice"),
            QueryNode::equals("AGE", "7"),
        ]))
        .unwrap();
    assert_eq!(plan.describe(), "(NAME == 'alice')");
    assert_eq!(plan.dropped, vec!["AGE"]);

    let err = builder.build(&QueryNode::equals("AGE", "7")).err();
    assert!(matches!(err, Some(PlanError::InvalidPlanShape { .. })));
}

#[test]
fn root_predicate_outside_allow_list_still_builds() {
    let source = sample_shard().cursor();
    let builder = PlanBuilder::new(generic(), source.as_ref())
        .with_fields(FieldPolicy::new(Some(names(&["NAME"])), BTreeSet::new()));

    let plan = builder.build(&QueryNode::equals("AGE", "7")).unwrap();
    assert_eq!(plan.describe(), "AGE == '7'");
    assert_eq!(plan.includes, 1);
    assert!(plan.dropped.is_empty());

    let plan = builder
        .build(&QueryNode::all(vec![
            QueryNode::equals("NAME", "alice"),
            QueryNode::equals("AGE", "7"),
        ]))
        .unwrap();
    assert_eq!(plan.dropped, vec!["AGE"]);
}

#[test]
fn allow_list_readmits_a_denied_root_field() {
    let policy = FieldPolicy::new(Some(names(&["AGE"])), names(&["AGE"]));
    assert!(!policy.denies("AGE"));
    assert!(!FieldPolicy::new(None, BTreeSet::new()).denies("AGE"));
    assert!(FieldPolicy::new(None, names(&["AGE"])).denies("AGE"));

    let source = sample_shard().cursor();
    let plan = PlanBuilder::new(generic(), source.as_ref())
        .with_fields(policy)
        .build(&QueryNode::equals("AGE", "7"))
        .unwrap();
    assert!(plan.root.is_some());
}

#[test]
fn allow_list_admits_only_named_fields() {
    let policy = FieldPolicy::new(Some(names(&["NAME"])), BTreeSet::new());

    assert!(policy.allows("NAME"));
    assert!(!policy.allows("AGE"));
    assert!(FieldPolicy::default().allows("AGE"));
}

#[test]
fn empty_nested_composite_is_dropped() {
    let query = QueryNode::all(vec![
        QueryNode::equals("NAME", "alice"),
        QueryNode::any(vec![QueryNode::equals_null("AGE")]),
    ]);
    let plan = compile(generic(), &query).unwrap();

    assert_eq!(plan.describe(), "(NAME == 'alice')");
    assert_eq!(plan.dropped, vec!["AGE", "or"]);
}

#[test]
fn registry_selects_strategy() {
    let query = QueryNode::all(vec![
        QueryNode::equals("AGE", "7"),
        QueryNode::equals_null("NAME"),
    ]);
    let source = sample_shard().cursor();

    for (kind, faults) in [(BuilderKind::TopLevel, true), (BuilderKind::Generic, false)] {
        let leaves = Leaves::for_kind(kind, FieldIndexLeaves::new(Aggregator::new(kind.aggregator_kind())));
        let result = PlanBuilder::new(leaves, source.as_ref())
            .fully_satisfied(true)
            .build(&query);

        assert_eq!(result.is_err(), faults, "{kind:?}");
    }
}

#[test]
fn fingerprint_tracks_plan_shape() {
    let alice = compile(generic(), &QueryNode::equals("NAME", "alice")).unwrap();
    let again = compile(generic(), &QueryNode::equals("NAME", "alice")).unwrap();
    let bob = compile(generic(), &QueryNode::equals("NAME", "bob")).unwrap();

    assert_eq!(alice.fingerprint, again.fingerprint);
    assert_ne!(alice.fingerprint, bob.fingerprint);
}

#[test]
fn trace_sink_sees_compilation() {
    let sink = Arc::new(CountingTraceSink::new());
    let handle: TraceSinkHandle = sink.clone();
    let source: Box<dyn SortedKeyCursor> = sample_shard().cursor();

    PlanBuilder::new(generic(), source.as_ref())
        .with_trace(Some(handle))
        .build(&QueryNode::all(vec![
            QueryNode::equals("NAME", "alice"),
            QueryNode::equals_null("AGE"),
        ]))
        .unwrap();

    let counts = sink.snapshot();
    assert_eq!(counts.plans, 1);
    assert_eq!(counts.coverage_drops, 1);
}
