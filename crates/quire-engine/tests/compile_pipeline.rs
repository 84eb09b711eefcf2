use quire_engine::expr::types::{AtomicType, ItemType, SequenceType};
use quire_engine::expr::{Axis, BoolOp, BuiltinFunction, Cardinality, CompOp, NodeTest};
use quire_engine::{
    DynamicContext, DynamicContextBuilder, ErrorCode, ExprKind, ExpandedName, ExpressionBuilder, NodeKind,
    OptimizationLevel, SimpleNode, StaticContext, StaticContextBuilder, XdmAtomicValue, XdmItem, XdmNode, doc, elem, evaluate,
    evaluate_first, evaluate_stream, text,
};
use quire_engine::iter::{IteratorProperties, SequenceIterator, collect_sequence};
use rstest::{fixture, rstest};

#[fixture]
fn root() -> SimpleNode {
    let document = doc()
        .child(
            elem("root")
                .child(elem("item").child(text("a")))
                .child(elem("item").child(text("b")))
                .child(elem("item").child(text("c")))
                .child(elem("other").child(text("z"))),
        )
        .build();
    document.children().next().expect("root element")
}

fn focus_on(node: &SimpleNode) -> DynamicContext<SimpleNode> {
    DynamicContextBuilder::new()
        .with_context_item(XdmItem::Node(node.clone()))
        .build()
}

fn strings(items: &[XdmItem<SimpleNode>]) -> Vec<String> {
    items
        .iter()
        .map(|i| match i {
            XdmItem::Node(n) => n.string_value(),
            XdmItem::Atomic(a) => a.string_value().to_string(),
        })
        .collect()
}

#[rstest]
fn provably_empty_operand_of_exactly_one_check_fails_statically() {
    let b = ExpressionBuilder::new();
    let expr = b.check_cardinality(b.empty(), Cardinality::EXACTLY_ONE);
    let err = b.compile(expr, &StaticContext::default()).expect_err("static failure");
    assert!(err.is_static());
    assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
}

#[rstest]
fn exactly_one_of_nothing_fails_statically() {
    let b = ExpressionBuilder::new();
    let expr = b.call(BuiltinFunction::ExactlyOne, vec![b.empty()]).expect("arity");
    let err = b.compile(expr, &StaticContext::default()).expect_err("static failure");
    assert!(err.is_static());
    assert_eq!(err.code_enum(), ErrorCode::FORG0005);
}

#[rstest]
fn undeclared_global_is_xpst0008() {
    let mut b = ExpressionBuilder::new();
    b.at(1, 4);
    let err = b
        .compile(b.global("missing"), &StaticContext::default())
        .expect_err("undeclared");
    assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    assert_eq!(err.location.map(|l| l.column), Some(4));
}

#[rstest]
fn cast_to_abstract_type_is_rejected() {
    let b = ExpressionBuilder::new();
    let expr = b.cast(b.string("1"), AtomicType::AnyAtomic, false);
    let err = b.compile(expr, &StaticContext::default()).expect_err("abstract");
    assert_eq!(err.code_enum(), ErrorCode::XPST0051);
}

#[rstest]
fn axis_step_on_atomic_start_is_xpty0019() {
    let b = ExpressionBuilder::new();
    let expr = b.path(b.integer(3), b.child("item"));
    let err = b.compile(expr, &StaticContext::default()).expect_err("atomic start");
    assert_eq!(err.code_enum(), ErrorCode::XPTY0019);
}

#[rstest]
fn literal_condition_is_resolved_while_simplifying() {
    let b = ExpressionBuilder::new();
    let expr = b.if_(b.boolean(true), b.integer(1), b.child("item"));
    let compiled = b.compile(expr, &StaticContext::default()).expect("compiles");
    assert_eq!(compiled.root().literal_values(), Some(&[XdmAtomicValue::Integer(1)][..]));
}

#[rstest]
fn constant_position_filter_becomes_subsequence(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let expr = b.filter(b.child("item"), b.integer(2));
    let compiled = b.compile(expr, &StaticContext::default()).expect("compiles");
    assert!(matches!(
        compiled.root().kind,
        ExprKind::Call {
            function: BuiltinFunction::Subsequence,
            ..
        }
    ));
    compiled.root().verify_properties().expect("properties are fresh");
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert_eq!(strings(&out), vec!["b"]);
}

#[rstest]
fn unoptimized_filter_gives_the_same_answer(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let sc = StaticContextBuilder::new()
        .with_optimization(OptimizationLevel::None)
        .build();
    let expr = b.filter(b.child("item"), b.integer(2));
    let compiled = b.compile(expr, &sc).expect("compiles");
    assert!(matches!(compiled.root().kind, ExprKind::Filter { .. }));
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert_eq!(strings(&out), vec!["b"]);
}

#[rstest]
fn last_position_predicate(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let expr = b.filter(b.child("item"), b.compare(CompOp::Eq, b.position(), b.last()));
    let compiled = b.compile(expr, &StaticContext::default()).expect("compiles");
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert_eq!(strings(&out), vec!["c"]);
}

#[rstest]
#[case(true, vec!["a", "b", "c"])]
#[case(false, vec![])]
fn focus_independent_predicate_is_hoisted(root: SimpleNode, #[case] flag: bool, #[case] expected: Vec<&str>) {
    let b = ExpressionBuilder::new();
    let sc = StaticContextBuilder::new()
        .with_typed_variable(
            ExpandedName::local("flag"),
            SequenceType::new(ItemType::Atomic(AtomicType::Boolean), Cardinality::EXACTLY_ONE),
        )
        .build();
    let expr = b.filter(b.child("item"), b.global("flag"));
    let compiled = b.compile(expr, &sc).expect("compiles");
    assert!(matches!(compiled.root().kind, ExprKind::If { .. }));
    let ctx = DynamicContextBuilder::new()
        .with_context_item(XdmItem::Node(root.clone()))
        .with_variable(ExpandedName::local("flag"), XdmItem::Atomic(XdmAtomicValue::Boolean(flag)))
        .build();
    let out = evaluate(&compiled, &ctx).expect("evaluates");
    assert_eq!(strings(&out), expected);
}

#[rstest]
fn exists_over_union_is_split(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let union = b.union(b.child("missing"), b.child("other"));
    let expr = b.call(BuiltinFunction::Exists, vec![union]).expect("arity");
    let compiled = b.compile(expr, &StaticContext::default()).expect("compiles");
    assert!(matches!(compiled.root().kind, ExprKind::Logical { op: BoolOp::Or, .. }));
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert_eq!(out, vec![XdmItem::Atomic(XdmAtomicValue::Boolean(true))]);
}

#[rstest]
#[case::path_from_empty("path")]
#[case::loop_over_empty("for")]
#[case::let_bound_to_empty("let")]
#[case::filter_of_empty("filter")]
fn always_empty_expressions_become_the_empty_literal(#[case] shape: &str, root: SimpleNode) {
    let mut b = ExpressionBuilder::new();
    let expr = match shape {
        "path" => b.path(b.empty(), b.child("item")),
        "for" => {
            let x = b.declare("x");
            let body = b.var(&x);
            b.for_each(x, b.empty(), body)
        }
        "let" => {
            let x = b.declare("x");
            let body = b.var(&x);
            b.let_(x, b.empty(), body)
        }
        _ => b.filter(b.empty(), b.integer(1)),
    };
    let sc = StaticContextBuilder::new()
        .with_optimization(OptimizationLevel::None)
        .build();
    let compiled = b.compile(expr, &sc).expect("compiles");
    assert!(compiled.root().is_empty_literal(), "{shape}: {:?}", compiled.root().kind);
    compiled.root().verify_properties().expect("fresh properties");
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert!(out.is_empty());
}

fn contains_union(expr: &quire_engine::Expression) -> bool {
    matches!(expr.kind, ExprKind::Union { .. }) || expr.operands().iter().any(|op| contains_union(&op.expr))
}

#[rstest]
fn nested_union_test_splits_in_one_pass(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let inner = b.union(b.child("item"), b.child("missing"));
    let union = b.union(inner, b.child("other"));
    let expr = b.call(BuiltinFunction::Exists, vec![union]).expect("arity");
    let sc = StaticContext::default();
    let compiled = b.compile(expr, &sc).expect("compiles");
    let once = compiled.root().clone();
    assert!(!contains_union(&once));
    let ExprKind::Logical { op: BoolOp::Or, lhs, .. } = &once.kind else {
        panic!("expected a disjunction, got {:?}", once.kind);
    };
    assert!(matches!(lhs.expr.kind, ExprKind::Logical { op: BoolOp::Or, .. }));

    let twice = once.clone().optimize(&sc).expect("optimizes");
    assert_eq!(once, twice);
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert_eq!(out, vec![XdmItem::Atomic(XdmAtomicValue::Boolean(true))]);
}

#[rstest]
fn union_is_in_document_order_without_duplicates(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let expr = b.union(b.filter(b.child("item"), b.integer(3)), b.child("item"));
    let compiled = b.compile(expr, &StaticContext::default()).expect("compiles");
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert_eq!(strings(&out), vec!["a", "b", "c"]);
}

#[rstest]
fn path_through_children_reaches_text(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let expr = b.path(b.child("item"), b.step(Axis::Child, NodeTest::Kind(NodeKind::Text)));
    let compiled = b.compile(expr, &StaticContext::default()).expect("compiles");
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert_eq!(strings(&out), vec!["a", "b", "c"]);
}

#[rstest]
#[case::descendant_text(Axis::Descendant, NodeTest::Kind(NodeKind::Text), vec!["a", "b", "c", "z"])]
#[case::descendant_or_self_items(Axis::DescendantOrSelf, NodeTest::element("item"), vec!["a", "b", "c"])]
#[case::named_child(Axis::Child, NodeTest::element("other"), vec!["z"])]
fn forward_axis_steps_stream_in_document_order(
    #[case] axis: Axis,
    #[case] test: NodeTest,
    #[case] expected: Vec<&str>,
    root: SimpleNode,
) {
    let b = ExpressionBuilder::new();
    let compiled = b.compile(b.step(axis, test), &StaticContext::default()).expect("compiles");
    let stream = evaluate_stream(&compiled, &focus_on(&root)).expect("iterates");
    assert!(!stream.properties().contains(IteratorProperties::GROUNDED));
    let out = collect_sequence(stream).expect("evaluates");
    assert_eq!(strings(out.items()), expected);
}

#[rstest]
fn first_descendant_is_found_without_walking_the_tree(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let first = b.compile(b.step(Axis::Descendant, NodeTest::element("item")), &StaticContext::default())
        .expect("compiles");
    let item = evaluate_first(&first, &focus_on(&root)).expect("evaluates").expect("an item");
    assert_eq!(strings(&[item]), vec!["a"]);

    let second = b.filter(b.step(Axis::Descendant, NodeTest::Kind(NodeKind::Text)), b.integer(2));
    let compiled = b.compile(second, &StaticContext::default()).expect("compiles");
    let out = evaluate(&compiled, &focus_on(&root)).expect("evaluates");
    assert_eq!(strings(&out), vec!["b"]);
}

#[rstest]
fn ancestor_step_is_materialized_root_first(root: SimpleNode) {
    let b = ExpressionBuilder::new();
    let leaf = root
        .children()
        .next()
        .and_then(|item| item.children().next())
        .expect("text under the first item");
    let compiled = b
        .compile(b.step(Axis::Ancestor, NodeTest::Kind(NodeKind::Element)), &StaticContext::default())
        .expect("compiles");
    let stream = evaluate_stream(&compiled, &focus_on(&leaf)).expect("iterates");
    assert_eq!(stream.length(), Some(2));
    let out = collect_sequence(stream).expect("evaluates");
    assert_eq!(out.len(), 2);
    assert_eq!(out.get(0), Some(&XdmItem::Node(root.clone())));
}

#[rstest]
fn compiled_expression_carries_static_context() {
    let b = ExpressionBuilder::new();
    let sc = StaticContextBuilder::new()
        .with_optimization(OptimizationLevel::Basic)
        .build();
    let compiled = b.compile(b.integer(1), &sc).expect("compiles");
    assert_eq!(compiled.static_context().optimization, OptimizationLevel::Basic);
    assert_eq!(compiled.frame_size(), 0);
}
