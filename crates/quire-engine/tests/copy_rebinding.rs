use quire_engine::expr::{ArithOp, BindingAllocator, RebindingMap};
use quire_engine::{
    DynamicContext, ErrorKind, ExpressionBuilder, ModeName, Pattern, RuleSetBuilder, SimpleNode, StaticContext,
    XdmAtomicValue, XdmItem, elem, evaluate,
};
use rstest::rstest;
use std::sync::Arc;

fn run(builder: &ExpressionBuilder, expr: quire_engine::Expression) -> Vec<XdmItem<SimpleNode>> {
    let compiled = builder.compile(expr, &StaticContext::default()).expect("compiles");
    evaluate(&compiled, &DynamicContext::<SimpleNode>::default()).expect("evaluates")
}

#[rstest]
fn closed_let_copy_uses_its_own_slots() {
    let mut b = ExpressionBuilder::new();
    let x = b.declare("x");
    let body = b.arith(ArithOp::Mul, b.var(&x), b.integer(2));
    let original = b.let_(x.clone(), b.integer(21), body);
    assert_eq!(b.frame_size(), 1);

    let copy = {
        let mut map = RebindingMap::new(b.allocator());
        original.copy(&mut map).expect("copied")
    };
    assert_eq!(b.frame_size(), 2);
    assert!(!copy.references_binding(x.id));

    let both = b.block(vec![original, copy]);
    assert_eq!(
        run(&b, both),
        vec![
            XdmItem::Atomic(XdmAtomicValue::Integer(42)),
            XdmItem::Atomic(XdmAtomicValue::Integer(42)),
        ]
    );
}

#[rstest]
#[case(1, 2)]
#[case(41, 42)]
fn outer_reference_follows_the_map(#[case] value: i64, #[case] expected: i64) {
    let mut b = ExpressionBuilder::new();
    let x = b.declare("x");
    let fragment = b.add(b.var(&x), b.integer(1));

    let y = b.declare("y");
    let moved = {
        let mut map = RebindingMap::new(b.allocator());
        map.bind(&x, y.clone());
        fragment.copy(&mut map).expect("copied")
    };
    assert!(moved.references_binding(y.id));
    assert!(!moved.references_binding(x.id));

    let wrapped = b.let_(y, b.integer(value), moved);
    assert_eq!(run(&b, wrapped), vec![XdmItem::Atomic(XdmAtomicValue::Integer(expected))]);
}

#[rstest]
fn unmapped_outer_reference_is_internal() {
    let mut b = ExpressionBuilder::new();
    let x = b.declare("x");
    let fragment = b.at(4, 2).var(&x);
    let mut alloc = BindingAllocator::new();
    let mut map = RebindingMap::new(&mut alloc);
    let err = fragment.copy(&mut map).expect_err("no mapping for $x");
    assert_eq!(err.kind, ErrorKind::Internal);
    assert_eq!(err.location.map(|l| (l.line, l.column)), Some((4, 2)));
}

#[rstest]
#[case(true)]
#[case(false)]
fn mode_copy_dispatches_like_the_original(#[case] share_actions: bool) {
    let mut rules = RuleSetBuilder::default();
    for (local, tag) in [("a", "A"), ("b", "B")] {
        let action = rules.exprs().string(tag);
        rules
            .add_rule(&ModeName::Default, Pattern::element(local), action, 0, None)
            .expect("rule");
    }
    let exec = rules.build();
    let original = exec.modes().mode(&ModeName::Default).expect("default mode");
    let mut alloc = BindingAllocator::new();
    let copy = original.copy(&mut alloc, share_actions).expect("copied");

    assert!(copy.is_ranked());
    for (a, b) in original.rules().iter().zip(copy.rules()) {
        assert_eq!(Arc::ptr_eq(&a.action, &b.action), share_actions);
        assert_eq!(a.action, b.action);
        assert_eq!(a.rank, b.rank);
    }
    let ctx = DynamicContext::<SimpleNode>::default();
    for local in ["a", "b", "c"] {
        let item = XdmItem::Node(elem(local).build());
        assert_eq!(
            original.get_rule(&item, &ctx).expect("dispatch"),
            copy.get_rule(&item, &ctx).expect("dispatch")
        );
    }
}
