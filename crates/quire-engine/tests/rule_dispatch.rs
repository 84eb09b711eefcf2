use quire_engine::expr::{CompOp, NodeTest};
use quire_engine::rules::{ModuleTree, assign_import_precedence};
use quire_engine::{
    DynamicContextBuilder, Error, ErrorCode, ExpandedName, Executable, Expression, Mode, ModeName,
    OnNoMatch, Pattern, RuleSetBuilder, SequenceCollector, SimpleNode, XdmItem, XdmNode, apply_rules, attr, doc,
    elem, process, text,
};
use rstest::rstest;
use std::sync::Arc;

fn strings(items: &[XdmItem<SimpleNode>]) -> Vec<String> {
    items
        .iter()
        .map(|i| match i {
            XdmItem::Node(n) => n.string_value(),
            XdmItem::Atomic(a) => a.string_value().to_string(),
        })
        .collect()
}

fn run(exec: &Executable, items: Vec<XdmItem<SimpleNode>>, mode: &ModeName) -> Result<Vec<String>, Error> {
    let collector = SequenceCollector::<SimpleNode>::shared();
    let ctx = DynamicContextBuilder::<SimpleNode>::new().with_sink(collector.clone()).build();
    apply_rules(exec, items, mode, &ctx)?;
    let out = collector.borrow_mut().take();
    Ok(strings(&out))
}

fn sample() -> SimpleNode {
    doc()
        .child(
            elem("root")
                .attr(attr("id", "r1"))
                .child(text("x"))
                .child(elem("leaf").child(text("y"))),
        )
        .build()
}

#[rstest]
#[case([0, 1, 2])]
#[case([2, 1, 0])]
#[case([1, 2, 0])]
#[case([2, 0, 1])]
fn highest_precedence_then_priority_wins(#[case] order: [usize; 3]) {
    let specs = [(1, 0.5, "p1-0.5"), (2, 0.1, "p2-0.1"), (2, 0.9, "p2-0.9")];
    let mut rules = RuleSetBuilder::default();
    for i in order {
        let (precedence, priority, tag) = specs[i];
        let action = rules.exprs().string(tag);
        rules
            .add_rule(&ModeName::Default, Pattern::element("a"), action, precedence, Some(priority))
            .expect("rule added");
    }
    let exec = rules.build();
    let out = run(&exec, vec![XdmItem::Node(elem("a").build())], &ModeName::Default).expect("applied");
    assert_eq!(out, vec!["p2-0.9"]);
}

#[rstest]
fn ranks_agree_with_precedence_and_priority() {
    let mut mode = Mode::new(ModeName::Default);
    let specs = [(0, 0.0), (1, -0.5), (1, 0.5), (0, 0.0), (2, -1.0), (1, 0.5), (0, 3.0)];
    for (precedence, priority) in specs {
        mode.add_rule(Pattern::element("a"), Arc::new(Expression::empty()), precedence, Some(priority));
    }
    mode.compute_rankings();
    for a in mode.rules() {
        for b in mode.rules() {
            assert_eq!(a.compare_computed_rank(b), a.compare_rank(b), "{a:?} vs {b:?}");
        }
    }
}

#[rstest]
fn equal_rank_picks_the_last_declared_rule() {
    let mut rules = RuleSetBuilder::default();
    rules.configure_mode(&ModeName::Default).set_detect_conflicts(true);
    for tag in ["first", "second", "third"] {
        let action = rules.exprs().string(tag);
        rules
            .add_rule(&ModeName::Default, Pattern::element("a"), action, 0, None)
            .expect("rule added");
    }
    let exec = rules.build();
    let item = vec![XdmItem::Node(elem("a").build())];
    let once = run(&exec, item.clone(), &ModeName::Default).expect("applied");
    let again = run(&exec, item, &ModeName::Default).expect("applied");
    assert_eq!(once, vec!["third"]);
    assert_eq!(once, again);
}

#[rstest]
fn specific_pattern_beats_generic_ones() {
    let mut rules = RuleSetBuilder::default();
    let any = rules.exprs().string("any");
    rules.add_rule(&ModeName::Default, Pattern::AnyItem, any, 0, None).expect("rule");
    let kind = rules.exprs().string("element");
    rules
        .add_rule(
            &ModeName::Default,
            Pattern::Node(NodeTest::Kind(quire_engine::NodeKind::Element)),
            kind,
            0,
            None,
        )
        .expect("rule");
    let named = rules.exprs().string("leaf");
    rules.add_rule(&ModeName::Default, Pattern::element("leaf"), named, 0, None).expect("rule");
    let exec = rules.build();
    let items = vec![
        XdmItem::Node(elem("leaf").build()),
        XdmItem::Node(elem("other").build()),
        XdmItem::Node(text("t")),
    ];
    let out = run(&exec, items, &ModeName::Default).expect("applied");
    assert_eq!(out, vec!["leaf", "element", "any"]);
}

#[rstest]
fn predicate_pattern_outranks_plain_name() {
    let mut rules = RuleSetBuilder::default();
    let plain = rules.exprs().string("item");
    rules.add_rule(&ModeName::Default, Pattern::element("item"), plain, 0, None).expect("rule");
    let b = rules.exprs();
    let predicate = b.compare(CompOp::Eq, b.attribute("n"), b.string("2"));
    let second = b.string("second");
    let pattern = Pattern::Predicate {
        base: Box::new(Pattern::element("item")),
        predicate,
    };
    rules.add_rule(&ModeName::Default, pattern, second, 0, None).expect("rule");
    let exec = rules.build();
    let items = (1..=3)
        .map(|n| XdmItem::Node(elem("item").attr(attr("n", &n.to_string())).build()))
        .collect();
    let out = run(&exec, items, &ModeName::Default).expect("applied");
    assert_eq!(out, vec!["item", "second", "item"]);
}

#[rstest]
fn next_match_falls_through_to_lower_rules_then_builtin() {
    let mut rules = RuleSetBuilder::default();
    for (tag, priority) in [("low", 1.0), ("high", 2.0)] {
        let b = rules.exprs();
        let action = b.block(vec![b.string(tag), b.next_match()]);
        rules
            .add_rule(&ModeName::Default, Pattern::element("a"), action, 0, Some(priority))
            .expect("rule");
    }
    let exec = rules.build();
    let node = elem("a").child(text("t")).build();
    let out = run(&exec, vec![XdmItem::Node(node)], &ModeName::Default).expect("applied");
    assert_eq!(out, vec!["high", "low", "t"]);
}

#[rstest]
fn next_match_without_current_rule_is_xtde0560() {
    let mut rules = RuleSetBuilder::default();
    let expr = rules.exprs().next_match();
    let compiled = rules
        .exprs()
        .compile(expr, &Default::default())
        .expect("compiles");
    let collector = SequenceCollector::<SimpleNode>::shared();
    let ctx = DynamicContextBuilder::<SimpleNode>::new()
        .with_context_item(XdmItem::Node(elem("a").build()))
        .with_sink(collector)
        .build();
    let err = process(&compiled, &ctx).expect_err("no current rule");
    assert_eq!(err.code_enum(), ErrorCode::XTDE0560);
}

#[rstest]
#[case(OnNoMatch::TextOnlyCopy, vec!["x", "y"])]
#[case(OnNoMatch::DeepSkip, vec![])]
#[case(OnNoMatch::DeepCopy, vec!["xy"])]
fn builtin_rules_without_user_rules(#[case] on_no_match: OnNoMatch, #[case] expected: Vec<&str>) {
    let mode = ModeName::Named(ExpandedName::local("m"));
    let mut rules = RuleSetBuilder::default();
    rules.configure_mode(&mode).set_on_no_match(on_no_match);
    let exec = rules.build();
    let out = run(&exec, vec![XdmItem::Node(sample())], &mode).expect("applied");
    assert_eq!(out, expected);
}

#[rstest]
fn shallow_skip_visits_attributes_and_children() {
    let mut rules = RuleSetBuilder::default();
    rules
        .configure_mode(&ModeName::Default)
        .set_on_no_match(OnNoMatch::ShallowSkip);
    let action = rules.exprs().string("@id");
    rules
        .add_rule(&ModeName::Default, Pattern::Node(NodeTest::attribute("id")), action, 0, None)
        .expect("rule");
    let exec = rules.build();
    let out = run(&exec, vec![XdmItem::Node(sample())], &ModeName::Default).expect("applied");
    assert_eq!(out, vec!["@id"]);
}

#[rstest]
fn fail_mode_reports_unmatched_item() {
    let mut rules = RuleSetBuilder::default();
    rules.configure_mode(&ModeName::Default).set_on_no_match(OnNoMatch::Fail);
    let exec = rules.build();
    let err = run(&exec, vec![XdmItem::Node(sample())], &ModeName::Default).expect_err("fails");
    assert_eq!(err.code_enum(), ErrorCode::XTDE0555);
}

#[rstest]
fn undeclared_mode_uses_text_only_copy() {
    let exec = RuleSetBuilder::default().build();
    let mode = ModeName::Named(ExpandedName::local("nowhere"));
    let out = run(&exec, vec![XdmItem::Node(sample())], &mode).expect("applied");
    assert_eq!(out, vec!["x", "y"]);
}

#[rstest]
fn actions_recurse_through_apply_rules() {
    let mut rules = RuleSetBuilder::default();
    let b = rules.exprs();
    let children = b.step(quire_engine::expr::Axis::Child, NodeTest::AnyNode);
    let root_action = b.block(vec![
        b.string("["),
        b.apply_rules(children, ModeName::Default),
        b.string("]"),
    ]);
    let leaf_action = b.string("leaf");
    rules
        .add_rule(&ModeName::Default, Pattern::element("root"), root_action, 0, None)
        .expect("rule");
    rules
        .add_rule(&ModeName::Default, Pattern::element("leaf"), leaf_action, 0, None)
        .expect("rule");
    let exec = rules.build();
    let out = run(&exec, vec![XdmItem::Node(sample())], &ModeName::Default).expect("applied");
    assert_eq!(out, vec!["[", "x", "leaf", "]"]);
}

#[rstest]
fn imported_rules_lose_to_the_importer() {
    let tree = ModuleTree::new("main").import(ModuleTree::new("base"));
    let precedences = assign_import_precedence(&tree);
    let mut rules = RuleSetBuilder::default();
    let from_base = rules.exprs().string("base");
    rules
        .add_rule(
            &ModeName::Default,
            Pattern::element("a"),
            from_base,
            precedences.get("base").expect("assigned"),
            Some(10.0),
        )
        .expect("rule");
    let from_main = rules.exprs().string("main");
    rules
        .add_rule(
            &ModeName::Default,
            Pattern::AnyItem,
            from_main,
            precedences.get("main").expect("assigned"),
            None,
        )
        .expect("rule");
    let exec = rules.build();
    let out = run(&exec, vec![XdmItem::Node(elem("a").build())], &ModeName::Default).expect("applied");
    assert_eq!(out, vec!["main"]);
}
