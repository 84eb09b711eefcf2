use quire_engine::{
    CopyNamespaces, DynamicContext, DynamicContextBuilder, Error, ErrorCode, ErrorKind, ExpressionBuilder, Location,
    OutputSink, SequenceCollector, SimpleNode, StaticContext, XdmItem, XdmNode, doc, elem, evaluate, process, text,
};
use rstest::rstest;
use std::cell::RefCell;
use std::rc::Rc;

fn render(items: &[XdmItem<SimpleNode>]) -> Vec<String> {
    items
        .iter()
        .map(|i| match i {
            XdmItem::Node(n) => n.string_value(),
            XdmItem::Atomic(a) => a.string_value().to_string(),
        })
        .collect()
}

fn push(builder: &ExpressionBuilder, expr: quire_engine::Expression, context: Option<SimpleNode>) -> Vec<String> {
    let compiled = builder.compile(expr, &StaticContext::default()).expect("compiles");
    let collector = SequenceCollector::<SimpleNode>::shared();
    let mut ctx = DynamicContextBuilder::<SimpleNode>::new().with_sink(collector.clone());
    if let Some(node) = context {
        ctx = ctx.with_context_item(XdmItem::Node(node));
    }
    process(&compiled, &ctx.build()).expect("processed");
    let out = collector.borrow_mut().take();
    render(&out)
}

/// Accepts `limit` items, then refuses.
struct Bounded {
    limit: usize,
    seen: Vec<Option<Location>>,
}

impl OutputSink<SimpleNode> for Bounded {
    fn append(
        &mut self,
        _item: XdmItem<SimpleNode>,
        location: Option<&Location>,
        _copy_namespaces: CopyNamespaces,
    ) -> Result<(), Error> {
        self.seen.push(location.cloned());
        if self.seen.len() > self.limit {
            return Err(Error::from_code(ErrorCode::FOER0000, "output full"));
        }
        Ok(())
    }
}

#[rstest]
fn block_pushes_parts_in_order() {
    let b = ExpressionBuilder::new();
    let expr = b.block(vec![b.string("a"), b.integer(1), b.empty(), b.string("z")]);
    assert_eq!(push(&b, expr, None), vec!["a", "1", "z"]);
}

#[rstest]
fn for_loop_pushes_each_body_result() {
    let mut b = ExpressionBuilder::new();
    let i = b.declare("i");
    let body = b.block(vec![b.var(&i), b.string("x")]);
    let expr = b.for_each(i, b.range(b.integer(1), b.integer(3)), body);
    assert_eq!(push(&b, expr, None), vec!["1", "x", "2", "x", "3", "x"]);
}

#[rstest]
#[case(true, vec!["then"])]
#[case(false, vec!["else"])]
fn conditional_pushes_one_branch(#[case] flag: bool, #[case] expected: Vec<&str>) {
    let b = ExpressionBuilder::new();
    let condition = b.compare(quire_engine::expr::CompOp::Eq, b.integer(1), b.integer(if flag { 1 } else { 2 }));
    let expr = b.if_(condition, b.string("then"), b.string("else"));
    assert_eq!(push(&b, expr, None), expected);
}

#[rstest]
fn pushed_nodes_keep_identity() {
    let tree = doc()
        .child(elem("root").child(elem("item").child(text("a"))).child(elem("item").child(text("b"))))
        .build();
    let b = ExpressionBuilder::new();
    let expr = b.path(b.child("root"), b.child("item"));
    assert_eq!(push(&b, expr.clone(), Some(tree.clone())), vec!["a", "b"]);

    let compiled = b.compile(expr, &StaticContext::default()).expect("compiles");
    let ctx = DynamicContextBuilder::new().with_context_item(XdmItem::Node(tree.clone())).build();
    let pulled = evaluate(&compiled, &ctx).expect("evaluates");
    let root = tree.children().next().expect("root");
    let items: Vec<_> = root.children().map(XdmItem::Node).collect();
    assert_eq!(pulled, items);
}

#[rstest]
fn missing_sink_is_xpdy0050() {
    let b = ExpressionBuilder::new();
    let compiled = b.compile(b.string("lost"), &StaticContext::default()).expect("compiles");
    let err = process(&compiled, &DynamicContext::<SimpleNode>::default()).expect_err("no sink");
    assert_eq!(err.code_enum(), ErrorCode::XPDY0050);
    assert_eq!(err.kind, ErrorKind::Dynamic);
}

#[rstest]
fn sink_failure_stops_the_loop() {
    let mut b = ExpressionBuilder::new();
    let i = b.declare("i");
    b.at(7, 3);
    let body = b.var(&i);
    let expr = b.for_each(i, b.range(b.integer(1), b.integer(100)), body);
    let compiled = b.compile(expr, &StaticContext::default()).expect("compiles");

    let sink = Rc::new(RefCell::new(Bounded {
        limit: 2,
        seen: Vec::new(),
    }));
    let ctx = DynamicContextBuilder::<SimpleNode>::new().with_sink(sink.clone()).build();
    let err = process(&compiled, &ctx).expect_err("sink refuses");
    assert_eq!(err.code_enum(), ErrorCode::FOER0000);
    let seen = &sink.borrow().seen;
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|l| l.as_ref().is_some_and(|l| l.line == 7 && l.column == 3)));
}
