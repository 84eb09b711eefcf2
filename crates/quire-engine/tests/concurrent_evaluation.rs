use quire_engine::expr::{ArithOp, Axis, NodeTest};
use quire_engine::{
    CompiledExpression, DynamicContext, DynamicContextBuilder, Executable, ExpressionBuilder, ModeName, Pattern,
    RuleSetBuilder, SequenceCollector, SimpleNode, StaticContext, XdmItem, XdmNode, apply_rules, doc, elem, evaluate,
    text,
};
use rstest::{fixture, rstest};
use std::thread;

fn assert_shareable<T: Send + Sync>() {}

#[rstest]
fn compiled_units_are_shareable() {
    assert_shareable::<CompiledExpression>();
    assert_shareable::<Executable>();
}

#[fixture]
fn squares() -> CompiledExpression {
    let mut b = ExpressionBuilder::new();
    let i = b.declare("i");
    let body = b.arith(ArithOp::Mul, b.var(&i), b.var(&i));
    let expr = b.for_each(i, b.range(b.integer(1), b.integer(200)), body);
    b.compile(expr, &StaticContext::default()).expect("compiles")
}

#[fixture]
fn outline() -> Executable {
    let mut rules = RuleSetBuilder::default();
    let b = rules.exprs();
    let section = b.block(vec![
        b.string("("),
        b.apply_rules(b.step(Axis::Child, NodeTest::AnyNode), ModeName::Default),
        b.string(")"),
    ]);
    let title = b.string("title");
    rules
        .add_rule(&ModeName::Default, Pattern::element("section"), section, 0, None)
        .expect("rule");
    rules
        .add_rule(&ModeName::Default, Pattern::element("title"), title, 0, None)
        .expect("rule");
    rules.build()
}

fn document(sections: usize) -> SimpleNode {
    let mut body = elem("body");
    for n in 0..sections {
        body = body.child(
            elem("section")
                .child(elem("title").child(text(&format!("t{n}"))))
                .child(text(&format!("p{n}"))),
        );
    }
    doc().child(body).build()
}

fn render(items: &[XdmItem<SimpleNode>]) -> Vec<String> {
    items
        .iter()
        .map(|i| match i {
            XdmItem::Node(n) => n.string_value(),
            XdmItem::Atomic(a) => a.string_value().to_string(),
        })
        .collect()
}

fn run_squares(compiled: &CompiledExpression) -> Vec<String> {
    let ctx = DynamicContext::<SimpleNode>::default();
    render(&evaluate(compiled, &ctx).expect("evaluates"))
}

fn run_outline(exec: &Executable, sections: usize) -> Vec<String> {
    let collector = SequenceCollector::<SimpleNode>::shared();
    let ctx = DynamicContextBuilder::<SimpleNode>::new().with_sink(collector.clone()).build();
    apply_rules(exec, XdmItem::Node(document(sections)), &ModeName::Default, &ctx).expect("applied");
    let out = collector.borrow_mut().take();
    render(&out)
}

#[rstest]
fn parallel_evaluations_match_sequential(squares: CompiledExpression, outline: Executable) {
    let expected_squares = run_squares(&squares);
    let expected_outline: Vec<_> = (1..=4).map(|n| run_outline(&outline, n)).collect();
    assert_eq!(expected_squares.len(), 200);
    assert_eq!(expected_squares[199], "40000");
    assert_eq!(expected_outline[0], vec!["(", "title", "p0", ")"]);

    thread::scope(|scope| {
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let squares = &squares;
                let outline = &outline;
                scope.spawn(move || {
                    let mut results = Vec::new();
                    for _ in 0..25 {
                        results.push((run_squares(squares), run_outline(outline, n)));
                    }
                    (n, results)
                })
            })
            .collect();
        for handle in handles {
            let (n, results) = handle.join().expect("thread finished");
            for (sq, ol) in results {
                assert_eq!(sq, expected_squares);
                assert_eq!(ol, expected_outline[n - 1]);
            }
        }
    });
}
