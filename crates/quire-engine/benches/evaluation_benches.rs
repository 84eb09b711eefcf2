use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use quire_engine::expr::{ArithOp, Axis, CompOp, NodeTest};
use quire_engine::iter::ArrayIterator;
use quire_engine::{
    CompiledExpression, DynamicContextBuilder, Expression, ExpressionBuilder, SimpleNode, StaticContext, XdmItem,
    attr, doc, elem, evaluate, evaluate_first, text,
};
use std::hint::black_box;

fn build_document(items: usize) -> SimpleNode {
    let mut root = elem("root");
    for n in 0..items {
        root = root.child(
            elem("item")
                .attr(attr("type", if n % 3 == 0 { "a" } else { "b" }))
                .child(text(&format!("item {n}"))),
        );
    }
    doc().child(root).build()
}

fn queries() -> Vec<(&'static str, ExpressionBuilder, Expression)> {
    let mut out = Vec::new();

    let b = ExpressionBuilder::new();
    let e = b.add(b.integer(1), b.arith(ArithOp::Mul, b.integer(2), b.integer(3)));
    out.push(("constant", b, e));

    let mut b = ExpressionBuilder::new();
    let n = b.declare("n");
    let body = b.arith(ArithOp::Mul, b.var(&n), b.var(&n));
    let e = b.for_each(n, b.range(b.integer(1), b.integer(100)), body);
    out.push(("squares", b, e));

    let b = ExpressionBuilder::new();
    let typed = b.compare(CompOp::Eq, b.attribute("type"), b.string("a"));
    let e = b.path(b.child("root"), b.filter(b.child("item"), typed));
    out.push(("filtered-path", b, e));

    let b = ExpressionBuilder::new();
    let e = b.path(
        b.child("root"),
        b.filter(b.step(Axis::Child, NodeTest::element("item")), b.integer(5)),
    );
    out.push(("positional", b, e));

    out
}

fn compile_all() -> Vec<(&'static str, CompiledExpression)> {
    queries()
        .into_iter()
        .map(|(name, b, e)| (name, b.compile(e, &StaticContext::default()).expect("compile failure")))
        .collect()
}

fn benchmark_compiler(c: &mut Criterion) {
    c.bench_function("compiler/compile", |bench| {
        bench.iter(|| {
            for (_, b, e) in queries() {
                black_box(b.compile(e, &StaticContext::default()).expect("compile failure"));
            }
        })
    });
}

fn benchmark_evaluator(c: &mut Criterion) {
    let document = build_document(200);
    let ctx = DynamicContextBuilder::new()
        .with_context_item(XdmItem::Node(document))
        .build();
    let mut group = c.benchmark_group("evaluator");
    for (name, compiled) in compile_all() {
        group.bench_with_input(BenchmarkId::new("evaluate", name), &compiled, |bench, compiled| {
            bench.iter(|| black_box(evaluate(compiled, &ctx).expect("evaluation failure")))
        });
        group.bench_with_input(BenchmarkId::new("evaluate_first", name), &compiled, |bench, compiled| {
            bench.iter(|| black_box(evaluate_first(compiled, &ctx).expect("evaluation failure")))
        });
    }
    group.finish();
}

fn benchmark_slicing(c: &mut Criterion) {
    let items: Vec<XdmItem<SimpleNode>> = (0..10_000)
        .map(|i| XdmItem::Atomic(quire_engine::XdmAtomicValue::Integer(i)))
        .collect();
    c.bench_function("iter/array_slice", |bench| {
        bench.iter(|| {
            let it = ArrayIterator::new(items.clone().into());
            black_box(it.make_slice_iterator(black_box(5_000), black_box(5_100)))
        })
    });
}

criterion_group!(benches, benchmark_compiler, benchmark_evaluator, benchmark_slicing);
criterion_main!(benches);
