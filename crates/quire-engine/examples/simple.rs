use quire_engine::expr::{Axis, NodeTest};
use quire_engine::{
    DynamicContextBuilder, ModeName, Pattern, RuleSetBuilder, SequenceCollector, SimpleNode, XdmItem, apply_rules,
    attr, doc, elem, evaluate, text,
};

fn main() {
    let doc_node = doc()
        .child(
            elem("book")
                .attr(attr("id", "b1"))
                .child(elem("title").child(text("Rules")))
                .child(elem("para").child(text("one")))
                .child(elem("para").child(text("two"))),
        )
        .build();

    let mut builder = quire_engine::ExpressionBuilder::new();
    let query = builder.path(builder.child("book"), builder.child("para"));
    let compiled = builder
        .compile(query, &Default::default())
        .expect("query compiles");
    println!("Compiled: {:?}", compiled.root());
    let ctx = DynamicContextBuilder::new()
        .with_context_item(XdmItem::Node(doc_node.clone()))
        .build();
    println!("{:?}", evaluate::<SimpleNode>(&compiled, &ctx));

    let mut rules = RuleSetBuilder::default();
    let b = rules.exprs();
    let book = b.block(vec![
        b.string("<book>"),
        b.apply_rules(b.step(Axis::Child, NodeTest::AnyNode), ModeName::Default),
        b.string("</book>"),
    ]);
    let title = b.string("title");
    rules
        .add_rule(&ModeName::Default, Pattern::element("book"), book, 0, None)
        .expect("rule");
    rules
        .add_rule(&ModeName::Default, Pattern::element("title"), title, 0, None)
        .expect("rule");
    let exec = rules.build();

    let out = SequenceCollector::<SimpleNode>::shared();
    let ctx = DynamicContextBuilder::<SimpleNode>::new().with_sink(out.clone()).build();
    let result = apply_rules(&exec, XdmItem::Node(doc_node), &ModeName::Default, &ctx);
    println!("{result:?} -> {:?}", out.borrow().items());
}
