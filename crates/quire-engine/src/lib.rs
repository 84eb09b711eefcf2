//! Evaluation core for an XPath/XSLT-style language: an expression tree
//! compiled in three static phases, evaluated through lazy sequence
//! iterators or pushed to an output sink, and a template-rule dispatcher.
pub mod compiler;
pub mod consts;
pub mod engine;
pub mod evaluator;
pub mod expr;
pub mod iter;
pub mod model;
pub mod pattern;
pub mod rules;
pub mod xdm;

pub use compiler::{CompiledExpression, Executable, ExpressionBuilder, RuleSetBuilder, compile};
pub use engine::runtime::{
    DynamicContext, DynamicContextBuilder, Error, ErrorCode, ErrorKind, Location, NumericConversion,
    OptimizationLevel, StaticContext, StaticContextBuilder,
};
pub use engine::sink::{CopyNamespaces, OutputSink, SequenceCollector};
pub use evaluator::{apply_rules, evaluate, evaluate_first, evaluate_stream, process};
pub use expr::{Expression, ExprKind};
pub use iter::{IteratorProperties, SeqIter, SequenceIterator};
pub use model::simple::{SimpleNode, SimpleNodeBuilder, attr, comment, doc, elem, text};
pub use model::{NodeKind, QName, XdmNode};
pub use pattern::Pattern;
pub use rules::{Mode, ModeName, ModeSet, OnNoMatch, Rule};
pub use xdm::{ExpandedName, SequenceValue, XdmAtomicValue, XdmItem, XdmSequence};
