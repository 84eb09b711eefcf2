//! Entry points for running compiled expressions and rule sets.
use crate::compiler::{CompiledExpression, Executable};
use crate::engine::runtime::{DynamicContext, Error, Location};
use crate::iter::{ArrayIterator, SeqIter, collect_sequence, first_item};
use crate::model::XdmNode;
use crate::rules::{ModeName, apply};
use crate::xdm::{SequenceValue, XdmItem, XdmSequence};
use tracing::trace;

fn prepared<N: XdmNode>(ctx: &DynamicContext<N>, frame_size: usize) -> DynamicContext<N> {
    let mut ctx = ctx.clone();
    ctx.ensure_frame_size(frame_size);
    ctx
}

/// Evaluate to a fully materialized sequence.
pub fn evaluate<N: XdmNode>(compiled: &CompiledExpression, ctx: &DynamicContext<N>) -> Result<XdmSequence<N>, Error> {
    let ctx = prepared(ctx, compiled.frame_size());
    let value = collect_sequence(compiled.root().iterate(&ctx)?)?;
    trace!(items = value.len(), "evaluated");
    Ok(value.to_vec())
}

/// Evaluate lazily. The iterator borrows `compiled` and owns everything else
/// it needs; dropping it early stops evaluation.
pub fn evaluate_stream<'a, N: XdmNode>(
    compiled: &'a CompiledExpression,
    ctx: &DynamicContext<N>,
) -> Result<SeqIter<'a, N>, Error> {
    let ctx = prepared(ctx, compiled.frame_size());
    compiled.root().iterate(&ctx)
}

/// First item of the result, or `None`. Evaluation stops after one item.
pub fn evaluate_first<N: XdmNode>(
    compiled: &CompiledExpression,
    ctx: &DynamicContext<N>,
) -> Result<Option<XdmItem<N>>, Error> {
    let ctx = prepared(ctx, compiled.frame_size());
    first_item(compiled.root().iterate(&ctx)?)
}

/// Push the result into the context's output sink.
pub fn process<N: XdmNode>(compiled: &CompiledExpression, ctx: &DynamicContext<N>) -> Result<(), Error> {
    let ctx = prepared(ctx, compiled.frame_size());
    compiled.root().process(&ctx)
}

/// Apply the rules of `mode` to `items`, writing to the context's sink.
pub fn apply_rules<N: XdmNode>(
    executable: &Executable,
    items: impl Into<SequenceValue<N>>,
    mode: &ModeName,
    ctx: &DynamicContext<N>,
) -> Result<(), Error> {
    let ctx = prepared(ctx, executable.frame_size()).with_rules(executable.modes().clone());
    let selection: SeqIter<'_, N> = Box::new(ArrayIterator::new(items.into()));
    apply::apply_rules(selection, mode, &ctx, &Location::default())
}
