//! Push-mode rule application: `apply-rules` and `next-match`.
use super::{CurrentRule, Mode, ModeName, ModeSet, OnNoMatch};
use crate::engine::runtime::{DynamicContext, Error, ErrorCode, Location};
use crate::engine::sink::CopyNamespaces;
use crate::iter::{SeqIter, collect_sequence};
use crate::model::{NodeKind, XdmNode};
use crate::xdm::{SequenceValue, XdmAtomicValue, XdmItem};
use std::sync::Arc;
use tracing::trace;

/// Apply the rules of `mode` to every item of `items`, in order. Each item
/// becomes the context item with its position in the selection.
pub(crate) fn apply_rules<'a, N: XdmNode>(
    items: SeqIter<'a, N>,
    mode: &ModeName,
    ctx: &DynamicContext<N>,
    location: &Location,
) -> Result<(), Error> {
    let selection = collect_sequence(items)?;
    let rules = ctx.rules().cloned();
    apply_to_sequence(&selection, mode, rules.as_ref(), ctx, location)
}

fn apply_to_sequence<N: XdmNode>(
    selection: &SequenceValue<N>,
    mode: &ModeName,
    rules: Option<&Arc<ModeSet>>,
    ctx: &DynamicContext<N>,
    location: &Location,
) -> Result<(), Error> {
    let frame_size = rules.map_or(0, |r| r.frame_size());
    let table = rules.and_then(|r| r.mode(mode));
    let size = selection.len();
    for (i, item) in selection.iter().enumerate() {
        let position = i + 1;
        let Some(table) = table else {
            builtin(OnNoMatch::default(), item, mode, rules, ctx, location)?;
            continue;
        };
        let lookup_ctx = ctx
            .new_child_context(frame_size)
            .with_focus(item.clone(), position, Some(size));
        match table.get_rule(item, &lookup_ctx)? {
            Some(index) => invoke(table, index, item, position, size, frame_size, ctx)?,
            None => builtin(table.on_no_match(), item, mode, rules, ctx, location)?,
        }
    }
    Ok(())
}

fn invoke<N: XdmNode>(
    mode: &Mode,
    index: usize,
    item: &XdmItem<N>,
    position: usize,
    size: usize,
    frame_size: usize,
    ctx: &DynamicContext<N>,
) -> Result<(), Error> {
    let rule = mode
        .rule(index)
        .ok_or_else(|| Error::internal(format!("rule {index} does not exist in mode {}", mode.name())))?;
    let mut action_ctx = ctx
        .new_child_context(frame_size)
        .with_focus(item.clone(), position, Some(size));
    action_ctx.set_current_rule(Some(CurrentRule {
        mode: mode.name().clone(),
        index,
    }));
    rule.action.process(&action_ctx)
}

fn builtin<N: XdmNode>(
    on_no_match: OnNoMatch,
    item: &XdmItem<N>,
    mode: &ModeName,
    rules: Option<&Arc<ModeSet>>,
    ctx: &DynamicContext<N>,
    location: &Location,
) -> Result<(), Error> {
    trace!(mode = %mode, action = ?on_no_match, "built-in rule");
    match on_no_match {
        OnNoMatch::DeepSkip => Ok(()),
        OnNoMatch::DeepCopy => append(item.clone(), ctx, location),
        OnNoMatch::Fail => Err(Error::from_code(
            ErrorCode::XTDE0555,
            format!("no rule in mode {mode} matches {item}"),
        )
        .at(Some(location))),
        OnNoMatch::ShallowSkip => match item {
            XdmItem::Node(node) if has_content(node) => {
                let below: SequenceValue<N> = node
                    .attributes()
                    .chain(node.children())
                    .map(XdmItem::Node)
                    .collect();
                apply_to_sequence(&below, mode, rules, ctx, location)
            }
            _ => Ok(()),
        },
        OnNoMatch::TextOnlyCopy => match item {
            XdmItem::Node(node) => match node.kind() {
                NodeKind::Document | NodeKind::Element => {
                    let children: SequenceValue<N> = node.children().map(XdmItem::Node).collect();
                    apply_to_sequence(&children, mode, rules, ctx, location)
                }
                NodeKind::Text => append(item.clone(), ctx, location),
                NodeKind::Attribute => append(
                    XdmItem::Atomic(XdmAtomicValue::string(node.string_value())),
                    ctx,
                    location,
                ),
                NodeKind::Comment | NodeKind::ProcessingInstruction => Ok(()),
            },
            XdmItem::Atomic(_) => append(item.clone(), ctx, location),
        },
    }
}

fn has_content<N: XdmNode>(node: &N) -> bool {
    matches!(node.kind(), NodeKind::Document | NodeKind::Element)
}

fn append<N: XdmNode>(item: XdmItem<N>, ctx: &DynamicContext<N>, location: &Location) -> Result<(), Error> {
    ctx.get_output_sink()
        .map_err(|e| e.at(Some(location)))?
        .append(item, Some(location), CopyNamespaces::Preserve)
}

/// Run the next rule below the current one for the current context item, or
/// the mode's built-in action when none matches.
pub(crate) fn next_match<N: XdmNode>(ctx: &DynamicContext<N>, location: &Location) -> Result<(), Error> {
    let current = ctx.current_rule().cloned().ok_or_else(|| {
        Error::from_code(ErrorCode::XTDE0560, "next-match called with no current rule").at(Some(location))
    })?;
    let rules = ctx
        .rules()
        .cloned()
        .ok_or_else(|| Error::internal("current rule set without rule tables").at(Some(location)))?;
    let mode = rules
        .mode(&current.mode)
        .ok_or_else(|| Error::internal(format!("mode {} is not defined", current.mode)).at(Some(location)))?;
    let focus = ctx
        .focus()
        .cloned()
        .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "next-match needs a context item").at(Some(location)))?;
    let size = focus.size.unwrap_or(focus.position);
    let lookup_ctx = ctx
        .new_child_context(rules.frame_size())
        .with_focus(focus.item.clone(), focus.position, Some(size));
    match mode.next_match(current.index, &focus.item, &lookup_ctx)? {
        Some(index) => invoke(mode, index, &focus.item, focus.position, size, rules.frame_size(), ctx),
        None => builtin(mode.on_no_match(), &focus.item, &current.mode, Some(&rules), ctx, location),
    }
}
