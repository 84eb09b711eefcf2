//! Template-rule dispatch.
//!
//! A [`Mode`] keeps its rules in one arena. Rules whose pattern fixes a node
//! name or kind are chained under a [`DiscriminatorKey`]; everything else goes
//! into the generic chain. After all rules are added, [`Mode::compute_rankings`]
//! assigns ranks and orders every chain best-first, so dispatch is a linear
//! scan that stops at the first match.
use crate::engine::runtime::{DynamicContext, Error};
use crate::expr::{BindingAllocator, Expression, RebindingMap};
use crate::model::XdmNode;
use crate::pattern::{DiscriminatorKey, Pattern};
use crate::xdm::{ExpandedName, XdmItem};
use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub mod apply;
pub mod precedence;

pub use precedence::{ImportPrecedences, ModuleTree, assign_import_precedence};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ModeName {
    #[default]
    Default,
    Named(ExpandedName),
}

impl fmt::Display for ModeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeName::Default => f.write_str("#default"),
            ModeName::Named(name) => write!(f, "{name}"),
        }
    }
}

/// What happens to an item no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnNoMatch {
    /// Drop the item and everything below it.
    DeepSkip,
    /// Drop the item, process its attributes and children.
    ShallowSkip,
    /// Process children, copy text nodes and atomic values.
    #[default]
    TextOnlyCopy,
    /// Copy the item unchanged.
    DeepCopy,
    /// Raise `err:XTDE0555`.
    Fail,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub action: Arc<Expression>,
    pub precedence: i32,
    pub priority: f64,
    /// Declaration order within the mode.
    pub sequence: u32,
    /// Assigned by [`Mode::compute_rankings`]; higher is preferred.
    pub rank: u32,
    /// Pattern test skipped during dispatch.
    pub always_matches: bool,
}

impl Rule {
    pub fn new(pattern: Pattern, action: Arc<Expression>, precedence: i32, priority: f64) -> Self {
        Self {
            pattern,
            action,
            precedence,
            priority,
            sequence: 0,
            rank: 0,
            always_matches: false,
        }
    }

    /// Precedence first, then priority. Declaration order is not consulted.
    pub fn compare_computed_rank(&self, other: &Rule) -> Ordering {
        self.precedence
            .cmp(&other.precedence)
            .then_with(|| self.priority.total_cmp(&other.priority))
    }

    pub fn compare_rank(&self, other: &Rule) -> Ordering {
        self.rank.cmp(&other.rank)
    }

    fn dispatch_key(&self) -> (u32, u32) {
        (self.rank, self.sequence)
    }

    /// Deep copy of the pattern; the action is shared or copied through the
    /// same rebinding map.
    pub fn copy(&self, map: &mut RebindingMap<'_>, share_action: bool) -> Result<Rule, Error> {
        let action = if share_action {
            Arc::clone(&self.action)
        } else {
            Arc::new(self.action.copy(map)?)
        };
        Ok(Rule {
            pattern: self.pattern.copy(map)?,
            action,
            precedence: self.precedence,
            priority: self.priority,
            sequence: self.sequence,
            rank: self.rank,
            always_matches: self.always_matches,
        })
    }
}

/// The rule being executed, for `next-match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentRule {
    pub mode: ModeName,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Mode {
    name: ModeName,
    rules: Vec<Rule>,
    keyed: HashMap<DiscriminatorKey, Vec<usize>>,
    generic: Vec<usize>,
    on_no_match: OnNoMatch,
    detect_conflicts: bool,
    ranked: bool,
    next_sequence: u32,
}

impl Mode {
    pub fn new(name: ModeName) -> Self {
        Self {
            name,
            rules: Vec::new(),
            keyed: HashMap::new(),
            generic: Vec::new(),
            on_no_match: OnNoMatch::default(),
            detect_conflicts: false,
            ranked: false,
            next_sequence: 0,
        }
    }

    pub fn name(&self) -> &ModeName {
        &self.name
    }

    pub fn on_no_match(&self) -> OnNoMatch {
        self.on_no_match
    }

    pub fn set_on_no_match(&mut self, on_no_match: OnNoMatch) {
        self.on_no_match = on_no_match;
    }

    /// Warn when an item matches two rules of equal rank.
    pub fn set_detect_conflicts(&mut self, detect: bool) {
        self.detect_conflicts = detect;
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn is_ranked(&self) -> bool {
        self.ranked
    }

    /// Add a rule. Without an explicit priority a union pattern becomes one
    /// rule per branch, each with its branch's default priority. Returns the
    /// arena indices of the new rules.
    pub fn add_rule(
        &mut self,
        pattern: Pattern,
        action: Arc<Expression>,
        precedence: i32,
        priority: Option<f64>,
    ) -> Vec<usize> {
        let branches = match priority {
            Some(_) => vec![pattern],
            None => pattern.into_branches(),
        };
        let mut added = Vec::with_capacity(branches.len());
        for branch in branches {
            let priority = priority.unwrap_or_else(|| branch.default_priority());
            let mut rule = Rule::new(branch, Arc::clone(&action), precedence, priority);
            rule.sequence = self.next_sequence;
            self.next_sequence += 1;
            added.push(self.push(rule));
        }
        self.ranked = false;
        added
    }

    fn push(&mut self, rule: Rule) -> usize {
        let index = self.rules.len();
        match rule.pattern.discriminator() {
            Some(key) => self.keyed.entry(key).or_default().push(index),
            None => self.generic.push(index),
        }
        self.rules.push(rule);
        index
    }

    /// Assign ranks and order every chain best-first. Rules with equal
    /// precedence and priority share a rank; within a rank the most recently
    /// declared rule comes first.
    pub fn compute_rankings(&mut self) {
        let mut order: Vec<usize> = (0..self.rules.len()).collect();
        let rules = &self.rules;
        order.sort_by(|&a, &b| {
            rules[a]
                .compare_computed_rank(&rules[b])
                .then_with(|| rules[a].sequence.cmp(&rules[b].sequence))
        });
        let mut rank = 0u32;
        for (pos, &index) in order.iter().enumerate() {
            if pos > 0 && self.rules[order[pos - 1]].compare_computed_rank(&self.rules[index]) != Ordering::Equal {
                rank += 1;
            }
            self.rules[index].rank = rank;
        }
        for rule in &mut self.rules {
            rule.always_matches = rule.pattern.matches_whole_chain();
        }
        let rules = &self.rules;
        let best_first = |a: &usize, b: &usize| rules[*b].dispatch_key().cmp(&rules[*a].dispatch_key());
        for chain in self.keyed.values_mut() {
            chain.sort_by(best_first);
        }
        self.generic.sort_by(best_first);
        self.ranked = true;
        debug!(
            mode = %self.name,
            rules = self.rules.len(),
            chains = self.keyed.len(),
            ranks = rank + u32::from(!self.rules.is_empty()),
            "computed rule ranks"
        );
    }

    /// Index of the best rule matching `item`, or `None` when no rule does.
    pub fn get_rule<N: XdmNode>(&self, item: &XdmItem<N>, ctx: &DynamicContext<N>) -> Result<Option<usize>, Error> {
        self.search(item, ctx, None)
    }

    /// Best rule matching `item` that ranks strictly below the rule at `current`.
    pub fn next_match<N: XdmNode>(
        &self,
        current: usize,
        item: &XdmItem<N>,
        ctx: &DynamicContext<N>,
    ) -> Result<Option<usize>, Error> {
        let below = self
            .rules
            .get(current)
            .map(Rule::dispatch_key)
            .ok_or_else(|| Error::internal(format!("rule {current} does not exist in mode {}", self.name)))?;
        self.search(item, ctx, Some(below))
    }

    fn chains_for<N: XdmNode>(&self, item: &XdmItem<N>) -> Vec<&[usize]> {
        let mut chains: Vec<&[usize]> = Vec::with_capacity(3);
        if let Some((named, kind)) = DiscriminatorKey::for_item(item) {
            if let Some(chain) = named.and_then(|k| self.keyed.get(&k)) {
                chains.push(chain);
            }
            if let Some(chain) = self.keyed.get(&kind) {
                chains.push(chain);
            }
        }
        chains.push(&self.generic);
        chains
    }

    fn search<N: XdmNode>(
        &self,
        item: &XdmItem<N>,
        ctx: &DynamicContext<N>,
        below: Option<(u32, u32)>,
    ) -> Result<Option<usize>, Error> {
        if !self.ranked {
            return Err(Error::internal(format!(
                "mode {} dispatched before its rules were ranked",
                self.name
            )));
        }
        let chains = self.chains_for(item);
        let mut best: Option<usize> = None;
        for chain in &chains {
            for &index in chain.iter() {
                let rule = &self.rules[index];
                let key = rule.dispatch_key();
                if below.is_some_and(|limit| key >= limit) {
                    continue;
                }
                if best.is_some_and(|b| key <= self.rules[b].dispatch_key()) {
                    break;
                }
                if rule.always_matches || rule.pattern.matches(item, ctx)? {
                    best = Some(index);
                    break;
                }
            }
        }
        match best {
            Some(index) => {
                trace!(mode = %self.name, rule = index, rank = self.rules[index].rank, "rule matched");
                if self.detect_conflicts {
                    self.report_conflicts(index, &chains, item, ctx)?;
                }
            }
            None => trace!(mode = %self.name, "no rule matched"),
        }
        Ok(best)
    }

    fn report_conflicts<N: XdmNode>(
        &self,
        chosen: usize,
        chains: &[&[usize]],
        item: &XdmItem<N>,
        ctx: &DynamicContext<N>,
    ) -> Result<(), Error> {
        let rank = self.rules[chosen].rank;
        for chain in chains {
            for &index in chain.iter() {
                let rule = &self.rules[index];
                if rule.rank < rank {
                    break;
                }
                if index != chosen && rule.rank == rank && rule.pattern.matches(item, ctx)? {
                    warn!(
                        mode = %self.name,
                        chosen = self.rules[chosen].sequence,
                        other = rule.sequence,
                        "ambiguous rule match; using the rule declared last"
                    );
                }
            }
        }
        Ok(())
    }

    /// Copy of the whole mode. Predicates and copied actions get bindings
    /// from `allocator`; rank and chain order are preserved.
    pub fn copy(&self, allocator: &mut BindingAllocator, share_actions: bool) -> Result<Mode, Error> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let mut map = RebindingMap::new(allocator);
            rules.push(rule.copy(&mut map, share_actions)?);
        }
        Ok(Mode {
            name: self.name.clone(),
            rules,
            keyed: self.keyed.clone(),
            generic: self.generic.clone(),
            on_no_match: self.on_no_match,
            detect_conflicts: self.detect_conflicts,
            ranked: self.ranked,
            next_sequence: self.next_sequence,
        })
    }
}

/// Frozen rule tables: every mode plus the slot frame size actions need.
#[derive(Debug, Clone, Default)]
pub struct ModeSet {
    modes: HashMap<ModeName, Mode>,
    frame_size: usize,
}

impl ModeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self, name: &ModeName) -> Option<&Mode> {
        self.modes.get(name)
    }

    pub fn mode_mut(&mut self, name: &ModeName) -> &mut Mode {
        self.modes
            .entry(name.clone())
            .or_insert_with(|| Mode::new(name.clone()))
    }

    pub fn modes(&self) -> impl Iterator<Item = &Mode> {
        self.modes.values()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn set_frame_size(&mut self, frame_size: usize) {
        self.frame_size = frame_size;
    }

    pub fn compute_rankings(&mut self) {
        for mode in self.modes.values_mut() {
            mode.compute_rankings();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::elem;
    use crate::xdm::XdmAtomicValue;

    fn action(tag: &str) -> Arc<Expression> {
        Arc::new(Expression::literal(
            vec![XdmAtomicValue::string(tag)],
            Default::default(),
        ))
    }

    #[test]
    fn equal_precedence_and_priority_share_a_rank() {
        let mut mode = Mode::new(ModeName::Default);
        mode.add_rule(Pattern::element("a"), action("first"), 0, Some(1.0));
        mode.add_rule(Pattern::element("a"), action("second"), 0, Some(1.0));
        mode.add_rule(Pattern::AnyItem, action("any"), 0, None);
        mode.compute_rankings();
        assert_eq!(mode.rules()[0].rank, mode.rules()[1].rank);
        assert!(mode.rules()[0].rank > mode.rules()[2].rank);

        let node = elem("a").build();
        let ctx = DynamicContext::default();
        let chosen = mode.get_rule(&XdmItem::Node(node), &ctx).expect("dispatch");
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn union_without_priority_is_split() {
        let mut mode = Mode::new(ModeName::Default);
        let union = Pattern::Union(vec![Pattern::element("a"), Pattern::AnyItem]);
        let added = mode.add_rule(union, action("u"), 0, None);
        assert_eq!(added.len(), 2);
        assert_eq!(mode.rules()[0].priority, 0.0);
        assert_eq!(mode.rules()[1].priority, -1.0);
        assert!(Arc::ptr_eq(&mode.rules()[0].action, &mode.rules()[1].action));
    }

    #[test]
    fn dispatch_before_ranking_is_internal_error() {
        let mut mode = Mode::new(ModeName::Default);
        mode.add_rule(Pattern::AnyItem, action("x"), 0, None);
        let ctx = DynamicContext::default();
        let item: XdmItem<crate::model::simple::SimpleNode> = XdmItem::Atomic(XdmAtomicValue::Integer(1));
        let err = mode.get_rule(&item, &ctx).expect_err("not ranked");
        assert_eq!(err.kind, crate::engine::runtime::ErrorKind::Internal);
    }
}
