//! Compiled expression tree.
//!
//! An [`Expression`] owns its children through [`Operand`] edges. Each
//! rewrite phase (`simplify`, `type_check`, `optimize`) consumes a node and
//! returns its replacement, so a parent always stores whatever the child's
//! phase returned. Static properties are cached per node and recomputed
//! whenever a node is built or its operands are replaced.
use crate::engine::runtime::{Error, ErrorCode, Location, NumericConversion};
use crate::rules::ModeName;
use crate::xdm::{ExpandedName, XdmAtomicValue};
use bitflags::bitflags;
use smallvec::SmallVec;
use std::sync::Arc;

pub mod arith;
pub mod binding;
mod copy;
mod cursors;
mod eval;
mod fold;
mod optimize;
pub mod props;
mod simplify;
pub mod step;
mod typecheck;
pub mod types;

pub(crate) use eval::predicate_matches;
pub use binding::{BindingAllocator, BindingId, RebindingMap, VariableBinding};
pub use props::{Cardinality, Dependencies, EvaluationMethods, SpecialProperties, StaticProperties};
pub use step::{Axis, NameTest, NodeTest};
pub use types::{AtomicType, ItemType, SequenceType};

bitflags! {
    /// How a child is evaluated relative to its parent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OperandRole: u8 {
        /// Evaluated with the parent's focus.
        const SAME_FOCUS = 1;
        /// Evaluated with a focus the parent establishes per item.
        const FOCUS_CONTROLLED = 1 << 1;
        /// Evaluated repeatedly, once per item or binding of the parent.
        const REPEATED = 1 << 2;
        /// A single atomic value (or nothing) is expected.
        const SINGLE_ATOMIC = 1 << 3;
        /// Evaluated outside the parent's focus (rule actions, function bodies).
        const HIGHER_ORDER = 1 << 4;
    }
}

impl OperandRole {
    pub const NAVIGATE: Self = Self::SAME_FOCUS;
    pub const ATOMIC: Self = Self::SAME_FOCUS.union(Self::SINGLE_ATOMIC);
    pub const PREDICATE: Self = Self::FOCUS_CONTROLLED.union(Self::REPEATED);
    pub const LOOP_BODY: Self = Self::SAME_FOCUS.union(Self::REPEATED);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub role: OperandRole,
    pub expr: Box<Expression>,
}

impl Operand {
    pub fn new(role: OperandRole, expr: Expression) -> Self {
        Self {
            role,
            expr: Box::new(expr),
        }
    }

    /// Replace the child with the result of `f`, which receives it by value.
    pub(crate) fn rewrite<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(Expression) -> Result<Expression, Error>,
    {
        let child = std::mem::take(&mut *self.expr);
        *self.expr = f(child)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

/// Concrete arithmetic strategy, chosen once operand types are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Calculator {
    /// Operand types are inspected per evaluation.
    Generic,
    Integer,
    Decimal,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Not,
    Exists,
    Empty,
    Boolean,
    Count,
    ExactlyOne,
    ZeroOrOne,
    Data,
    Subsequence,
}

impl BuiltinFunction {
    pub fn local_name(&self) -> &'static str {
        match self {
            BuiltinFunction::Not => "not",
            BuiltinFunction::Exists => "exists",
            BuiltinFunction::Empty => "empty",
            BuiltinFunction::Boolean => "boolean",
            BuiltinFunction::Count => "count",
            BuiltinFunction::ExactlyOne => "exactly-one",
            BuiltinFunction::ZeroOrOne => "zero-or-one",
            BuiltinFunction::Data => "data",
            BuiltinFunction::Subsequence => "subsequence",
        }
    }

    /// Accepted argument counts, inclusive.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            BuiltinFunction::Subsequence => (2, 3),
            _ => (1, 1),
        }
    }

    pub(crate) fn arg_role(&self, index: usize) -> OperandRole {
        match (self, index) {
            (BuiltinFunction::Subsequence, 1 | 2) => OperandRole::ATOMIC,
            _ => OperandRole::NAVIGATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Arc<[XdmAtomicValue]>),
    ContextItem,
    ContextPosition,
    ContextSize,
    LocalVariable {
        binding: VariableBinding,
        /// Static type of the bound value, filled in by type checking.
        ty: Option<SequenceType>,
    },
    GlobalVariable {
        name: ExpandedName,
        ty: Option<SequenceType>,
    },
    Let {
        binding: VariableBinding,
        value: Operand,
        body: Operand,
    },
    For {
        binding: VariableBinding,
        input: Operand,
        body: Operand,
    },
    Block(Vec<Operand>),
    If {
        condition: Operand,
        then: Operand,
        otherwise: Operand,
    },
    Arithmetic {
        op: ArithOp,
        lhs: Operand,
        rhs: Operand,
        calculator: Calculator,
    },
    ValueComparison {
        op: CompOp,
        lhs: Operand,
        rhs: Operand,
    },
    Logical {
        op: BoolOp,
        lhs: Operand,
        rhs: Operand,
    },
    Call {
        function: BuiltinFunction,
        args: Vec<Operand>,
    },
    Range {
        lo: Operand,
        hi: Operand,
    },
    AxisStep {
        axis: Axis,
        test: NodeTest,
    },
    Path {
        start: Operand,
        step: Operand,
    },
    Filter {
        base: Operand,
        predicate: Operand,
    },
    Union {
        lhs: Operand,
        rhs: Operand,
    },
    Atomize(Operand),
    /// Converts `xs:untypedAtomic` items to `target`; other items pass through.
    UntypedConvert {
        operand: Operand,
        target: AtomicType,
        conversion: NumericConversion,
    },
    Cast {
        operand: Operand,
        target: AtomicType,
        allows_empty: bool,
    },
    CardinalityCheck {
        operand: Operand,
        required: Cardinality,
    },
    ApplyRules {
        select: Operand,
        mode: ModeName,
    },
    NextMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    props: StaticProperties,
    pub location: Location,
}

impl Default for Expression {
    /// The empty sequence.
    fn default() -> Self {
        Expression::new(ExprKind::Literal(Arc::from(Vec::new())), Location::default())
    }
}

impl Expression {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        let mut expr = Self {
            kind,
            props: StaticProperties::default(),
            location,
        };
        expr.props = expr.compute_properties();
        expr
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn literal(values: Vec<XdmAtomicValue>, location: Location) -> Self {
        Self::new(ExprKind::Literal(Arc::from(values)), location)
    }

    pub fn properties(&self) -> &StaticProperties {
        &self.props
    }

    pub fn cardinality(&self) -> Cardinality {
        self.props.cardinality
    }

    pub fn item_type(&self) -> ItemType {
        self.props.item_type
    }

    pub fn dependencies(&self) -> Dependencies {
        self.props.dependencies
    }

    pub fn special(&self) -> SpecialProperties {
        self.props.special
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }

    pub fn is_empty_literal(&self) -> bool {
        matches!(&self.kind, ExprKind::Literal(v) if v.is_empty())
    }

    pub fn literal_values(&self) -> Option<&[XdmAtomicValue]> {
        match &self.kind {
            ExprKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Recompute the cached properties after operands changed in place.
    pub(crate) fn reset_properties(&mut self) {
        self.props = self.compute_properties();
    }

    /// Replace `self` by `replacement`, keeping this node's location when the
    /// replacement has none.
    pub(crate) fn replaced_by(&self, mut replacement: Expression) -> Expression {
        if replacement.location.is_unknown() {
            replacement.location = self.location.clone();
        }
        replacement
    }

    pub fn operands(&self) -> SmallVec<[&Operand; 3]> {
        let mut out = SmallVec::new();
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::ContextItem
            | ExprKind::ContextPosition
            | ExprKind::ContextSize
            | ExprKind::LocalVariable { .. }
            | ExprKind::GlobalVariable { .. }
            | ExprKind::AxisStep { .. }
            | ExprKind::NextMatch => {}
            ExprKind::Let { value, body, .. } => out.extend([value, body]),
            ExprKind::For { input, body, .. } => out.extend([input, body]),
            ExprKind::Block(ops) => out.extend(ops.iter()),
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => out.extend([condition, then, otherwise]),
            ExprKind::Arithmetic { lhs, rhs, .. }
            | ExprKind::ValueComparison { lhs, rhs, .. }
            | ExprKind::Logical { lhs, rhs, .. }
            | ExprKind::Union { lhs, rhs } => out.extend([lhs, rhs]),
            ExprKind::Range { lo, hi } => out.extend([lo, hi]),
            ExprKind::Call { args, .. } => out.extend(args.iter()),
            ExprKind::Path { start, step } => out.extend([start, step]),
            ExprKind::Filter { base, predicate } => out.extend([base, predicate]),
            ExprKind::Atomize(operand)
            | ExprKind::UntypedConvert { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::CardinalityCheck { operand, .. } => out.push(operand),
            ExprKind::ApplyRules { select, .. } => out.push(select),
        }
        out
    }

    pub(crate) fn operands_mut(&mut self) -> SmallVec<[&mut Operand; 3]> {
        let mut out = SmallVec::new();
        match &mut self.kind {
            ExprKind::Literal(_)
            | ExprKind::ContextItem
            | ExprKind::ContextPosition
            | ExprKind::ContextSize
            | ExprKind::LocalVariable { .. }
            | ExprKind::GlobalVariable { .. }
            | ExprKind::AxisStep { .. }
            | ExprKind::NextMatch => {}
            ExprKind::Let { value, body, .. } => out.extend([value, body]),
            ExprKind::For { input, body, .. } => out.extend([input, body]),
            ExprKind::Block(ops) => out.extend(ops.iter_mut()),
            ExprKind::If {
                condition,
                then,
                otherwise,
            } => out.extend([condition, then, otherwise]),
            ExprKind::Arithmetic { lhs, rhs, .. }
            | ExprKind::ValueComparison { lhs, rhs, .. }
            | ExprKind::Logical { lhs, rhs, .. }
            | ExprKind::Union { lhs, rhs } => out.extend([lhs, rhs]),
            ExprKind::Range { lo, hi } => out.extend([lo, hi]),
            ExprKind::Call { args, .. } => out.extend(args.iter_mut()),
            ExprKind::Path { start, step } => out.extend([start, step]),
            ExprKind::Filter { base, predicate } => out.extend([base, predicate]),
            ExprKind::Atomize(operand)
            | ExprKind::UntypedConvert { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::CardinalityCheck { operand, .. } => out.push(operand),
            ExprKind::ApplyRules { select, .. } => out.push(select),
        }
        out
    }

    /// Apply `f` to every child, then recompute this node's properties.
    pub(crate) fn rewrite_operands<F>(&mut self, mut f: F) -> Result<(), Error>
    where
        F: FnMut(Expression) -> Result<Expression, Error>,
    {
        for operand in self.operands_mut() {
            operand.rewrite(&mut f)?;
        }
        self.reset_properties();
        Ok(())
    }

    /// Bindings of all local variable references in this subtree, in tree order.
    pub fn variable_references(&self) -> Vec<&VariableBinding> {
        fn walk<'e>(e: &'e Expression, out: &mut Vec<&'e VariableBinding>) {
            if let ExprKind::LocalVariable { binding, .. } = &e.kind {
                out.push(binding);
            }
            for op in e.operands() {
                walk(&op.expr, out);
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    pub fn references_binding(&self, id: BindingId) -> bool {
        self.variable_references().iter().any(|b| b.id == id)
    }

    /// Check that every cached property in the tree matches what its current
    /// operands imply.
    pub fn verify_properties(&self) -> Result<(), Error> {
        for op in self.operands() {
            op.expr.verify_properties()?;
        }
        let fresh = self.compute_properties();
        if fresh != self.props {
            return Err(Error::internal(format!(
                "stale static properties on {:?}: cached {:?}, expected {:?}",
                std::mem::discriminant(&self.kind),
                self.props,
                fresh
            ))
            .at(Some(&self.location)));
        }
        Ok(())
    }

    fn compute_properties(&self) -> StaticProperties {
        use Cardinality as C;
        use Dependencies as D;
        use EvaluationMethods as M;
        use SpecialProperties as S;

        let child_deps = |ops: &[&Operand]| {
            ops.iter().fold(D::empty(), |acc, op| {
                let mut deps = op.expr.dependencies();
                if op.role.contains(OperandRole::FOCUS_CONTROLLED) {
                    deps.remove(D::FOCUS);
                }
                acc | deps
            })
        };
        let child_special = |ops: &[&Operand]| {
            if ops.iter().all(|op| op.expr.special().contains(S::NON_CREATIVE)) {
                S::NON_CREATIVE
            } else {
                S::empty()
            }
        };
        let ops = self.operands();
        let deps = child_deps(&ops);
        let non_creative = child_special(&ops);
        let single = |card: C, item: ItemType, deps: D| StaticProperties {
            cardinality: card,
            item_type: item,
            special: non_creative,
            dependencies: deps,
            methods: M::EVALUATE_ITEM,
        };
        let boolean = ItemType::Atomic(AtomicType::Boolean);
        let integer = ItemType::Atomic(AtomicType::Integer);

        match &self.kind {
            ExprKind::Literal(values) => StaticProperties {
                cardinality: match values.len() {
                    0 => C::EMPTY,
                    1 => C::EXACTLY_ONE,
                    _ => C::ALLOWS_MANY,
                },
                item_type: values
                    .iter()
                    .map(|v| ItemType::Atomic(v.type_of()))
                    .reduce(ItemType::common_supertype)
                    .unwrap_or(ItemType::AnyItem),
                special: S::NON_CREATIVE,
                dependencies: D::empty(),
                methods: M::ITERATE | M::EVALUATE_ITEM,
            },
            ExprKind::ContextItem => StaticProperties {
                cardinality: C::EXACTLY_ONE,
                item_type: ItemType::AnyItem,
                special: S::NON_CREATIVE | S::ORDERED_NODESET | S::PEER_NODESET,
                dependencies: D::CONTEXT_ITEM,
                methods: M::EVALUATE_ITEM,
            },
            ExprKind::ContextPosition => single(C::EXACTLY_ONE, integer, D::POSITION),
            ExprKind::ContextSize => single(C::EXACTLY_ONE, integer, D::LAST),
            ExprKind::LocalVariable { ty, .. } | ExprKind::GlobalVariable { ty, .. } => {
                let ty = ty.unwrap_or(SequenceType::new(ItemType::AnyItem, C::ZERO_OR_MORE));
                let deps = if matches!(self.kind, ExprKind::LocalVariable { .. }) {
                    D::LOCAL_VARIABLES
                } else {
                    D::GLOBAL_VARIABLES
                };
                StaticProperties {
                    cardinality: ty.cardinality,
                    item_type: ty.item,
                    special: S::NON_CREATIVE,
                    dependencies: deps,
                    methods: M::ITERATE,
                }
            }
            ExprKind::Let { body, .. } => StaticProperties {
                cardinality: body.expr.cardinality(),
                item_type: body.expr.item_type(),
                special: body.expr.special() & (S::ORDERED_NODESET | S::PEER_NODESET) | non_creative,
                dependencies: deps,
                methods: M::ITERATE | M::PROCESS,
            },
            ExprKind::For { input, body, .. } => StaticProperties {
                cardinality: input.expr.cardinality().multiply(body.expr.cardinality()),
                item_type: body.expr.item_type(),
                special: non_creative,
                dependencies: deps,
                methods: M::ITERATE | M::PROCESS,
            },
            ExprKind::Block(items) => StaticProperties {
                cardinality: items
                    .iter()
                    .fold(C::EMPTY, |acc, op| acc.sum(op.expr.cardinality())),
                item_type: items
                    .iter()
                    .filter(|op| !op.expr.cardinality().is_empty_only())
                    .map(|op| op.expr.item_type())
                    .reduce(ItemType::common_supertype)
                    .unwrap_or(ItemType::AnyItem),
                special: non_creative,
                dependencies: deps,
                methods: M::ITERATE | M::PROCESS,
            },
            ExprKind::If { then, otherwise, .. } => {
                let item_type = match (
                    then.expr.cardinality().is_empty_only(),
                    otherwise.expr.cardinality().is_empty_only(),
                ) {
                    (true, false) => otherwise.expr.item_type(),
                    (false, true) => then.expr.item_type(),
                    _ => then.expr.item_type().common_supertype(otherwise.expr.item_type()),
                };
                StaticProperties {
                    cardinality: then.expr.cardinality().either(otherwise.expr.cardinality()),
                    item_type,
                    special: non_creative,
                    dependencies: deps,
                    methods: M::ITERATE | M::EVALUATE_ITEM | M::PROCESS,
                }
            }
            ExprKind::Arithmetic {
                op,
                lhs,
                rhs,
                calculator,
            } => {
                let card = if lhs.expr.cardinality() == C::EXACTLY_ONE && rhs.expr.cardinality() == C::EXACTLY_ONE {
                    C::EXACTLY_ONE
                } else {
                    C::ZERO_OR_ONE
                };
                single(card, ItemType::Atomic(arith::result_type(*op, *calculator)), deps)
            }
            ExprKind::ValueComparison { lhs, rhs, .. } => {
                let card = if lhs.expr.cardinality() == C::EXACTLY_ONE && rhs.expr.cardinality() == C::EXACTLY_ONE {
                    C::EXACTLY_ONE
                } else {
                    C::ZERO_OR_ONE
                };
                single(card, boolean, deps)
            }
            ExprKind::Logical { .. } => single(C::EXACTLY_ONE, boolean, deps),
            ExprKind::Call { function, args } => match function {
                BuiltinFunction::Not
                | BuiltinFunction::Exists
                | BuiltinFunction::Empty
                | BuiltinFunction::Boolean => single(C::EXACTLY_ONE, boolean, deps),
                BuiltinFunction::Count => single(C::EXACTLY_ONE, integer, deps),
                BuiltinFunction::ExactlyOne | BuiltinFunction::ZeroOrOne => {
                    let (arg_type, arg_special) = args
                        .first()
                        .map(|a| (a.expr.item_type(), a.expr.special()))
                        .unwrap_or((ItemType::AnyItem, S::empty()));
                    let card = if *function == BuiltinFunction::ExactlyOne {
                        C::EXACTLY_ONE
                    } else {
                        C::ZERO_OR_ONE
                    };
                    StaticProperties {
                        cardinality: card,
                        item_type: arg_type,
                        special: non_creative | (arg_special & (S::ORDERED_NODESET | S::PEER_NODESET)),
                        dependencies: deps,
                        methods: M::EVALUATE_ITEM,
                    }
                }
                BuiltinFunction::Data => {
                    let (card, item) = args
                        .first()
                        .map(|a| (a.expr.cardinality(), a.expr.item_type()))
                        .unwrap_or((C::ZERO_OR_MORE, ItemType::AnyItem));
                    let card = if item.is_atomic() { card } else { card | C::ZERO_OR_MORE };
                    StaticProperties {
                        cardinality: card,
                        item_type: ItemType::Atomic(item.atomized()),
                        special: non_creative,
                        dependencies: deps,
                        methods: M::ITERATE,
                    }
                }
                BuiltinFunction::Subsequence => {
                    let (card, item, special) = args
                        .first()
                        .map(|a| (a.expr.cardinality(), a.expr.item_type(), a.expr.special()))
                        .unwrap_or((C::ZERO_OR_MORE, ItemType::AnyItem, S::empty()));
                    StaticProperties {
                        cardinality: card | C::ALLOWS_ZERO,
                        item_type: item,
                        special: non_creative | (special & (S::ORDERED_NODESET | S::PEER_NODESET)),
                        dependencies: deps,
                        methods: M::ITERATE,
                    }
                }
            },
            ExprKind::Range { .. } => StaticProperties {
                cardinality: C::ZERO_OR_MORE,
                item_type: integer,
                special: non_creative,
                dependencies: deps,
                methods: M::ITERATE,
            },
            ExprKind::AxisStep { axis, test } => {
                let item_type = match test.kind() {
                    Some(k) => ItemType::Node(k),
                    None => ItemType::AnyNode,
                };
                let cardinality = match axis {
                    Axis::SelfAxis | Axis::Parent => C::ZERO_OR_ONE,
                    _ => C::ZERO_OR_MORE,
                };
                let mut special = S::NON_CREATIVE | S::ORDERED_NODESET;
                if matches!(axis, Axis::Child | Axis::Attribute | Axis::SelfAxis | Axis::Parent) {
                    special |= S::PEER_NODESET;
                }
                StaticProperties {
                    cardinality,
                    item_type,
                    special,
                    dependencies: D::CONTEXT_ITEM,
                    methods: M::ITERATE,
                }
            }
            ExprKind::Path { start, step } => {
                let s = start.expr.special();
                let step_special = step.expr.special();
                let step_axis = match &step.expr.kind {
                    ExprKind::AxisStep { axis, .. } => Some(*axis),
                    _ => None,
                };
                let start_ordered = s.contains(S::ORDERED_NODESET);
                let start_single = start.expr.cardinality().at_most_one();
                let start_peer = s.contains(S::PEER_NODESET);
                let mut special = non_creative;
                if start_ordered && step_special.contains(S::ORDERED_NODESET) {
                    if start_single {
                        special |= step_special & (S::ORDERED_NODESET | S::PEER_NODESET);
                    } else if start_peer
                        && matches!(
                            step_axis,
                            Some(Axis::Child | Axis::Attribute | Axis::SelfAxis | Axis::Descendant | Axis::DescendantOrSelf)
                        )
                    {
                        special |= S::ORDERED_NODESET;
                        if matches!(step_axis, Some(Axis::Child | Axis::Attribute | Axis::SelfAxis)) {
                            special |= S::PEER_NODESET;
                        }
                    }
                }
                StaticProperties {
                    cardinality: start.expr.cardinality().multiply(step.expr.cardinality()),
                    item_type: step.expr.item_type(),
                    special,
                    dependencies: deps,
                    methods: M::ITERATE,
                }
            }
            ExprKind::Filter { base, .. } => StaticProperties {
                cardinality: base.expr.cardinality() | C::ALLOWS_ZERO,
                item_type: base.expr.item_type(),
                special: non_creative | (base.expr.special() & (S::ORDERED_NODESET | S::PEER_NODESET)),
                dependencies: deps,
                methods: M::ITERATE,
            },
            ExprKind::Union { lhs, rhs } => StaticProperties {
                cardinality: lhs.expr.cardinality().sum(rhs.expr.cardinality()) | lhs.expr.cardinality().either(rhs.expr.cardinality()),
                item_type: lhs.expr.item_type().common_supertype(rhs.expr.item_type()),
                special: non_creative | S::ORDERED_NODESET,
                dependencies: deps,
                methods: M::ITERATE,
            },
            ExprKind::Atomize(operand) => {
                let item = operand.expr.item_type();
                let card = if item.is_atomic() {
                    operand.expr.cardinality()
                } else {
                    C::ZERO_OR_MORE
                };
                StaticProperties {
                    cardinality: card,
                    item_type: ItemType::Atomic(item.atomized()),
                    special: non_creative,
                    dependencies: deps,
                    methods: M::ITERATE | M::EVALUATE_ITEM,
                }
            }
            ExprKind::UntypedConvert { operand, target, .. } => {
                let item = match operand.expr.item_type() {
                    ItemType::Atomic(AtomicType::UntypedAtomic) => ItemType::Atomic(*target),
                    ItemType::Atomic(t) if !t.may_be_untyped() => ItemType::Atomic(t),
                    _ => ItemType::Atomic(AtomicType::AnyAtomic),
                };
                StaticProperties {
                    cardinality: operand.expr.cardinality(),
                    item_type: item,
                    special: non_creative,
                    dependencies: deps,
                    methods: M::ITERATE | M::EVALUATE_ITEM,
                }
            }
            ExprKind::Cast {
                operand,
                target,
                allows_empty,
            } => {
                let card = if *allows_empty && operand.expr.cardinality().allows_zero() {
                    C::ZERO_OR_ONE
                } else {
                    C::EXACTLY_ONE
                };
                single(card, ItemType::Atomic(*target), deps)
            }
            ExprKind::CardinalityCheck { operand, required } => {
                let narrowed = operand.expr.cardinality() & *required;
                StaticProperties {
                    cardinality: if narrowed.is_empty() { *required } else { narrowed },
                    item_type: operand.expr.item_type(),
                    special: operand.expr.special(),
                    dependencies: deps,
                    methods: M::ITERATE | M::EVALUATE_ITEM,
                }
            }
            ExprKind::ApplyRules { .. } => StaticProperties {
                cardinality: C::ZERO_OR_MORE,
                item_type: ItemType::AnyItem,
                special: S::empty(),
                dependencies: deps | D::RULES,
                methods: M::PROCESS,
            },
            ExprKind::NextMatch => StaticProperties {
                cardinality: C::ZERO_OR_MORE,
                item_type: ItemType::AnyItem,
                special: S::empty(),
                dependencies: D::CONTEXT_ITEM | D::RULES,
                methods: M::PROCESS,
            },
        }
    }

    pub(crate) fn static_type_error(&self, msg: impl Into<String>) -> Error {
        Error::static_error(ErrorCode::XPTY0004, msg).at(Some(&self.location))
    }
}
