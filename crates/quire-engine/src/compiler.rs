//! Building and compiling expression trees and rule sets.
//!
//! Hosts construct trees through [`ExpressionBuilder`], which tracks the
//! source location and hands out variable slots. [`compile`] runs the
//! simplify, type-check and optimize phases in that order and freezes the
//! result into a shareable [`CompiledExpression`]. [`RuleSetBuilder`] does the
//! same for rule actions and patterns and produces an [`Executable`].
use crate::engine::runtime::{Error, ErrorCode, Location, StaticContext};
use crate::expr::{
    ArithOp, Axis, BindingAllocator, BoolOp, BuiltinFunction, Calculator, Cardinality, CompOp, ExprKind, Expression,
    NodeTest, Operand, OperandRole, VariableBinding, AtomicType,
};
use crate::pattern::Pattern;
use crate::rules::{Mode, ModeName, ModeSet};
use crate::xdm::{ExpandedName, XdmAtomicValue};
use std::sync::{Arc, OnceLock};
use tracing::debug;

static DEFAULT_STATIC_CONTEXT: OnceLock<StaticContext> = OnceLock::new();

fn default_static_ctx() -> &'static StaticContext {
    DEFAULT_STATIC_CONTEXT.get_or_init(StaticContext::default)
}

/// A compiled, immutable expression. Cheap to clone and safe to evaluate
/// from several threads at once, each with its own dynamic context.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    root: Arc<Expression>,
    static_ctx: Arc<StaticContext>,
    frame_size: usize,
}

impl CompiledExpression {
    pub fn root(&self) -> &Expression {
        &self.root
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_ctx
    }

    /// Slots a dynamic context needs to evaluate this expression.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

/// Compile `root` against `static_ctx`. `frame_size` is the number of local
/// slots the tree's bindings occupy.
pub fn compile(root: Expression, frame_size: usize, static_ctx: &StaticContext) -> Result<CompiledExpression, Error> {
    let root = run_phases(root, static_ctx)?;
    Ok(CompiledExpression {
        root: Arc::new(root),
        static_ctx: Arc::new(static_ctx.clone()),
        frame_size,
    })
}

/// Compile with a lazily initialized default static context.
pub fn compile_default(root: Expression, frame_size: usize) -> Result<CompiledExpression, Error> {
    compile(root, frame_size, default_static_ctx())
}

fn run_phases(root: Expression, static_ctx: &StaticContext) -> Result<Expression, Error> {
    let simplified = root.simplify();
    debug!(phase = "simplify", cardinality = ?simplified.cardinality(), "compile phase done");
    let checked = simplified.type_check(static_ctx)?;
    debug!(phase = "type_check", item_type = ?checked.item_type(), "compile phase done");
    let optimized = checked.optimize(static_ctx)?;
    debug!(phase = "optimize", level = ?static_ctx.optimization, "compile phase done");
    Ok(optimized)
}

/// Constructs expression trees. Every node gets the location last set with
/// [`at`](Self::at); variables get slots from one allocator, so the builder's
/// [`frame_size`](Self::frame_size) covers everything it produced.
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    bindings: BindingAllocator,
    location: Location,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        let module = self.location.module.take();
        self.location = Location::new(line, column);
        self.location.module = module;
        self
    }

    pub fn in_module(&mut self, module: &str) -> &mut Self {
        self.location.module = Some(Arc::from(module));
        self
    }

    fn node(&self, kind: ExprKind) -> Expression {
        Expression::new(kind, self.location.clone())
    }

    pub fn frame_size(&self) -> usize {
        self.bindings.frame_size()
    }

    /// Allocator shared by everything this builder produces, for `copy`.
    pub fn allocator(&mut self) -> &mut BindingAllocator {
        &mut self.bindings
    }

    pub fn empty(&self) -> Expression {
        self.literal(Vec::new())
    }

    pub fn literal(&self, values: Vec<XdmAtomicValue>) -> Expression {
        Expression::literal(values, self.location.clone())
    }

    pub fn integer(&self, value: i64) -> Expression {
        self.literal(vec![XdmAtomicValue::Integer(value)])
    }

    pub fn double(&self, value: f64) -> Expression {
        self.literal(vec![XdmAtomicValue::Double(value)])
    }

    pub fn string(&self, value: &str) -> Expression {
        self.literal(vec![XdmAtomicValue::string(value)])
    }

    pub fn untyped(&self, value: &str) -> Expression {
        self.literal(vec![XdmAtomicValue::untyped(value)])
    }

    pub fn boolean(&self, value: bool) -> Expression {
        self.literal(vec![XdmAtomicValue::Boolean(value)])
    }

    pub fn context_item(&self) -> Expression {
        self.node(ExprKind::ContextItem)
    }

    pub fn position(&self) -> Expression {
        self.node(ExprKind::ContextPosition)
    }

    pub fn last(&self) -> Expression {
        self.node(ExprKind::ContextSize)
    }

    pub fn declare(&mut self, name: &str) -> VariableBinding {
        self.bindings.declare(ExpandedName::local(name))
    }

    pub fn var(&self, binding: &VariableBinding) -> Expression {
        self.node(ExprKind::LocalVariable {
            binding: binding.clone(),
            ty: None,
        })
    }

    pub fn global(&self, name: &str) -> Expression {
        self.node(ExprKind::GlobalVariable {
            name: ExpandedName::local(name),
            ty: None,
        })
    }

    pub fn let_(&self, binding: VariableBinding, value: Expression, body: Expression) -> Expression {
        self.node(ExprKind::Let {
            binding,
            value: Operand::new(OperandRole::NAVIGATE, value),
            body: Operand::new(OperandRole::NAVIGATE, body),
        })
    }

    pub fn for_each(&self, binding: VariableBinding, input: Expression, body: Expression) -> Expression {
        self.node(ExprKind::For {
            binding,
            input: Operand::new(OperandRole::NAVIGATE, input),
            body: Operand::new(OperandRole::LOOP_BODY, body),
        })
    }

    pub fn block(&self, items: Vec<Expression>) -> Expression {
        self.node(ExprKind::Block(
            items
                .into_iter()
                .map(|e| Operand::new(OperandRole::NAVIGATE, e))
                .collect(),
        ))
    }

    pub fn if_(&self, condition: Expression, then: Expression, otherwise: Expression) -> Expression {
        self.node(ExprKind::If {
            condition: Operand::new(OperandRole::NAVIGATE, condition),
            then: Operand::new(OperandRole::NAVIGATE, then),
            otherwise: Operand::new(OperandRole::NAVIGATE, otherwise),
        })
    }

    pub fn arith(&self, op: ArithOp, lhs: Expression, rhs: Expression) -> Expression {
        self.node(ExprKind::Arithmetic {
            op,
            lhs: Operand::new(OperandRole::ATOMIC, lhs),
            rhs: Operand::new(OperandRole::ATOMIC, rhs),
            calculator: Calculator::Generic,
        })
    }

    pub fn add(&self, lhs: Expression, rhs: Expression) -> Expression {
        self.arith(ArithOp::Add, lhs, rhs)
    }

    pub fn compare(&self, op: CompOp, lhs: Expression, rhs: Expression) -> Expression {
        self.node(ExprKind::ValueComparison {
            op,
            lhs: Operand::new(OperandRole::ATOMIC, lhs),
            rhs: Operand::new(OperandRole::ATOMIC, rhs),
        })
    }

    fn logical(&self, op: BoolOp, lhs: Expression, rhs: Expression) -> Expression {
        self.node(ExprKind::Logical {
            op,
            lhs: Operand::new(OperandRole::NAVIGATE, lhs),
            rhs: Operand::new(OperandRole::NAVIGATE, rhs),
        })
    }

    pub fn and(&self, lhs: Expression, rhs: Expression) -> Expression {
        self.logical(BoolOp::And, lhs, rhs)
    }

    pub fn or(&self, lhs: Expression, rhs: Expression) -> Expression {
        self.logical(BoolOp::Or, lhs, rhs)
    }

    /// Call a built-in function. A wrong argument count is `err:XPST0017`.
    pub fn call(&self, function: BuiltinFunction, args: Vec<Expression>) -> Result<Expression, Error> {
        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            return Err(Error::static_error(
                ErrorCode::XPST0017,
                format!(
                    "{}() takes {min} to {max} arguments, {} supplied",
                    function.local_name(),
                    args.len()
                ),
            )
            .at(Some(&self.location)));
        }
        let args = args
            .into_iter()
            .enumerate()
            .map(|(i, e)| Operand::new(function.arg_role(i), e))
            .collect();
        Ok(self.node(ExprKind::Call { function, args }))
    }

    pub fn step(&self, axis: Axis, test: NodeTest) -> Expression {
        self.node(ExprKind::AxisStep { axis, test })
    }

    /// `child::local`
    pub fn child(&self, local: &str) -> Expression {
        self.step(Axis::Child, NodeTest::element(local))
    }

    /// `attribute::local`
    pub fn attribute(&self, local: &str) -> Expression {
        self.step(Axis::Attribute, NodeTest::attribute(local))
    }

    /// `start/step`; `step` is evaluated once per node of `start`.
    pub fn path(&self, start: Expression, step: Expression) -> Expression {
        self.node(ExprKind::Path {
            start: Operand::new(OperandRole::NAVIGATE, start),
            step: Operand::new(OperandRole::FOCUS_CONTROLLED | OperandRole::REPEATED, step),
        })
    }

    pub fn filter(&self, base: Expression, predicate: Expression) -> Expression {
        self.node(ExprKind::Filter {
            base: Operand::new(OperandRole::NAVIGATE, base),
            predicate: Operand::new(OperandRole::PREDICATE, predicate),
        })
    }

    pub fn union(&self, lhs: Expression, rhs: Expression) -> Expression {
        self.node(ExprKind::Union {
            lhs: Operand::new(OperandRole::NAVIGATE, lhs),
            rhs: Operand::new(OperandRole::NAVIGATE, rhs),
        })
    }

    pub fn range(&self, lo: Expression, hi: Expression) -> Expression {
        self.node(ExprKind::Range {
            lo: Operand::new(OperandRole::ATOMIC, lo),
            hi: Operand::new(OperandRole::ATOMIC, hi),
        })
    }

    pub fn atomize(&self, operand: Expression) -> Expression {
        self.node(ExprKind::Atomize(Operand::new(OperandRole::NAVIGATE, operand)))
    }

    /// `operand cast as target` (with `?` when `allows_empty`).
    pub fn cast(&self, operand: Expression, target: AtomicType, allows_empty: bool) -> Expression {
        self.node(ExprKind::Cast {
            operand: Operand::new(OperandRole::ATOMIC, operand),
            target,
            allows_empty,
        })
    }

    pub fn check_cardinality(&self, operand: Expression, required: Cardinality) -> Expression {
        self.node(ExprKind::CardinalityCheck {
            operand: Operand::new(OperandRole::NAVIGATE, operand),
            required,
        })
    }

    pub fn apply_rules(&self, select: Expression, mode: ModeName) -> Expression {
        self.node(ExprKind::ApplyRules {
            select: Operand::new(OperandRole::NAVIGATE, select),
            mode,
        })
    }

    pub fn next_match(&self) -> Expression {
        self.node(ExprKind::NextMatch)
    }

    pub fn compile(&self, root: Expression, static_ctx: &StaticContext) -> Result<CompiledExpression, Error> {
        compile(root, self.frame_size(), static_ctx)
    }
}

/// Rule tables frozen for execution, shared read-only between evaluations.
#[derive(Debug, Clone)]
pub struct Executable {
    modes: Arc<ModeSet>,
    static_ctx: Arc<StaticContext>,
}

impl Executable {
    pub fn modes(&self) -> &Arc<ModeSet> {
        &self.modes
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_ctx
    }

    pub fn frame_size(&self) -> usize {
        self.modes.frame_size()
    }
}

/// Collects rules mode by mode and compiles their actions.
#[derive(Debug)]
pub struct RuleSetBuilder {
    exprs: ExpressionBuilder,
    modes: ModeSet,
    static_ctx: StaticContext,
}

impl Default for RuleSetBuilder {
    fn default() -> Self {
        Self::new(StaticContext::default())
    }
}

impl RuleSetBuilder {
    pub fn new(static_ctx: StaticContext) -> Self {
        Self {
            exprs: ExpressionBuilder::new(),
            modes: ModeSet::new(),
            static_ctx,
        }
    }

    /// Builder for actions and predicates; shares the rule set's slot allocator.
    pub fn exprs(&mut self) -> &mut ExpressionBuilder {
        &mut self.exprs
    }

    /// The mode named `name`, created with default settings on first use.
    pub fn configure_mode(&mut self, name: &ModeName) -> &mut Mode {
        self.modes.mode_mut(name)
    }

    /// Compile `action`, type-check `pattern` and add the rule to `mode`.
    /// Returns the indices of the rules added (several for a split union).
    pub fn add_rule(
        &mut self,
        mode: &ModeName,
        pattern: Pattern,
        action: Expression,
        precedence: i32,
        priority: Option<f64>,
    ) -> Result<Vec<usize>, Error> {
        let pattern = pattern.type_check(&self.static_ctx)?;
        let action = Arc::new(run_phases(action, &self.static_ctx)?);
        let added = self.modes.mode_mut(mode).add_rule(pattern, action, precedence, priority);
        debug!(mode = %mode, precedence, ?priority, rules = added.len(), "rule added");
        Ok(added)
    }

    pub fn build(mut self) -> Executable {
        self.modes.set_frame_size(self.exprs.frame_size());
        self.modes.compute_rankings();
        Executable {
            modes: Arc::new(self.modes),
            static_ctx: Arc::new(self.static_ctx),
        }
    }
}
