use crate::engine::sink::OutputSink;
use crate::expr::props::Cardinality;
use crate::expr::types::{AtomicType, ItemType, SequenceType};
use crate::rules::{CurrentRule, ModeSet};
use crate::xdm::{ExpandedName, SequenceValue, XdmItem};
use core::fmt;
use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

pub use crate::consts::ERR_NS;

/// Error codes emitted by the engine.
///
/// W3C codes live in [`ERR_NS`]; `QRIN0001` (internal invariant violation)
/// lives in the engine's own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow
    FOER0000, // unidentified error
    FORG0001, // invalid value for cast
    FORG0003, // zero-or-one called with more than one item
    FORG0004, // one-or-more called with empty sequence
    FORG0005, // exactly-one violated
    FORG0006, // invalid argument type (e.g. EBV of a multi-item sequence)
    XPTY0004, // type error
    XPTY0018, // path result mixes nodes and atomic values
    XPTY0019, // path step applied to a non-node
    XPTY0020, // axis step with non-node context item
    XPDY0002, // focus component undefined
    XPDY0050, // no output destination available
    XPST0008, // undeclared variable
    XPST0017, // wrong number of arguments
    XPST0051, // unknown atomic type name
    XTDE0555, // no rule matched and the mode says fail
    XTDE0560, // next-match without a current rule
    QRIN0001, // internal error
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOAR0002 => "FOAR0002",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0003 => "FORG0003",
            ErrorCode::FORG0004 => "FORG0004",
            ErrorCode::FORG0005 => "FORG0005",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0018 => "XPTY0018",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPST0051 => "XPST0051",
            ErrorCode::XTDE0555 => "XTDE0555",
            ErrorCode::XTDE0560 => "XTDE0560",
            ErrorCode::QRIN0001 => "QRIN0001",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// QName of this code; internal codes use the engine namespace.
    pub fn qname(&self) -> ExpandedName {
        let ns = match self {
            ErrorCode::QRIN0001 => crate::consts::QUIRE_ERR_NS,
            _ => ERR_NS,
        };
        ExpandedName::new(Some(ns.to_string()), self.as_str())
    }

    pub fn from_code(s: &str) -> Self {
        use ErrorCode::*;
        match s.strip_prefix("err:").unwrap_or(s) {
            "FOAR0001" => FOAR0001,
            "FOAR0002" => FOAR0002,
            "FOER0000" => FOER0000,
            "FORG0001" => FORG0001,
            "FORG0003" => FORG0003,
            "FORG0004" => FORG0004,
            "FORG0005" => FORG0005,
            "FORG0006" => FORG0006,
            "XPTY0004" => XPTY0004,
            "XPTY0018" => XPTY0018,
            "XPTY0019" => XPTY0019,
            "XPTY0020" => XPTY0020,
            "XPDY0002" => XPDY0002,
            "XPDY0050" => XPDY0050,
            "XPST0008" => XPST0008,
            "XPST0017" => XPST0017,
            "XPST0051" => XPST0051,
            "XTDE0555" => XTDE0555,
            "XTDE0560" => XTDE0560,
            "QRIN0001" => QRIN0001,
            _ => Unknown,
        }
    }

    /// Static codes are detected by analysis; everything else is raised while running.
    fn default_kind(&self) -> ErrorKind {
        match self {
            ErrorCode::XPST0008 | ErrorCode::XPST0017 | ErrorCode::XPST0051 => ErrorKind::Static,
            ErrorCode::QRIN0001 => ErrorKind::Internal,
            _ => ErrorKind::Dynamic,
        }
    }
}

/// When an error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Raised during simplify / type_check / optimize.
    Static,
    /// Raised while evaluating.
    Dynamic,
    /// A broken engine invariant (e.g. a variable missing from a rebinding map).
    Internal,
}

/// Source position attached to expressions and errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub module: Option<Arc<str>>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            module: None,
            line,
            column,
        }
    }

    pub fn with_module(mut self, module: impl Into<Arc<str>>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.module.is_none() && self.line == 0 && self.column == 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(m) => write!(f, "{m}:{}:{}", self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ExpandedName,
    pub message: String,
    pub kind: ErrorKind,
    pub location: Option<Location>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new_qname(code: ExpandedName, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            kind,
            location: None,
            source: None,
        }
    }

    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new_qname(code.qname(), code.default_kind(), msg)
    }

    /// Same code, reported as detected during static analysis.
    pub fn static_error(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new_qname(code.qname(), ErrorKind::Static, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::QRIN0001, msg)
    }

    /// Attach a location unless one is already present.
    pub fn at(mut self, location: Option<&Location>) -> Self {
        if self.location.is_none() {
            self.location = location.filter(|l| !l.is_unknown()).cloned();
        }
        self
    }

    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn is_static(&self) -> bool {
        self.kind == ErrorKind::Static
    }

    pub fn code_enum(&self) -> ErrorCode {
        match self.code.ns_uri.as_deref() {
            Some(ERR_NS) | Some(crate::consts::QUIRE_ERR_NS) => ErrorCode::from_code(&self.code.local),
            _ => ErrorCode::Unknown,
        }
    }

    /// `err:LOCAL` for W3C codes, `Q{ns}local` otherwise.
    pub fn format_code(&self) -> String {
        match self.code.ns_uri.as_deref() {
            Some(ERR_NS) => format!("err:{}", self.code.local),
            _ => self.code.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())?;
        if let Some(loc) = &self.location {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}

/// How `xs:untypedAtomic` operands of arithmetic are converted to numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericConversion {
    /// Invalid lexical forms raise `err:FORG0001`.
    #[default]
    Strict,
    /// Invalid lexical forms become `NaN` (XPath 1.0 compatible).
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OptimizationLevel {
    /// simplify and type_check only.
    None,
    /// Adds local rewrites that do not move subexpressions between scopes.
    Basic,
    /// All rewrites including loop-invariant predicate hoisting.
    #[default]
    Full,
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceBindings {
    pub by_prefix: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct StaticContext {
    pub base_uri: Option<String>,
    pub namespaces: NamespaceBindings,
    pub global_variables: HashMap<ExpandedName, SequenceType>,
    pub numeric_conversion: NumericConversion,
    pub optimization: OptimizationLevel,
}

impl Default for StaticContext {
    fn default() -> Self {
        let mut ns = NamespaceBindings::default();
        ns.by_prefix
            .insert("xml".to_string(), crate::consts::XML_URI.to_string());
        ns.by_prefix
            .insert("xs".to_string(), crate::consts::XS.to_string());
        Self {
            base_uri: None,
            namespaces: ns,
            global_variables: HashMap::new(),
            numeric_conversion: NumericConversion::default(),
            optimization: OptimizationLevel::default(),
        }
    }
}

impl StaticContext {
    /// Resolve a lexical type name such as `xs:integer` to a built-in atomic type.
    pub fn resolve_atomic_type(&self, lexical: &str) -> Result<AtomicType, Error> {
        let (ns, local) = match lexical.split_once(':') {
            Some((prefix, local)) => {
                let ns = self.namespaces.by_prefix.get(prefix).ok_or_else(|| {
                    Error::static_error(ErrorCode::XPST0051, format!("unbound prefix in type name '{lexical}'"))
                })?;
                (Some(ns.as_str()), local)
            }
            None => (None, lexical),
        };
        let name = ExpandedName::new(ns.map(str::to_string), local);
        AtomicType::by_name(&name)
            .ok_or_else(|| Error::static_error(ErrorCode::XPST0051, format!("unknown atomic type '{lexical}'")))
    }

    pub fn global_type(&self, name: &ExpandedName) -> Option<&SequenceType> {
        self.global_variables.get(name)
    }
}

/// Builder for [`StaticContext`]. The reserved `xml` prefix cannot be rebound.
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: StaticContext::default(),
        }
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" {
            return self;
        }
        self.ctx.namespaces.by_prefix.insert(p, uri.into());
        self
    }

    /// Declare a global variable with an unknown type (`item()*`).
    pub fn with_variable(self, name: ExpandedName) -> Self {
        self.with_typed_variable(name, SequenceType::new(ItemType::AnyItem, Cardinality::ZERO_OR_MORE))
    }

    pub fn with_typed_variable(mut self, name: ExpandedName, ty: SequenceType) -> Self {
        self.ctx.global_variables.insert(name, ty);
        self
    }

    pub fn with_numeric_conversion(mut self, mode: NumericConversion) -> Self {
        self.ctx.numeric_conversion = mode;
        self
    }

    pub fn with_optimization(mut self, level: OptimizationLevel) -> Self {
        self.ctx.optimization = level;
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

/// Context item together with its position and the size of the sequence it came from.
#[derive(Debug, Clone)]
pub struct Focus<N> {
    pub item: XdmItem<N>,
    /// 1-based.
    pub position: usize,
    /// `None` when the producing iterator cannot tell its length in advance.
    pub size: Option<usize>,
}

type SharedSink<N> = Rc<RefCell<dyn OutputSink<N>>>;

/// Per-evaluation state: focus, local variable slots, global values, the
/// output sink and the active rule tables.
///
/// A context is single-threaded. Concurrent evaluations each build their own
/// context; compiled expressions and rule tables are shared read-only.
pub struct DynamicContext<N> {
    focus: Option<Focus<N>>,
    frame: Rc<Vec<Option<SequenceValue<N>>>>,
    globals: Rc<HashMap<ExpandedName, SequenceValue<N>>>,
    sink: Option<SharedSink<N>>,
    rules: Option<Arc<ModeSet>>,
    current_rule: Option<CurrentRule>,
}

impl<N> Clone for DynamicContext<N>
where
    N: Clone,
{
    fn clone(&self) -> Self {
        Self {
            focus: self.focus.clone(),
            frame: Rc::clone(&self.frame),
            globals: Rc::clone(&self.globals),
            sink: self.sink.clone(),
            rules: self.rules.clone(),
            current_rule: self.current_rule.clone(),
        }
    }
}

impl<N> Default for DynamicContext<N> {
    fn default() -> Self {
        Self {
            focus: None,
            frame: Rc::new(Vec::new()),
            globals: Rc::new(HashMap::new()),
            sink: None,
            rules: None,
            current_rule: None,
        }
    }
}

impl<N: Clone> DynamicContext<N> {
    pub fn focus(&self) -> Option<&Focus<N>> {
        self.focus.as_ref()
    }

    pub fn context_item(&self) -> Option<&XdmItem<N>> {
        self.focus.as_ref().map(|f| &f.item)
    }

    pub fn get_context_item(&self) -> Result<&XdmItem<N>, Error> {
        self.context_item()
            .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is undefined"))
    }

    pub fn position(&self) -> Result<usize, Error> {
        self.focus
            .as_ref()
            .map(|f| f.position)
            .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context position is undefined"))
    }

    pub fn size(&self) -> Result<usize, Error> {
        self.focus
            .as_ref()
            .and_then(|f| f.size)
            .ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context size is undefined"))
    }

    /// Same state with a new focus; slots and sink are shared.
    pub fn with_focus(&self, item: XdmItem<N>, position: usize, size: Option<usize>) -> Self {
        let mut ctx = self.clone();
        ctx.focus = Some(Focus { item, position, size });
        ctx
    }

    pub fn without_focus(&self) -> Self {
        let mut ctx = self.clone();
        ctx.focus = None;
        ctx
    }

    /// Fresh slot frame of `frame_size` slots and no focus, sharing globals,
    /// sink and rule tables.
    pub fn new_child_context(&self, frame_size: usize) -> Self {
        Self {
            focus: None,
            frame: Rc::new(vec![None; frame_size]),
            globals: Rc::clone(&self.globals),
            sink: self.sink.clone(),
            rules: self.rules.clone(),
            current_rule: self.current_rule.clone(),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame.len()
    }

    pub fn ensure_frame_size(&mut self, frame_size: usize) {
        if self.frame.len() < frame_size {
            Rc::make_mut(&mut self.frame).resize(frame_size, None);
        }
    }

    pub fn get_local_variable(&self, slot: usize) -> Result<SequenceValue<N>, Error> {
        self.frame
            .get(slot)
            .and_then(Option::clone)
            .ok_or_else(|| Error::internal(format!("local slot {slot} read before assignment")))
    }

    /// Assign a slot. The frame is copied if another context still shares it,
    /// so outer bindings stay visible to anyone holding the old frame.
    pub fn set_local_variable(&mut self, slot: usize, value: SequenceValue<N>) {
        let frame = Rc::make_mut(&mut self.frame);
        if frame.len() <= slot {
            frame.resize(slot + 1, None);
        }
        frame[slot] = Some(value);
    }

    pub fn global_variable(&self, name: &ExpandedName) -> Result<&SequenceValue<N>, Error> {
        self.globals
            .get(name)
            .ok_or_else(|| Error::from_code(ErrorCode::XPST0008, format!("no value supplied for global variable ${name}")))
    }

    pub fn has_output_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn get_output_sink(&self) -> Result<RefMut<'_, dyn OutputSink<N> + 'static>, Error> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| Error::from_code(ErrorCode::XPDY0050, "no output destination is available"))?;
        sink.try_borrow_mut()
            .map_err(|_| Error::internal("output destination is already in use"))
    }

    pub fn with_sink(&self, sink: SharedSink<N>) -> Self {
        let mut ctx = self.clone();
        ctx.sink = Some(sink);
        ctx
    }

    pub fn rules(&self) -> Option<&Arc<ModeSet>> {
        self.rules.as_ref()
    }

    pub fn with_rules(&self, rules: Arc<ModeSet>) -> Self {
        let mut ctx = self.clone();
        ctx.rules = Some(rules);
        ctx
    }

    pub fn current_rule(&self) -> Option<&CurrentRule> {
        self.current_rule.as_ref()
    }

    pub(crate) fn set_current_rule(&mut self, rule: Option<CurrentRule>) {
        self.current_rule = rule;
    }
}

pub struct DynamicContextBuilder<N> {
    ctx: DynamicContext<N>,
    globals: HashMap<ExpandedName, SequenceValue<N>>,
}

impl<N: Clone> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Clone> DynamicContextBuilder<N> {
    pub fn new() -> Self {
        Self {
            ctx: DynamicContext::default(),
            globals: HashMap::new(),
        }
    }

    /// Context item with position 1 and size 1.
    pub fn with_context_item(mut self, item: impl Into<XdmItem<N>>) -> Self {
        self.ctx.focus = Some(Focus {
            item: item.into(),
            position: 1,
            size: Some(1),
        });
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: impl Into<SequenceValue<N>>) -> Self {
        self.globals.insert(name, value.into());
        self
    }

    pub fn with_sink(mut self, sink: SharedSink<N>) -> Self {
        self.ctx.sink = Some(sink);
        self
    }

    pub fn with_rules(mut self, rules: Arc<ModeSet>) -> Self {
        self.ctx.rules = Some(rules);
        self
    }

    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.ctx.ensure_frame_size(frame_size);
        self
    }

    pub fn build(mut self) -> DynamicContext<N> {
        self.ctx.globals = Rc::new(self.globals);
        self.ctx
    }
}
