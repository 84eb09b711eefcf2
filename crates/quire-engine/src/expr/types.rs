//! Built-in atomic types, item types and casting.
use super::props::Cardinality;
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::{NodeKind, XdmNode};
use crate::xdm::{ExpandedName, XdmAtomicValue, XdmItem};
use compact_str::CompactString;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    AnyAtomic,
    UntypedAtomic,
    String,
    AnyUri,
    Boolean,
    /// Union of the four numeric primitives.
    Numeric,
    Decimal,
    Integer,
    Float,
    Double,
}

static REGISTRY: OnceLock<HashMap<ExpandedName, AtomicType>> = OnceLock::new();

fn registry() -> &'static HashMap<ExpandedName, AtomicType> {
    REGISTRY.get_or_init(|| {
        AtomicType::ALL
            .iter()
            .map(|t| (ExpandedName::xs(t.local_name()), *t))
            .collect()
    })
}

impl AtomicType {
    pub const ALL: [AtomicType; 10] = [
        AtomicType::AnyAtomic,
        AtomicType::UntypedAtomic,
        AtomicType::String,
        AtomicType::AnyUri,
        AtomicType::Boolean,
        AtomicType::Numeric,
        AtomicType::Decimal,
        AtomicType::Integer,
        AtomicType::Float,
        AtomicType::Double,
    ];

    pub fn local_name(&self) -> &'static str {
        match self {
            AtomicType::AnyAtomic => "anyAtomicType",
            AtomicType::UntypedAtomic => "untypedAtomic",
            AtomicType::String => "string",
            AtomicType::AnyUri => "anyURI",
            AtomicType::Boolean => "boolean",
            AtomicType::Numeric => "numeric",
            AtomicType::Decimal => "decimal",
            AtomicType::Integer => "integer",
            AtomicType::Float => "float",
            AtomicType::Double => "double",
        }
    }

    pub fn name(&self) -> ExpandedName {
        ExpandedName::xs(self.local_name())
    }

    /// Look up a built-in type by expanded name.
    pub fn by_name(name: &ExpandedName) -> Option<AtomicType> {
        registry().get(name).copied()
    }

    pub fn parent(&self) -> Option<AtomicType> {
        match self {
            AtomicType::AnyAtomic => None,
            AtomicType::Integer => Some(AtomicType::Decimal),
            AtomicType::Decimal | AtomicType::Float | AtomicType::Double => Some(AtomicType::Numeric),
            _ => Some(AtomicType::AnyAtomic),
        }
    }

    /// Primitive type identity: `xs:integer` is a `xs:decimal`.
    pub fn primitive(&self) -> AtomicType {
        match self {
            AtomicType::Integer => AtomicType::Decimal,
            other => *other,
        }
    }

    pub fn is_subtype_of(&self, other: AtomicType) -> bool {
        let mut current = Some(*self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    pub fn is_numeric(&self) -> bool {
        self.is_subtype_of(AtomicType::Numeric)
    }

    /// Abstract types have no instances of their own and cannot be cast to.
    pub fn is_abstract(&self) -> bool {
        matches!(self, AtomicType::AnyAtomic | AtomicType::Numeric)
    }

    /// Values of this static type could be `xs:untypedAtomic` at run time.
    pub fn may_be_untyped(&self) -> bool {
        matches!(self, AtomicType::AnyAtomic | AtomicType::UntypedAtomic)
    }

    /// Statically known not to be numeric, even after untyped conversion.
    pub fn is_known_non_numeric(&self) -> bool {
        !self.is_numeric() && !self.may_be_untyped() && *self != AtomicType::Numeric
    }

    /// Nearest common supertype.
    pub fn common_supertype(self, other: AtomicType) -> AtomicType {
        let mut current = Some(self);
        while let Some(t) = current {
            if other.is_subtype_of(t) {
                return t;
            }
            current = t.parent();
        }
        AtomicType::AnyAtomic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    AnyItem,
    AnyNode,
    Node(NodeKind),
    Atomic(AtomicType),
}

impl ItemType {
    pub fn matches<N: XdmNode>(&self, item: &XdmItem<N>) -> bool {
        match (self, item) {
            (ItemType::AnyItem, _) => true,
            (ItemType::AnyNode, XdmItem::Node(_)) => true,
            (ItemType::Node(k), XdmItem::Node(n)) => n.kind() == *k,
            (ItemType::Atomic(t), XdmItem::Atomic(a)) => a.type_of().is_subtype_of(*t),
            _ => false,
        }
    }

    pub fn is_subtype_of(&self, other: ItemType) -> bool {
        match (self, other) {
            (_, ItemType::AnyItem) => true,
            (ItemType::AnyNode | ItemType::Node(_), ItemType::AnyNode) => true,
            (ItemType::Node(a), ItemType::Node(b)) => *a == b,
            (ItemType::Atomic(a), ItemType::Atomic(b)) => a.is_subtype_of(b),
            _ => false,
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, ItemType::Atomic(_))
    }

    /// Could an item of this type be a node?
    pub fn may_be_node(&self) -> bool {
        !self.is_atomic()
    }

    /// Static type of the result of atomizing items of this type.
    pub fn atomized(&self) -> AtomicType {
        match self {
            ItemType::Atomic(t) => *t,
            ItemType::Node(NodeKind::Comment | NodeKind::ProcessingInstruction) => AtomicType::String,
            ItemType::Node(_) => AtomicType::UntypedAtomic,
            ItemType::AnyItem | ItemType::AnyNode => AtomicType::AnyAtomic,
        }
    }

    pub fn common_supertype(self, other: ItemType) -> ItemType {
        match (self, other) {
            (a, b) if a == b => a,
            (ItemType::Atomic(a), ItemType::Atomic(b)) => ItemType::Atomic(a.common_supertype(b)),
            (ItemType::Node(_) | ItemType::AnyNode, ItemType::Node(_) | ItemType::AnyNode) => ItemType::AnyNode,
            _ => ItemType::AnyItem,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceType {
    pub item: ItemType,
    pub cardinality: Cardinality,
}

impl SequenceType {
    pub fn new(item: ItemType, cardinality: Cardinality) -> Self {
        Self { item, cardinality }
    }

    pub fn atomic(t: AtomicType, cardinality: Cardinality) -> Self {
        Self::new(ItemType::Atomic(t), cardinality)
    }
}

fn invalid_cast(value: &str, target: AtomicType) -> Error {
    Error::from_code(
        ErrorCode::FORG0001,
        format!("cannot cast '{value}' to xs:{}", target.local_name()),
    )
}

/// XML Schema lexical form of `xs:double` / `xs:float` (whitespace collapsed).
pub fn parse_double(s: &str) -> Option<f64> {
    let t = s.trim();
    match t {
        "INF" | "+INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    let valid = !t.is_empty()
        && t.chars().any(|c| c.is_ascii_digit())
        && t
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return None;
    }
    t.parse::<f64>().ok()
}

fn parse_decimal(s: &str) -> Option<f64> {
    let t = s.trim();
    let body = t.strip_prefix(['+', '-']).unwrap_or(t);
    let valid = body.chars().any(|c| c.is_ascii_digit())
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.matches('.').count() <= 1;
    if !valid {
        return None;
    }
    t.parse::<f64>().ok()
}

fn parse_integer(s: &str) -> Result<Option<i64>, Error> {
    let t = s.trim();
    let body = t.strip_prefix(['+', '-']).unwrap_or(t);
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }
    t.parse::<i64>()
        .map(Some)
        .map_err(|_| Error::from_code(ErrorCode::FOAR0002, format!("integer '{t}' out of range")))
}

fn float_to_integer(d: f64) -> Result<i64, Error> {
    if !d.is_finite() {
        return Err(invalid_cast(&XdmAtomicValue::Double(d).string_value(), AtomicType::Integer));
    }
    let truncated = d.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(Error::from_code(ErrorCode::FOAR0002, "integer overflow in cast"));
    }
    Ok(truncated as i64)
}

fn numeric_as_f64(v: &XdmAtomicValue) -> Option<f64> {
    match v {
        XdmAtomicValue::Integer(i) => Some(*i as f64),
        XdmAtomicValue::Decimal(d) | XdmAtomicValue::Double(d) => Some(*d),
        XdmAtomicValue::Float(f) => Some(f64::from(*f)),
        XdmAtomicValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Cast an atomic value. Casting to `xs:numeric` yields `xs:double` for
/// non-numeric input and is the identity for numbers; `xs:anyAtomicType`
/// is not a cast target.
pub fn cast_atomic(value: &XdmAtomicValue, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let source = value.type_of();
    if target != AtomicType::AnyAtomic && source.is_subtype_of(target) {
        return Ok(value.clone());
    }
    let lexical = matches!(value, V::String(_) | V::UntypedAtomic(_));
    let s = value.string_value();
    let not_castable = || {
        Error::from_code(
            ErrorCode::XPTY0004,
            format!("cannot cast xs:{} to xs:{}", source.local_name(), target.local_name()),
        )
    };
    Ok(match target {
        AtomicType::AnyAtomic => {
            return Err(Error::static_error(
                ErrorCode::XPST0051,
                "cannot cast to abstract type xs:anyAtomicType",
            ));
        }
        AtomicType::String => V::String(s),
        AtomicType::UntypedAtomic => V::UntypedAtomic(s),
        AtomicType::AnyUri => {
            if !lexical {
                return Err(not_castable());
            }
            V::AnyUri(CompactString::from(s.trim()))
        }
        AtomicType::Boolean => match value {
            V::String(_) | V::UntypedAtomic(_) => match s.trim() {
                "true" | "1" => V::Boolean(true),
                "false" | "0" => V::Boolean(false),
                _ => return Err(invalid_cast(&s, target)),
            },
            _ => match numeric_as_f64(value) {
                Some(d) => V::Boolean(d != 0.0 && !d.is_nan()),
                None => return Err(not_castable()),
            },
        },
        AtomicType::Double | AtomicType::Numeric => {
            if lexical {
                V::Double(parse_double(&s).ok_or_else(|| invalid_cast(&s, target))?)
            } else {
                V::Double(numeric_as_f64(value).ok_or_else(not_castable)?)
            }
        }
        AtomicType::Float => {
            if lexical {
                V::Float(parse_double(&s).ok_or_else(|| invalid_cast(&s, target))? as f32)
            } else {
                V::Float(numeric_as_f64(value).ok_or_else(not_castable)? as f32)
            }
        }
        AtomicType::Decimal => {
            let d = if lexical {
                parse_decimal(&s).ok_or_else(|| invalid_cast(&s, target))?
            } else {
                numeric_as_f64(value).ok_or_else(not_castable)?
            };
            if !d.is_finite() {
                return Err(invalid_cast(&s, target));
            }
            V::Decimal(d)
        }
        AtomicType::Integer => {
            if lexical {
                V::Integer(parse_integer(&s)?.ok_or_else(|| invalid_cast(&s, target))?)
            } else {
                V::Integer(float_to_integer(numeric_as_f64(value).ok_or_else(not_castable)?)?)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtype_chain() {
        assert!(AtomicType::Integer.is_subtype_of(AtomicType::Decimal));
        assert!(AtomicType::Integer.is_subtype_of(AtomicType::Numeric));
        assert!(AtomicType::Integer.is_subtype_of(AtomicType::AnyAtomic));
        assert!(!AtomicType::Double.is_subtype_of(AtomicType::Decimal));
        assert_eq!(AtomicType::Integer.primitive(), AtomicType::Decimal);
        assert_eq!(AtomicType::Integer.common_supertype(AtomicType::Double), AtomicType::Numeric);
    }

    #[test]
    fn registry_resolves_xs_names() {
        assert_eq!(AtomicType::by_name(&ExpandedName::xs("anyURI")), Some(AtomicType::AnyUri));
        assert_eq!(AtomicType::by_name(&ExpandedName::local("integer")), None);
    }

    #[test]
    fn double_lexical_space() {
        assert_eq!(parse_double(" 1e3 "), Some(1000.0));
        assert_eq!(parse_double("-INF"), Some(f64::NEG_INFINITY));
        assert!(parse_double("NaN").is_some_and(f64::is_nan));
        assert_eq!(parse_double("inf"), None);
        assert_eq!(parse_double("infinity"), None);
        assert_eq!(parse_double(""), None);
    }

    #[test]
    fn casts() {
        let v = cast_atomic(&XdmAtomicValue::untyped(" 42 "), AtomicType::Integer).expect("castable");
        assert_eq!(v, XdmAtomicValue::Integer(42));
        let err = cast_atomic(&XdmAtomicValue::string("4.2"), AtomicType::Integer).expect_err("not an integer");
        assert_eq!(err.code.local, "FORG0001");
        let err = cast_atomic(&XdmAtomicValue::Boolean(true), AtomicType::AnyUri).expect_err("not castable");
        assert_eq!(err.code.local, "XPTY0004");
        assert_eq!(
            cast_atomic(&XdmAtomicValue::Double(2.9), AtomicType::Integer).expect("castable"),
            XdmAtomicValue::Integer(2)
        );
    }

    #[test]
    fn cast_to_any_atomic_is_refused() {
        let err = cast_atomic(&XdmAtomicValue::string("1"), AtomicType::AnyAtomic).expect_err("abstract");
        assert_eq!(err.code.local, "XPST0051");
        assert!(err.is_static());
    }
}
