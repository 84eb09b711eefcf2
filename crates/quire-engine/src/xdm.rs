//! Item and sequence model.
//!
//! Atomic values and nodes are uniform [`XdmItem`]s. A [`SequenceValue`] is an
//! immutable, cheaply clonable, already-flattened list of items; lazily
//! produced sequences are represented by [`crate::iter::SequenceIterator`]s.
use crate::engine::runtime::Error;
use crate::expr::types::AtomicType;
use compact_str::{CompactString, format_compact};
use core::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self {
            ns_uri,
            local: local.into(),
        }
    }

    /// Name without a namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new(None, local)
    }

    /// Name in the XML Schema namespace (`xs:`).
    pub fn xs(local: impl Into<String>) -> Self {
        Self::new(Some(crate::consts::XS.to_string()), local)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Atomic values supported by the evaluation core.
///
/// Equality (`PartialEq`) is identity by type and value: `Integer(1)` and
/// `Decimal(1.0)` are different values even though a value comparison treats
/// them as equal.
#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    Boolean(bool),
    String(CompactString),
    UntypedAtomic(CompactString),
    AnyUri(CompactString),
    Integer(i64),
    Decimal(f64),
    Float(f32),
    Double(f64),
}

impl XdmAtomicValue {
    pub fn string(s: impl Into<CompactString>) -> Self {
        XdmAtomicValue::String(s.into())
    }

    pub fn untyped(s: impl Into<CompactString>) -> Self {
        XdmAtomicValue::UntypedAtomic(s.into())
    }

    pub fn type_of(&self) -> AtomicType {
        match self {
            XdmAtomicValue::Boolean(_) => AtomicType::Boolean,
            XdmAtomicValue::String(_) => AtomicType::String,
            XdmAtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            XdmAtomicValue::AnyUri(_) => AtomicType::AnyUri,
            XdmAtomicValue::Integer(_) => AtomicType::Integer,
            XdmAtomicValue::Decimal(_) => AtomicType::Decimal,
            XdmAtomicValue::Float(_) => AtomicType::Float,
            XdmAtomicValue::Double(_) => AtomicType::Double,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.type_of().is_numeric()
    }

    /// Canonical lexical representation (the result of `fn:string`).
    pub fn string_value(&self) -> CompactString {
        match self {
            XdmAtomicValue::Boolean(b) => CompactString::const_new(if *b { "true" } else { "false" }),
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => s.clone(),
            XdmAtomicValue::Integer(i) => format_compact!("{i}"),
            XdmAtomicValue::Decimal(d) => format_compact!("{d}"),
            XdmAtomicValue::Float(f) => format_floating(f64::from(*f)),
            XdmAtomicValue::Double(d) => format_floating(*d),
        }
    }
}

fn format_floating(d: f64) -> CompactString {
    if d.is_nan() {
        return CompactString::const_new("NaN");
    }
    if d.is_infinite() {
        return CompactString::const_new(if d > 0.0 { "INF" } else { "-INF" });
    }
    let abs = d.abs();
    if abs == 0.0 || (1e-6..1e6).contains(&abs) {
        return format_compact!("{d}");
    }
    // Scientific notation always carries a fractional mantissa: 1.0E7
    let sci = format!("{d:E}");
    match sci.split_once('E') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format_compact!("{mantissa}.0E{exp}"),
        _ => CompactString::from(sci),
    }
}

impl fmt::Display for XdmAtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_value())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<N> {
    Node(N),
    Atomic(XdmAtomicValue),
}

impl<N> XdmItem<N> {
    pub fn is_node(&self) -> bool {
        matches!(self, XdmItem::Node(_))
    }

    pub fn as_atomic(&self) -> Option<&XdmAtomicValue> {
        match self {
            XdmItem::Atomic(a) => Some(a),
            XdmItem::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&N> {
        match self {
            XdmItem::Node(n) => Some(n),
            XdmItem::Atomic(_) => None,
        }
    }
}

impl<N> From<XdmAtomicValue> for XdmItem<N> {
    fn from(a: XdmAtomicValue) -> Self {
        XdmItem::Atomic(a)
    }
}

impl<N> fmt::Display for XdmItem<N>
where
    N: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmItem::Node(n) => write!(f, "{n:?}"),
            XdmItem::Atomic(a) => write!(f, "{a}"),
        }
    }
}

pub type XdmItemResult<N> = Result<XdmItem<N>, Error>;

/// A fully materialized result sequence.
pub type XdmSequence<N> = Vec<XdmItem<N>>;

/// Immutable, shareable, flat sequence of items.
///
/// Construction always flattens: there is no way to build a sequence whose
/// members are themselves sequences.
pub struct SequenceValue<N>(Arc<[XdmItem<N>]>);

impl<N> SequenceValue<N> {
    pub fn empty() -> Self {
        SequenceValue(Arc::from(Vec::new()))
    }

    pub fn singleton(item: XdmItem<N>) -> Self {
        SequenceValue(Arc::from(vec![item]))
    }

    pub fn from_items(items: Vec<XdmItem<N>>) -> Self {
        SequenceValue(Arc::from(items))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn items(&self) -> &[XdmItem<N>] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, XdmItem<N>> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&XdmItem<N>> {
        self.0.get(index)
    }

    /// True when both handles share the same backing storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<N: Clone> SequenceValue<N> {
    pub fn to_vec(&self) -> XdmSequence<N> {
        self.0.to_vec()
    }

    /// Concatenate several sequences into one flat sequence.
    pub fn concat(parts: &[SequenceValue<N>]) -> Self {
        match parts {
            [] => Self::empty(),
            [only] => only.clone(),
            _ => parts.iter().flat_map(|p| p.iter().cloned()).collect(),
        }
    }
}

impl<N> Clone for SequenceValue<N> {
    fn clone(&self) -> Self {
        SequenceValue(Arc::clone(&self.0))
    }
}

impl<N> Default for SequenceValue<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<N: fmt::Debug> fmt::Debug for SequenceValue<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<N: PartialEq> PartialEq for SequenceValue<N> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<N> From<Vec<XdmItem<N>>> for SequenceValue<N> {
    fn from(items: Vec<XdmItem<N>>) -> Self {
        Self::from_items(items)
    }
}

impl<N> From<XdmItem<N>> for SequenceValue<N> {
    fn from(item: XdmItem<N>) -> Self {
        Self::singleton(item)
    }
}

impl<N> FromIterator<XdmItem<N>> for SequenceValue<N> {
    fn from_iter<I: IntoIterator<Item = XdmItem<N>>>(iter: I) -> Self {
        SequenceValue(iter.into_iter().collect())
    }
}

impl<N: Clone> FromIterator<SequenceValue<N>> for SequenceValue<N> {
    fn from_iter<I: IntoIterator<Item = SequenceValue<N>>>(iter: I) -> Self {
        let parts: Vec<SequenceValue<N>> = iter.into_iter().collect();
        Self::concat(&parts)
    }
}

impl<'a, N> IntoIterator for &'a SequenceValue<N> {
    type Item = &'a XdmItem<N>;
    type IntoIter = std::slice::Iter<'a, XdmItem<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Item = XdmItem<()>;

    #[test]
    fn nested_sequences_flatten_on_construction() {
        let a: SequenceValue<()> = vec![Item::Atomic(XdmAtomicValue::Integer(1))].into();
        let b: SequenceValue<()> = SequenceValue::empty();
        let c: SequenceValue<()> =
            vec![Item::Atomic(XdmAtomicValue::Integer(2)), Item::Atomic(XdmAtomicValue::Integer(3))].into();
        let joined: SequenceValue<()> = [a, b, c].into_iter().collect();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.get(2), Some(&Item::Atomic(XdmAtomicValue::Integer(3))));
    }

    #[test]
    fn double_lexical_forms() {
        assert_eq!(XdmAtomicValue::Double(3.0).string_value(), "3");
        assert_eq!(XdmAtomicValue::Double(2.5).string_value(), "2.5");
        assert_eq!(XdmAtomicValue::Double(f64::NAN).string_value(), "NaN");
        assert_eq!(XdmAtomicValue::Double(f64::NEG_INFINITY).string_value(), "-INF");
        assert_eq!(XdmAtomicValue::Double(1e7).string_value(), "1.0E7");
    }
}
