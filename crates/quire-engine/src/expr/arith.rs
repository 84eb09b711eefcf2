//! Numeric promotion, arithmetic and value comparison on atomic values.
use super::types::{AtomicType, cast_atomic};
use super::{ArithOp, Calculator, CompOp};
use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::XdmAtomicValue;
use core::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum NumKind {
    Int(i64),
    Dec(f64),
    Float(f32),
    Double(f64),
}

impl NumKind {
    fn to_f64(self) -> f64 {
        match self {
            NumKind::Int(i) => i as f64,
            NumKind::Dec(d) | NumKind::Double(d) => d,
            NumKind::Float(f) => f64::from(f),
        }
    }

    fn into_value(self) -> XdmAtomicValue {
        match self {
            NumKind::Int(i) => XdmAtomicValue::Integer(i),
            NumKind::Dec(d) => XdmAtomicValue::Decimal(d),
            NumKind::Float(f) => XdmAtomicValue::Float(f),
            NumKind::Double(d) => XdmAtomicValue::Double(d),
        }
    }
}

pub(crate) fn classify(v: &XdmAtomicValue) -> Option<NumKind> {
    match v {
        XdmAtomicValue::Integer(i) => Some(NumKind::Int(*i)),
        XdmAtomicValue::Decimal(d) => Some(NumKind::Dec(*d)),
        XdmAtomicValue::Float(f) => Some(NumKind::Float(*f)),
        XdmAtomicValue::Double(d) => Some(NumKind::Double(*d)),
        _ => None,
    }
}

/// Promote both operands to their common numeric type.
pub(crate) fn unify_numeric(a: NumKind, b: NumKind) -> (NumKind, NumKind) {
    use NumKind::*;
    match (a, b) {
        (Double(x), y) => (Double(x), Double(y.to_f64())),
        (y, Double(x)) => (Double(y.to_f64()), Double(x)),
        (Float(x), y) => (Float(x), Float(y.to_f64() as f32)),
        (y, Float(x)) => (Float(y.to_f64() as f32), Float(x)),
        (Dec(x), y) => (Dec(x), Dec(y.to_f64())),
        (y, Dec(x)) => (Dec(y.to_f64()), Dec(x)),
        (Int(x), Int(y)) => (Int(x), Int(y)),
    }
}

/// Calculator for two statically known operand types, or `Generic` when
/// either is not a concrete numeric type.
pub fn select_calculator(op: ArithOp, lhs: AtomicType, rhs: AtomicType) -> Calculator {
    use AtomicType as T;
    let rank = |t: AtomicType| match t {
        T::Integer => Some(0),
        T::Decimal => Some(1),
        T::Float => Some(2),
        T::Double => Some(3),
        _ => None,
    };
    let (Some(a), Some(b)) = (rank(lhs), rank(rhs)) else {
        return Calculator::Generic;
    };
    match a.max(b) {
        0 if op == ArithOp::Div => Calculator::Decimal,
        0 => Calculator::Integer,
        1 => Calculator::Decimal,
        2 => Calculator::Float,
        _ => Calculator::Double,
    }
}

/// Static result type of an arithmetic expression.
pub fn result_type(op: ArithOp, calculator: Calculator) -> AtomicType {
    match (op, calculator) {
        (ArithOp::IDiv, _) => AtomicType::Integer,
        (_, Calculator::Generic) => AtomicType::Numeric,
        (_, Calculator::Integer) => AtomicType::Integer,
        (_, Calculator::Decimal) => AtomicType::Decimal,
        (_, Calculator::Float) => AtomicType::Float,
        (_, Calculator::Double) => AtomicType::Double,
    }
}

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "integer overflow")
}

fn div_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

fn idiv_float(x: f64, y: f64) -> Result<XdmAtomicValue, Error> {
    if y == 0.0 {
        return Err(div_by_zero());
    }
    if x.is_nan() || y.is_nan() || x.is_infinite() {
        return Err(Error::from_code(ErrorCode::FOAR0002, "idiv operand is NaN or infinite"));
    }
    let q = (x / y).trunc();
    if !q.is_finite() || q < i64::MIN as f64 || q >= i64::MAX as f64 {
        return Err(overflow());
    }
    Ok(XdmAtomicValue::Integer(q as i64))
}

fn operand_number(v: &XdmAtomicValue) -> Result<NumKind, Error> {
    match v {
        // Left over when no conversion was inserted statically.
        XdmAtomicValue::UntypedAtomic(_) => classify(&cast_atomic(v, AtomicType::Double)?)
            .ok_or_else(|| Error::internal("double cast produced a non-number")),
        other => classify(other).ok_or_else(|| {
            Error::from_code(
                ErrorCode::XPTY0004,
                format!("arithmetic operand of type xs:{} is not numeric", other.type_of().local_name()),
            )
        }),
    }
}

fn coerce(n: NumKind, calculator: Calculator) -> NumKind {
    match calculator {
        Calculator::Generic | Calculator::Integer => n,
        Calculator::Decimal => match n {
            NumKind::Int(i) => NumKind::Dec(i as f64),
            other => other,
        },
        Calculator::Float => NumKind::Float(n.to_f64() as f32),
        Calculator::Double => NumKind::Double(n.to_f64()),
    }
}

/// Apply `op` to two atomic operands.
pub fn compute(
    op: ArithOp,
    lhs: &XdmAtomicValue,
    rhs: &XdmAtomicValue,
    calculator: Calculator,
) -> Result<XdmAtomicValue, Error> {
    let a = coerce(operand_number(lhs)?, calculator);
    let b = coerce(operand_number(rhs)?, calculator);
    let (a, b) = unify_numeric(a, b);
    use NumKind::*;
    Ok(match (a, b) {
        (Int(x), Int(y)) => match op {
            ArithOp::Add => Int(x.checked_add(y).ok_or_else(overflow)?),
            ArithOp::Sub => Int(x.checked_sub(y).ok_or_else(overflow)?),
            ArithOp::Mul => Int(x.checked_mul(y).ok_or_else(overflow)?),
            ArithOp::Div => {
                if y == 0 {
                    return Err(div_by_zero());
                }
                Dec(x as f64 / y as f64)
            }
            ArithOp::IDiv => {
                if y == 0 {
                    return Err(div_by_zero());
                }
                Int(x.checked_div(y).ok_or_else(overflow)?)
            }
            ArithOp::Mod => {
                if y == 0 {
                    return Err(div_by_zero());
                }
                Int(x.checked_rem(y).ok_or_else(overflow)?)
            }
        },
        (Dec(x), Dec(y)) => match op {
            ArithOp::Add => Dec(x + y),
            ArithOp::Sub => Dec(x - y),
            ArithOp::Mul => Dec(x * y),
            ArithOp::Div | ArithOp::Mod if y == 0.0 => return Err(div_by_zero()),
            ArithOp::Div => Dec(x / y),
            ArithOp::Mod => Dec(x % y),
            ArithOp::IDiv => return idiv_float(x, y),
        },
        (Float(x), Float(y)) => match op {
            ArithOp::Add => Float(x + y),
            ArithOp::Sub => Float(x - y),
            ArithOp::Mul => Float(x * y),
            ArithOp::Div => Float(x / y),
            ArithOp::Mod => Float(x % y),
            ArithOp::IDiv => return idiv_float(f64::from(x), f64::from(y)),
        },
        (Double(x), Double(y)) => match op {
            ArithOp::Add => Double(x + y),
            ArithOp::Sub => Double(x - y),
            ArithOp::Mul => Double(x * y),
            ArithOp::Div => Double(x / y),
            ArithOp::Mod => Double(x % y),
            ArithOp::IDiv => return idiv_float(x, y),
        },
        _ => return Err(Error::internal("numeric operands not unified")),
    }
    .into_value())
}

fn incomparable(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Error {
    Error::from_code(
        ErrorCode::XPTY0004,
        format!(
            "cannot compare xs:{} with xs:{}",
            a.type_of().local_name(),
            b.type_of().local_name()
        ),
    )
}

/// Whether values of the two static types can ever be compared.
pub fn comparable_types(a: AtomicType, b: AtomicType) -> bool {
    let class = |t: AtomicType| -> Option<u8> {
        if t.may_be_untyped() {
            None
        } else if t.is_numeric() || t == AtomicType::Numeric {
            Some(0)
        } else if matches!(t, AtomicType::String | AtomicType::AnyUri) {
            Some(1)
        } else {
            Some(2)
        }
    };
    match (class(a), class(b)) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// Ordering of two atomic values under value-comparison rules. `None` for
/// unordered pairs (NaN).
pub fn compare_atomic(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<Option<Ordering>, Error> {
    use XdmAtomicValue as V;
    let string_like = |v: &XdmAtomicValue| match v {
        V::String(s) | V::UntypedAtomic(s) | V::AnyUri(s) => Some(s.clone()),
        _ => None,
    };
    if let (Some(x), Some(y)) = (classify(a), classify(b)) {
        return Ok(match unify_numeric(x, y) {
            (NumKind::Int(x), NumKind::Int(y)) => Some(x.cmp(&y)),
            (x, y) => x.to_f64().partial_cmp(&y.to_f64()),
        });
    }
    match (a, b) {
        (V::Boolean(x), V::Boolean(y)) => Ok(Some(x.cmp(y))),
        _ => match (string_like(a), string_like(b)) {
            (Some(x), Some(y)) => Ok(Some(x.as_str().cmp(y.as_str()))),
            _ => Err(incomparable(a, b)),
        },
    }
}

pub fn compare(op: CompOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<bool, Error> {
    let ord = compare_atomic(a, b)?;
    Ok(match (op, ord) {
        (CompOp::Ne, None) => true,
        (_, None) => false,
        (CompOp::Eq, Some(o)) => o == Ordering::Equal,
        (CompOp::Ne, Some(o)) => o != Ordering::Equal,
        (CompOp::Lt, Some(o)) => o == Ordering::Less,
        (CompOp::Le, Some(o)) => o != Ordering::Greater,
        (CompOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompOp::Ge, Some(o)) => o != Ordering::Less,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use XdmAtomicValue as V;

    #[test]
    fn integer_division_yields_decimal() {
        let r = compute(ArithOp::Div, &V::Integer(7), &V::Integer(2), Calculator::Generic).expect("ok");
        assert_eq!(r, V::Decimal(3.5));
    }

    #[test]
    fn promotion_follows_the_wider_operand() {
        let r = compute(ArithOp::Add, &V::Integer(1), &V::Double(0.5), Calculator::Generic).expect("ok");
        assert_eq!(r, V::Double(1.5));
        let r = compute(ArithOp::Mul, &V::Decimal(1.5), &V::Float(2.0), Calculator::Generic).expect("ok");
        assert_eq!(r, V::Float(3.0));
    }

    #[test]
    fn integer_overflow_and_zero_division() {
        let e = compute(ArithOp::Add, &V::Integer(i64::MAX), &V::Integer(1), Calculator::Integer).expect_err("overflow");
        assert_eq!(e.code.local, "FOAR0002");
        let e = compute(ArithOp::IDiv, &V::Integer(1), &V::Integer(0), Calculator::Integer).expect_err("zero");
        assert_eq!(e.code.local, "FOAR0001");
        let r = compute(ArithOp::Div, &V::Double(1.0), &V::Double(0.0), Calculator::Double).expect("ok");
        assert_eq!(r, V::Double(f64::INFINITY));
    }

    #[test]
    fn calculator_selection() {
        assert_eq!(select_calculator(ArithOp::Add, AtomicType::Integer, AtomicType::Integer), Calculator::Integer);
        assert_eq!(select_calculator(ArithOp::Div, AtomicType::Integer, AtomicType::Integer), Calculator::Decimal);
        assert_eq!(select_calculator(ArithOp::Add, AtomicType::Integer, AtomicType::Double), Calculator::Double);
        assert_eq!(select_calculator(ArithOp::Add, AtomicType::AnyAtomic, AtomicType::Double), Calculator::Generic);
    }

    #[test]
    fn comparisons() {
        assert!(compare(CompOp::Lt, &V::Integer(1), &V::Double(1.5)).expect("ok"));
        assert!(compare(CompOp::Ne, &V::Double(f64::NAN), &V::Double(f64::NAN)).expect("ok"));
        assert!(compare(CompOp::Eq, &V::string("a"), &V::untyped("a")).expect("ok"));
        assert!(compare(CompOp::Eq, &V::Boolean(true), &V::Integer(1)).is_err());
    }
}
