//! Constant folding tables
//!
//! Folding runs at value-creation time inside the builder and again in the
//! re-folding pass. Integer arithmetic wraps (two's complement); signed
//! `MIN / -1` stays `MIN`; integer division and remainder by zero fold to
//! Poison; float arithmetic follows IEEE-754; `min`/`max` with one NaN
//! operand return the other operand.

use crate::types::PrimitiveType;
use crate::value::{
    ArithFlags, BinaryArithKind, CompareKind, PrimitiveValue, TernaryArithKind, UnaryArithKind,
};

/// Outcome of a successful fold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Folded {
    Value(PrimitiveValue),
    Poison,
}

macro_rules! int_binary {
    ($op:ident, $flags:ident, $lhs:ident, $rhs:ident, $signed:ty, $unsigned:ty, $variant:ident) => {{
        let unsigned = $flags.contains(ArithFlags::UNSIGNED);
        let bits = <$signed>::BITS;
        let shift_mask = (bits - 1) as u32;
        match $op {
            BinaryArithKind::Add => some_value(PrimitiveValue::$variant($lhs.wrapping_add($rhs))),
            BinaryArithKind::Sub => some_value(PrimitiveValue::$variant($lhs.wrapping_sub($rhs))),
            BinaryArithKind::Mul => some_value(PrimitiveValue::$variant($lhs.wrapping_mul($rhs))),
            BinaryArithKind::Div => {
                if $rhs == 0 {
                    Some(Folded::Poison)
                } else if unsigned {
                    let result = ($lhs as $unsigned).wrapping_div($rhs as $unsigned);
                    some_value(PrimitiveValue::$variant(result as $signed))
                } else {
                    // wrapping_div turns MIN / -1 into MIN
                    some_value(PrimitiveValue::$variant($lhs.wrapping_div($rhs)))
                }
            }
            BinaryArithKind::Rem => {
                if $rhs == 0 {
                    Some(Folded::Poison)
                } else if unsigned {
                    let result = ($lhs as $unsigned).wrapping_rem($rhs as $unsigned);
                    some_value(PrimitiveValue::$variant(result as $signed))
                } else {
                    some_value(PrimitiveValue::$variant($lhs.wrapping_rem($rhs)))
                }
            }
            BinaryArithKind::And => some_value(PrimitiveValue::$variant($lhs & $rhs)),
            BinaryArithKind::Or => some_value(PrimitiveValue::$variant($lhs | $rhs)),
            BinaryArithKind::Xor => some_value(PrimitiveValue::$variant($lhs ^ $rhs)),
            BinaryArithKind::Shl => {
                let amount = ($rhs as u32) & shift_mask;
                some_value(PrimitiveValue::$variant($lhs.wrapping_shl(amount)))
            }
            BinaryArithKind::Shr => {
                let amount = ($rhs as u32) & shift_mask;
                if unsigned {
                    let result = ($lhs as $unsigned).wrapping_shr(amount);
                    some_value(PrimitiveValue::$variant(result as $signed))
                } else {
                    some_value(PrimitiveValue::$variant($lhs.wrapping_shr(amount)))
                }
            }
            BinaryArithKind::Min => {
                if unsigned {
                    let result = ($lhs as $unsigned).min($rhs as $unsigned);
                    some_value(PrimitiveValue::$variant(result as $signed))
                } else {
                    some_value(PrimitiveValue::$variant($lhs.min($rhs)))
                }
            }
            BinaryArithKind::Max => {
                if unsigned {
                    let result = ($lhs as $unsigned).max($rhs as $unsigned);
                    some_value(PrimitiveValue::$variant(result as $signed))
                } else {
                    some_value(PrimitiveValue::$variant($lhs.max($rhs)))
                }
            }
            _ => None,
        }
    }};
}

macro_rules! float_binary {
    ($op:ident, $lhs:ident, $rhs:ident, $variant:ident) => {{
        match $op {
            BinaryArithKind::Add => some_value(PrimitiveValue::$variant($lhs + $rhs)),
            BinaryArithKind::Sub => some_value(PrimitiveValue::$variant($lhs - $rhs)),
            BinaryArithKind::Mul => some_value(PrimitiveValue::$variant($lhs * $rhs)),
            BinaryArithKind::Div => some_value(PrimitiveValue::$variant($lhs / $rhs)),
            BinaryArithKind::Rem => some_value(PrimitiveValue::$variant($lhs % $rhs)),
            // NaN-ignoring min/max: a NaN operand yields the other operand.
            BinaryArithKind::Min => some_value(PrimitiveValue::$variant(if $lhs.is_nan() {
                $rhs
            } else if $rhs.is_nan() {
                $lhs
            } else {
                $lhs.min($rhs)
            })),
            BinaryArithKind::Max => some_value(PrimitiveValue::$variant(if $lhs.is_nan() {
                $rhs
            } else if $rhs.is_nan() {
                $lhs
            } else {
                $lhs.max($rhs)
            })),
            BinaryArithKind::Pow => some_value(PrimitiveValue::$variant($lhs.powf($rhs))),
            BinaryArithKind::Atan2 => some_value(PrimitiveValue::$variant($lhs.atan2($rhs))),
            BinaryArithKind::CopySign => some_value(PrimitiveValue::$variant($lhs.copysign($rhs))),
            _ => None,
        }
    }};
}

fn some_value(value: PrimitiveValue) -> Option<Folded> {
    Some(Folded::Value(value))
}

/// Fold a binary operation over two literals. `None` means the combination
/// has no fold rule and the operation is materialized.
pub fn fold_binary(
    op: BinaryArithKind,
    flags: ArithFlags,
    lhs: PrimitiveValue,
    rhs: PrimitiveValue,
) -> Option<Folded> {
    use PrimitiveValue::*;
    match (lhs, rhs) {
        (Int8(a), Int8(b)) => int_binary!(op, flags, a, b, i8, u8, Int8),
        (Int16(a), Int16(b)) => int_binary!(op, flags, a, b, i16, u16, Int16),
        (Int32(a), Int32(b)) => int_binary!(op, flags, a, b, i32, u32, Int32),
        (Int64(a), Int64(b)) => int_binary!(op, flags, a, b, i64, u64, Int64),
        (Int1(a), Int1(b)) => match op {
            BinaryArithKind::And => some_value(Int1(a & b)),
            BinaryArithKind::Or => some_value(Int1(a | b)),
            BinaryArithKind::Xor => some_value(Int1(a ^ b)),
            _ => None,
        },
        (Float32(a), Float32(b)) => float_binary!(op, a, b, Float32),
        (Float64(a), Float64(b)) => float_binary!(op, a, b, Float64),
        _ => None,
    }
}

macro_rules! int_unary {
    ($op:ident, $value:ident, $variant:ident) => {{
        match $op {
            UnaryArithKind::Neg => some_value(PrimitiveValue::$variant($value.wrapping_neg())),
            UnaryArithKind::Not => some_value(PrimitiveValue::$variant(!$value)),
            UnaryArithKind::Abs => some_value(PrimitiveValue::$variant($value.wrapping_abs())),
            _ => None,
        }
    }};
}

macro_rules! float_unary {
    ($op:ident, $value:ident, $variant:ident) => {{
        match $op {
            UnaryArithKind::Neg => some_value(PrimitiveValue::$variant(-$value)),
            UnaryArithKind::Abs => some_value(PrimitiveValue::$variant($value.abs())),
            UnaryArithKind::Sqrt => some_value(PrimitiveValue::$variant($value.sqrt())),
            UnaryArithKind::Rsqrt => some_value(PrimitiveValue::$variant($value.sqrt().recip())),
            UnaryArithKind::Sin => some_value(PrimitiveValue::$variant($value.sin())),
            UnaryArithKind::Cos => some_value(PrimitiveValue::$variant($value.cos())),
            UnaryArithKind::Tanh => some_value(PrimitiveValue::$variant($value.tanh())),
            UnaryArithKind::Exp => some_value(PrimitiveValue::$variant($value.exp())),
            UnaryArithKind::Exp2 => some_value(PrimitiveValue::$variant($value.exp2())),
            UnaryArithKind::Log => some_value(PrimitiveValue::$variant($value.ln())),
            UnaryArithKind::Log2 => some_value(PrimitiveValue::$variant($value.log2())),
            UnaryArithKind::Floor => some_value(PrimitiveValue::$variant($value.floor())),
            UnaryArithKind::Ceiling => some_value(PrimitiveValue::$variant($value.ceil())),
            _ => None,
        }
    }};
}

/// Fold a unary operation over a literal.
pub fn fold_unary(op: UnaryArithKind, value: PrimitiveValue) -> Option<Folded> {
    use PrimitiveValue::*;
    match value {
        Int1(b) => match op {
            UnaryArithKind::Not => some_value(Int1(!b)),
            _ => None,
        },
        Int8(v) => int_unary!(op, v, Int8),
        Int16(v) => int_unary!(op, v, Int16),
        Int32(v) => int_unary!(op, v, Int32),
        Int64(v) => int_unary!(op, v, Int64),
        Float32(v) => float_unary!(op, v, Float32),
        Float64(v) => float_unary!(op, v, Float64),
    }
}

/// Fold a ternary operation over three literals.
pub fn fold_ternary(
    op: TernaryArithKind,
    a: PrimitiveValue,
    b: PrimitiveValue,
    c: PrimitiveValue,
) -> Option<Folded> {
    use PrimitiveValue::*;
    match (op, a, b, c) {
        (TernaryArithKind::MultiplyAdd, Float32(a), Float32(b), Float32(c)) => {
            some_value(Float32(a.mul_add(b, c)))
        }
        (TernaryArithKind::MultiplyAdd, Float64(a), Float64(b), Float64(c)) => {
            some_value(Float64(a.mul_add(b, c)))
        }
        (TernaryArithKind::MultiplyAdd, Int32(a), Int32(b), Int32(c)) => {
            some_value(Int32(a.wrapping_mul(b).wrapping_add(c)))
        }
        (TernaryArithKind::MultiplyAdd, Int64(a), Int64(b), Int64(c)) => {
            some_value(Int64(a.wrapping_mul(b).wrapping_add(c)))
        }
        _ => None,
    }
}

fn compare_ordering(kind: CompareKind, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match kind {
        CompareKind::Equal => ordering == Equal,
        CompareKind::NotEqual => ordering != Equal,
        CompareKind::LessThan => ordering == Less,
        CompareKind::LessEqual => ordering != Greater,
        CompareKind::GreaterThan => ordering == Greater,
        CompareKind::GreaterEqual => ordering != Less,
    }
}

/// Fold a comparison over two literals.
pub fn fold_compare(
    kind: CompareKind,
    flags: ArithFlags,
    lhs: PrimitiveValue,
    rhs: PrimitiveValue,
) -> Option<bool> {
    use PrimitiveValue::*;
    let unsigned = flags.contains(ArithFlags::UNSIGNED);
    let ordering = match (lhs, rhs) {
        (Int1(a), Int1(b)) => a.cmp(&b),
        (Int8(a), Int8(b)) => {
            if unsigned {
                (a as u8).cmp(&(b as u8))
            } else {
                a.cmp(&b)
            }
        }
        (Int16(a), Int16(b)) => {
            if unsigned {
                (a as u16).cmp(&(b as u16))
            } else {
                a.cmp(&b)
            }
        }
        (Int32(a), Int32(b)) => {
            if unsigned {
                (a as u32).cmp(&(b as u32))
            } else {
                a.cmp(&b)
            }
        }
        (Int64(a), Int64(b)) => {
            if unsigned {
                (a as u64).cmp(&(b as u64))
            } else {
                a.cmp(&b)
            }
        }
        (Float32(a), Float32(b)) => match a.partial_cmp(&b) {
            Some(ordering) => ordering,
            // Unordered: the relation holds iff the compare is unordered.
            None => return Some(flags.contains(ArithFlags::UNORDERED)),
        },
        (Float64(a), Float64(b)) => match a.partial_cmp(&b) {
            Some(ordering) => ordering,
            None => return Some(flags.contains(ArithFlags::UNORDERED)),
        },
        _ => return None,
    };
    Some(compare_ordering(kind, ordering))
}

/// Fold a numeric conversion of a literal to `target`.
pub fn fold_convert(
    target: PrimitiveType,
    flags: ArithFlags,
    value: PrimitiveValue,
) -> Option<PrimitiveValue> {
    use PrimitiveValue::*;
    let unsigned = flags.contains(ArithFlags::UNSIGNED);

    // Widen the source to 64 bits first; unsigned sources zero-extend.
    let as_i64 = |value: PrimitiveValue| -> Option<i64> {
        Some(match value {
            Int1(b) => b as i64,
            Int8(v) => {
                if unsigned {
                    v as u8 as i64
                } else {
                    v as i64
                }
            }
            Int16(v) => {
                if unsigned {
                    v as u16 as i64
                } else {
                    v as i64
                }
            }
            Int32(v) => {
                if unsigned {
                    v as u32 as i64
                } else {
                    v as i64
                }
            }
            Int64(v) => v,
            Float32(_) | Float64(_) => return None,
        })
    };
    let as_f64 = |value: PrimitiveValue| -> Option<f64> {
        Some(match value {
            Float32(v) => v as f64,
            Float64(v) => v,
            other => {
                let wide = as_i64(other)?;
                if unsigned {
                    wide as u64 as f64
                } else {
                    wide as f64
                }
            }
        })
    };

    Some(match target {
        PrimitiveType::Int1 => Int1(!value.is_zero()),
        PrimitiveType::Int8 => match value {
            Float32(v) => Int8(v as i8),
            Float64(v) => Int8(v as i8),
            other => Int8(as_i64(other)? as i8),
        },
        PrimitiveType::Int16 => match value {
            Float32(v) => Int16(v as i16),
            Float64(v) => Int16(v as i16),
            other => Int16(as_i64(other)? as i16),
        },
        PrimitiveType::Int32 => match value {
            Float32(v) => Int32(v as i32),
            Float64(v) => Int32(v as i32),
            other => Int32(as_i64(other)? as i32),
        },
        PrimitiveType::Int64 => match value {
            Float32(v) => Int64(v as i64),
            Float64(v) => Int64(v as i64),
            other => Int64(as_i64(other)?),
        },
        PrimitiveType::Float32 => Float32(as_f64(value)? as f32),
        PrimitiveType::Float64 => Float64(as_f64(value)?),
        PrimitiveType::Void => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn binary_i32(op: BinaryArithKind, flags: ArithFlags, lhs: i32, rhs: i32) -> Folded {
        fold_binary(op, flags, PrimitiveValue::Int32(lhs), PrimitiveValue::Int32(rhs)).unwrap()
    }

    #[test]
    fn test_integer_wrap() {
        assert_eq!(
            binary_i32(BinaryArithKind::Add, ArithFlags::empty(), i32::MAX, 1),
            Folded::Value(PrimitiveValue::Int32(i32::MIN))
        );
        assert_eq!(
            binary_i32(BinaryArithKind::Mul, ArithFlags::empty(), i32::MIN, -1),
            Folded::Value(PrimitiveValue::Int32(i32::MIN))
        );
    }

    #[test]
    fn test_min_over_neg_one_saturates_all_widths() {
        assert_eq!(
            fold_binary(
                BinaryArithKind::Div,
                ArithFlags::empty(),
                PrimitiveValue::Int8(i8::MIN),
                PrimitiveValue::Int8(-1)
            ),
            Some(Folded::Value(PrimitiveValue::Int8(i8::MIN)))
        );
        assert_eq!(
            fold_binary(
                BinaryArithKind::Div,
                ArithFlags::empty(),
                PrimitiveValue::Int16(i16::MIN),
                PrimitiveValue::Int16(-1)
            ),
            Some(Folded::Value(PrimitiveValue::Int16(i16::MIN)))
        );
        assert_eq!(
            binary_i32(BinaryArithKind::Div, ArithFlags::empty(), i32::MIN, -1),
            Folded::Value(PrimitiveValue::Int32(i32::MIN))
        );
        assert_eq!(
            fold_binary(
                BinaryArithKind::Div,
                ArithFlags::empty(),
                PrimitiveValue::Int64(i64::MIN),
                PrimitiveValue::Int64(-1)
            ),
            Some(Folded::Value(PrimitiveValue::Int64(i64::MIN)))
        );
    }

    #[test]
    fn test_division_by_zero_is_poison() {
        assert_eq!(
            binary_i32(BinaryArithKind::Div, ArithFlags::empty(), 5, 0),
            Folded::Poison
        );
        assert_eq!(
            binary_i32(BinaryArithKind::Rem, ArithFlags::empty(), 5, 0),
            Folded::Poison
        );
        // Floats follow IEEE-754 instead.
        let folded = fold_binary(
            BinaryArithKind::Div,
            ArithFlags::empty(),
            PrimitiveValue::Float64(1.0),
            PrimitiveValue::Float64(0.0),
        )
        .unwrap();
        assert_eq!(folded, Folded::Value(PrimitiveValue::Float64(f64::INFINITY)));
    }

    #[test]
    fn test_unsigned_division() {
        let flags = ArithFlags::UNSIGNED;
        // -2 as u32 is huge; dividing by 2 gives 0x7FFFFFFF.
        assert_eq!(
            binary_i32(BinaryArithKind::Div, flags, -2, 2),
            Folded::Value(PrimitiveValue::Int32(0x7FFF_FFFF))
        );
    }

    #[test]
    fn test_shift_masks_count() {
        assert_eq!(
            binary_i32(BinaryArithKind::Shl, ArithFlags::empty(), 1, 33),
            Folded::Value(PrimitiveValue::Int32(2))
        );
        assert_eq!(
            binary_i32(BinaryArithKind::Shr, ArithFlags::UNSIGNED, -1, 28),
            Folded::Value(PrimitiveValue::Int32(0xF))
        );
    }

    #[test]
    fn test_float_min_max_ignore_nan() {
        for op in [BinaryArithKind::Min, BinaryArithKind::Max] {
            let folded = fold_binary(
                op,
                ArithFlags::empty(),
                PrimitiveValue::Float32(f32::NAN),
                PrimitiveValue::Float32(3.0),
            )
            .unwrap();
            assert_eq!(folded, Folded::Value(PrimitiveValue::Float32(3.0)));
            let folded = fold_binary(
                op,
                ArithFlags::empty(),
                PrimitiveValue::Float32(3.0),
                PrimitiveValue::Float32(f32::NAN),
            )
            .unwrap();
            assert_eq!(folded, Folded::Value(PrimitiveValue::Float32(3.0)));
        }
    }

    #[test]
    fn test_nan_preserved_through_abs_and_neg() {
        let nan = f64::NAN;
        let Some(Folded::Value(PrimitiveValue::Float64(abs))) =
            fold_unary(UnaryArithKind::Abs, PrimitiveValue::Float64(nan))
        else {
            panic!("expected fold");
        };
        assert!(abs.is_nan());
        let Some(Folded::Value(PrimitiveValue::Float64(neg))) =
            fold_unary(UnaryArithKind::Neg, PrimitiveValue::Float64(nan))
        else {
            panic!("expected fold");
        };
        assert!(neg.is_nan());
    }

    #[test]
    fn test_compare_relations() {
        let flags = ArithFlags::empty();
        assert_eq!(
            fold_compare(
                CompareKind::LessThan,
                flags,
                PrimitiveValue::Int32(-1),
                PrimitiveValue::Int32(1)
            ),
            Some(true)
        );
        assert_eq!(
            fold_compare(
                CompareKind::LessThan,
                ArithFlags::UNSIGNED,
                PrimitiveValue::Int32(-1),
                PrimitiveValue::Int32(1)
            ),
            Some(false)
        );
        // NaN: ordered compares fail, unordered compares hold.
        assert_eq!(
            fold_compare(
                CompareKind::Equal,
                flags,
                PrimitiveValue::Float64(f64::NAN),
                PrimitiveValue::Float64(f64::NAN)
            ),
            Some(false)
        );
        assert_eq!(
            fold_compare(
                CompareKind::Equal,
                ArithFlags::UNORDERED,
                PrimitiveValue::Float64(f64::NAN),
                PrimitiveValue::Float64(1.0)
            ),
            Some(true)
        );
    }

    #[test]
    fn test_convert_sign_extension() {
        // Signed widening sign-extends.
        assert_eq!(
            fold_convert(
                PrimitiveType::Int32,
                ArithFlags::empty(),
                PrimitiveValue::Int8(-1)
            ),
            Some(PrimitiveValue::Int32(-1))
        );
        // Unsigned widening zero-extends.
        assert_eq!(
            fold_convert(
                PrimitiveType::Int32,
                ArithFlags::UNSIGNED,
                PrimitiveValue::Int8(-1)
            ),
            Some(PrimitiveValue::Int32(255))
        );
    }

    proptest! {
        #[test]
        fn prop_add_matches_wrapping(a in any::<i64>(), b in any::<i64>()) {
            let folded = fold_binary(
                BinaryArithKind::Add,
                ArithFlags::empty(),
                PrimitiveValue::Int64(a),
                PrimitiveValue::Int64(b),
            );
            prop_assert_eq!(folded, Some(Folded::Value(PrimitiveValue::Int64(a.wrapping_add(b)))));
        }

        #[test]
        fn prop_div_never_panics(a in any::<i32>(), b in any::<i32>()) {
            let folded = binary_i32(BinaryArithKind::Div, ArithFlags::empty(), a, b);
            if b == 0 {
                prop_assert_eq!(folded, Folded::Poison);
            } else {
                prop_assert_eq!(
                    folded,
                    Folded::Value(PrimitiveValue::Int32(a.wrapping_div(b)))
                );
            }
        }

        #[test]
        fn prop_unsigned_compare_matches_u32(a in any::<i32>(), b in any::<i32>()) {
            let folded = fold_compare(
                CompareKind::LessThan,
                ArithFlags::UNSIGNED,
                PrimitiveValue::Int32(a),
                PrimitiveValue::Int32(b),
            );
            prop_assert_eq!(folded, Some((a as u32) < (b as u32)));
        }
    }
}
