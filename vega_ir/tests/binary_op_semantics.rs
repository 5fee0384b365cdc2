//! Exhaustive two's-complement semantics of the fold table: every binary
//! op over every integer width and signedness, against boundary operand
//! pairs.

use vega_ir::fold::{fold_binary, Folded};
use vega_ir::{ArithFlags, BinaryArithKind, PrimitiveValue};

const OPS: [BinaryArithKind; 12] = [
    BinaryArithKind::Add,
    BinaryArithKind::Sub,
    BinaryArithKind::Mul,
    BinaryArithKind::Div,
    BinaryArithKind::Rem,
    BinaryArithKind::And,
    BinaryArithKind::Or,
    BinaryArithKind::Xor,
    BinaryArithKind::Shl,
    BinaryArithKind::Shr,
    BinaryArithKind::Min,
    BinaryArithKind::Max,
];

macro_rules! signed_suite {
    ($signed:ty, $variant:ident) => {{
        let pairs: [($signed, $signed); 8] = [
            (<$signed>::MAX, 1),
            (<$signed>::MIN, <$signed>::MAX),
            (<$signed>::MIN + 1, <$signed>::MAX),
            (0, <$signed>::MAX),
            (0, <$signed>::MAX - 1),
            (1, 1),
            (6, 2),
            (5, 19),
        ];
        let shift_mask = (<$signed>::BITS - 1) as u32;
        for op in OPS {
            for (a, b) in pairs {
                let folded = fold_binary(
                    op,
                    ArithFlags::empty(),
                    PrimitiveValue::$variant(a),
                    PrimitiveValue::$variant(b),
                )
                .unwrap_or_else(|| panic!("{:?} did not fold", op));
                let expected = match op {
                    BinaryArithKind::Add => Folded::Value(PrimitiveValue::$variant(a.wrapping_add(b))),
                    BinaryArithKind::Sub => Folded::Value(PrimitiveValue::$variant(a.wrapping_sub(b))),
                    BinaryArithKind::Mul => Folded::Value(PrimitiveValue::$variant(a.wrapping_mul(b))),
                    BinaryArithKind::Div => {
                        if b == 0 {
                            Folded::Poison
                        } else {
                            Folded::Value(PrimitiveValue::$variant(a.wrapping_div(b)))
                        }
                    }
                    BinaryArithKind::Rem => {
                        if b == 0 {
                            Folded::Poison
                        } else {
                            Folded::Value(PrimitiveValue::$variant(a.wrapping_rem(b)))
                        }
                    }
                    BinaryArithKind::And => Folded::Value(PrimitiveValue::$variant(a & b)),
                    BinaryArithKind::Or => Folded::Value(PrimitiveValue::$variant(a | b)),
                    BinaryArithKind::Xor => Folded::Value(PrimitiveValue::$variant(a ^ b)),
                    BinaryArithKind::Shl => Folded::Value(PrimitiveValue::$variant(
                        a.wrapping_shl((b as u32) & shift_mask),
                    )),
                    BinaryArithKind::Shr => Folded::Value(PrimitiveValue::$variant(
                        a.wrapping_shr((b as u32) & shift_mask),
                    )),
                    BinaryArithKind::Min => Folded::Value(PrimitiveValue::$variant(a.min(b))),
                    BinaryArithKind::Max => Folded::Value(PrimitiveValue::$variant(a.max(b))),
                    _ => unreachable!(),
                };
                assert_eq!(folded, expected, "{:?} over ({}, {})", op, a, b);
            }
        }
    }};
}

macro_rules! unsigned_suite {
    ($signed:ty, $unsigned:ty, $variant:ident) => {{
        let pairs: [($unsigned, $unsigned); 8] = [
            (<$unsigned>::MAX, 1),
            (<$unsigned>::MIN, <$unsigned>::MAX),
            (<$unsigned>::MIN + 1, <$unsigned>::MAX),
            (0, <$unsigned>::MAX),
            (0, <$unsigned>::MAX - 1),
            (1, 1),
            (6, 2),
            (5, 19),
        ];
        let shift_mask = (<$unsigned>::BITS - 1) as u32;
        for op in OPS {
            for (a, b) in pairs {
                let folded = fold_binary(
                    op,
                    ArithFlags::UNSIGNED,
                    PrimitiveValue::$variant(a as $signed),
                    PrimitiveValue::$variant(b as $signed),
                )
                .unwrap_or_else(|| panic!("{:?} did not fold", op));
                let value = |v: $unsigned| Folded::Value(PrimitiveValue::$variant(v as $signed));
                let expected = match op {
                    BinaryArithKind::Add => value(a.wrapping_add(b)),
                    BinaryArithKind::Sub => value(a.wrapping_sub(b)),
                    BinaryArithKind::Mul => value(a.wrapping_mul(b)),
                    BinaryArithKind::Div => {
                        if b == 0 {
                            Folded::Poison
                        } else {
                            value(a / b)
                        }
                    }
                    BinaryArithKind::Rem => {
                        if b == 0 {
                            Folded::Poison
                        } else {
                            value(a % b)
                        }
                    }
                    BinaryArithKind::And => value(a & b),
                    BinaryArithKind::Or => value(a | b),
                    BinaryArithKind::Xor => value(a ^ b),
                    BinaryArithKind::Shl => value(a.wrapping_shl((b as u32) & shift_mask)),
                    BinaryArithKind::Shr => value(a.wrapping_shr((b as u32) & shift_mask)),
                    BinaryArithKind::Min => value(a.min(b)),
                    BinaryArithKind::Max => value(a.max(b)),
                    _ => unreachable!(),
                };
                assert_eq!(folded, expected, "unsigned {:?} over ({}, {})", op, a, b);
            }
        }
    }};
}

#[test]
fn test_signed_semantics_all_widths() {
    signed_suite!(i8, Int8);
    signed_suite!(i16, Int16);
    signed_suite!(i32, Int32);
    signed_suite!(i64, Int64);
}

#[test]
fn test_unsigned_semantics_all_widths() {
    unsigned_suite!(i8, u8, Int8);
    unsigned_suite!(i16, u16, Int16);
    unsigned_suite!(i32, u32, Int32);
    unsigned_suite!(i64, u64, Int64);
}

#[test]
fn test_signed_division_boundary() {
    // MIN / -1 saturates to MIN on every width.
    for (value, expected) in [
        (
            fold_binary(
                BinaryArithKind::Div,
                ArithFlags::empty(),
                PrimitiveValue::Int8(i8::MIN),
                PrimitiveValue::Int8(-1),
            ),
            PrimitiveValue::Int8(i8::MIN),
        ),
        (
            fold_binary(
                BinaryArithKind::Div,
                ArithFlags::empty(),
                PrimitiveValue::Int64(i64::MIN),
                PrimitiveValue::Int64(-1),
            ),
            PrimitiveValue::Int64(i64::MIN),
        ),
    ] {
        assert_eq!(value, Some(Folded::Value(expected)));
    }
    // ... and MIN % -1 is zero, not a trap.
    assert_eq!(
        fold_binary(
            BinaryArithKind::Rem,
            ArithFlags::empty(),
            PrimitiveValue::Int32(i32::MIN),
            PrimitiveValue::Int32(-1),
        ),
        Some(Folded::Value(PrimitiveValue::Int32(0)))
    );
}
