//! PTX mnemonic selection tables

use vega_common::{CompileError, Result};
use vega_ir::{
    AddressSpace, ArithFlags, AtomicKind, BarrierScope, BinaryArithKind, CompareKind,
    IntrinsicQuery, PrimitiveType, ShuffleMode, UnaryArithKind,
};

/// Type suffix of arithmetic instructions (`.s32`, `.f64`, ...).
pub fn arith_suffix(prim: PrimitiveType, flags: ArithFlags) -> &'static str {
    let unsigned = flags.contains(ArithFlags::UNSIGNED);
    match prim {
        PrimitiveType::Int8 | PrimitiveType::Int16 => {
            if unsigned {
                "u16"
            } else {
                "s16"
            }
        }
        PrimitiveType::Int32 => {
            if unsigned {
                "u32"
            } else {
                "s32"
            }
        }
        PrimitiveType::Int64 => {
            if unsigned {
                "u64"
            } else {
                "s64"
            }
        }
        PrimitiveType::Float32 => "f32",
        PrimitiveType::Float64 => "f64",
        PrimitiveType::Int1 | PrimitiveType::Void => "pred",
    }
}

/// Bit-width suffix (`.b16`, `.b32`, `.b64`).
pub fn bit_suffix(prim: PrimitiveType) -> &'static str {
    match prim {
        PrimitiveType::Int8 | PrimitiveType::Int16 => "b16",
        PrimitiveType::Int32 | PrimitiveType::Float32 => "b32",
        PrimitiveType::Int64 | PrimitiveType::Float64 => "b64",
        PrimitiveType::Int1 | PrimitiveType::Void => "b32",
    }
}

/// Memory access suffix for loads and stores.
pub fn memory_suffix(prim: PrimitiveType, flags: ArithFlags) -> &'static str {
    let unsigned = flags.contains(ArithFlags::UNSIGNED);
    match prim {
        PrimitiveType::Int1 | PrimitiveType::Int8 => "u8",
        PrimitiveType::Int16 => {
            if unsigned {
                "u16"
            } else {
                "s16"
            }
        }
        PrimitiveType::Int32 => "u32",
        PrimitiveType::Int64 => "u64",
        PrimitiveType::Float32 => "f32",
        PrimitiveType::Float64 => "f64",
        PrimitiveType::Void => "u32",
    }
}

/// Address-space qualifier of memory opcodes; generic pointers use the
/// unqualified form.
pub fn space_qualifier(space: AddressSpace) -> &'static str {
    match space {
        AddressSpace::Generic => "",
        AddressSpace::Global => ".global",
        AddressSpace::Shared => ".shared",
        AddressSpace::Local => ".local",
        AddressSpace::Constant => ".const",
    }
}

/// Select the mnemonic of a binary operation, without the type suffix.
pub fn binary_opcode(
    op: BinaryArithKind,
    prim: PrimitiveType,
    fast_math: bool,
) -> Result<&'static str> {
    let is_float = prim.is_float();
    let name = match op {
        BinaryArithKind::Add => "add",
        BinaryArithKind::Sub => "sub",
        BinaryArithKind::Mul => {
            if is_float {
                "mul"
            } else {
                "mul.lo"
            }
        }
        BinaryArithKind::Div => {
            if !is_float {
                "div"
            } else if fast_math && prim == PrimitiveType::Float32 {
                "div.approx"
            } else {
                "div.rn"
            }
        }
        BinaryArithKind::Rem => {
            if is_float {
                return Err(CompileError::InvalidCodeGeneration(
                    "float remainder must be lowered before emission".to_string(),
                ));
            }
            "rem"
        }
        BinaryArithKind::And => "and",
        BinaryArithKind::Or => "or",
        BinaryArithKind::Xor => "xor",
        BinaryArithKind::Shl => "shl",
        BinaryArithKind::Shr => "shr",
        BinaryArithKind::Min => "min",
        BinaryArithKind::Max => "max",
        BinaryArithKind::Pow | BinaryArithKind::Atan2 | BinaryArithKind::CopySign => {
            return Err(CompileError::InvalidCodeGeneration(format!(
                "{} must be lowered to primitive operations before emission",
                op.mnemonic()
            )))
        }
    };
    Ok(name)
}

/// Select the mnemonic of a unary operation, with trailing type suffix.
pub fn unary_opcode(
    op: UnaryArithKind,
    prim: PrimitiveType,
    fast_math: bool,
) -> Result<String> {
    let suffix = arith_suffix(prim, ArithFlags::empty());
    let name = match op {
        UnaryArithKind::Neg => "neg",
        UnaryArithKind::Abs => "abs",
        UnaryArithKind::Not => {
            // Bitwise not; predicates use not.pred.
            return Ok(format!("not.{}", bit_suffix(prim)));
        }
        UnaryArithKind::Sqrt => {
            if fast_math && prim == PrimitiveType::Float32 {
                "sqrt.approx"
            } else {
                "sqrt.rn"
            }
        }
        UnaryArithKind::Rsqrt => "rsqrt.approx",
        UnaryArithKind::Sin => "sin.approx",
        UnaryArithKind::Cos => "cos.approx",
        UnaryArithKind::Exp2 => "ex2.approx",
        UnaryArithKind::Log2 => "lg2.approx",
        UnaryArithKind::Floor => "cvt.rmi",
        UnaryArithKind::Ceiling => "cvt.rpi",
        UnaryArithKind::Tanh | UnaryArithKind::Exp | UnaryArithKind::Log => {
            return Err(CompileError::InvalidCodeGeneration(format!(
                "{} must be lowered to primitive operations before emission",
                op.mnemonic()
            )))
        }
    };
    match op {
        // Rounding conversions repeat the type suffix: cvt.rmi.f32.f32.
        UnaryArithKind::Floor | UnaryArithKind::Ceiling => {
            Ok(format!("{}.{}.{}", name, suffix, suffix))
        }
        _ => Ok(format!("{}.{}", name, suffix)),
    }
}

/// Comparison mnemonic: `setp.<rel>[u].<type>`.
pub fn compare_opcode(kind: CompareKind, prim: PrimitiveType, flags: ArithFlags) -> String {
    let relation = match kind {
        CompareKind::Equal => "eq",
        CompareKind::NotEqual => "ne",
        CompareKind::LessThan => "lt",
        CompareKind::LessEqual => "le",
        CompareKind::GreaterThan => "gt",
        CompareKind::GreaterEqual => "ge",
    };
    let unordered = prim.is_float() && flags.contains(ArithFlags::UNORDERED);
    let suffix = arith_suffix(prim, flags);
    if unordered {
        format!("setp.{}u.{}", relation, suffix)
    } else {
        format!("setp.{}.{}", relation, suffix)
    }
}

/// Atomic mnemonic: `atom<space>.<op>.<type>`.
pub fn atomic_opcode(
    op: AtomicKind,
    prim: PrimitiveType,
    space: AddressSpace,
    flags: ArithFlags,
) -> Result<String> {
    let name = match op {
        AtomicKind::Exchange => return Ok(format!("atom{}.exch.{}", space_qualifier(space), bit_suffix(prim))),
        AtomicKind::Add => "add",
        AtomicKind::And => return Ok(format!("atom{}.and.{}", space_qualifier(space), bit_suffix(prim))),
        AtomicKind::Or => return Ok(format!("atom{}.or.{}", space_qualifier(space), bit_suffix(prim))),
        AtomicKind::Xor => return Ok(format!("atom{}.xor.{}", space_qualifier(space), bit_suffix(prim))),
        AtomicKind::Min => "min",
        AtomicKind::Max => "max",
    };
    let suffix = match prim {
        PrimitiveType::Int32 => {
            if flags.contains(ArithFlags::UNSIGNED) {
                "u32"
            } else {
                "s32"
            }
        }
        PrimitiveType::Int64 => {
            if flags.contains(ArithFlags::UNSIGNED) {
                "u64"
            } else {
                "s64"
            }
        }
        PrimitiveType::Float32 if op == AtomicKind::Add => "f32",
        PrimitiveType::Float64 if op == AtomicKind::Add => "f64",
        other => {
            return Err(CompileError::NotSupported(format!(
                "atomic {} on {:?}",
                op.mnemonic(),
                other
            )))
        }
    };
    Ok(format!("atom{}.{}.{}", space_qualifier(space), name, suffix))
}

/// Special register behind a query intrinsic.
pub fn query_register(query: IntrinsicQuery) -> String {
    match query {
        IntrinsicQuery::GridIndex(dim) => format!("%ctaid.{}", dim.letter()),
        IntrinsicQuery::GridDim(dim) => format!("%nctaid.{}", dim.letter()),
        IntrinsicQuery::GroupIndex(dim) => format!("%tid.{}", dim.letter()),
        IntrinsicQuery::GroupDim(dim) => format!("%ntid.{}", dim.letter()),
        IntrinsicQuery::LaneId => "%laneid".to_string(),
    }
}

/// Membar mnemonic per scope.
pub fn membar_opcode(scope: BarrierScope) -> &'static str {
    match scope {
        BarrierScope::Group => "membar.cta;",
        BarrierScope::Device => "membar.gl;",
        BarrierScope::System => "membar.sys;",
    }
}

/// The `c` clamp operand of `shfl.sync`, computed from the shuffle width.
///
/// Widths beyond the warp size clamp to the warp size; sub-warp widths
/// encode the segment mask in bits 8..13.
pub fn shuffle_clamp(mode: ShuffleMode, width: u32, warp_size: u32) -> u32 {
    let width = width.clamp(1, warp_size);
    let segment_mask = (warp_size - width) << 8;
    match mode {
        ShuffleMode::Up => segment_mask,
        _ => segment_mask | (warp_size - 1),
    }
}

/// PTX literal for a 32-bit float (hex bit pattern form).
pub fn f32_literal(value: f32) -> String {
    format!("0f{:08X}", value.to_bits())
}

/// PTX literal for a 64-bit float.
pub fn f64_literal(value: f64) -> String {
    format!("0d{:016X}", value.to_bits())
}
