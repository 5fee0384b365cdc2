//! SSA values of the Vega IR
//!
//! Every node in a method body is a [`Value`]: constants, arithmetic,
//! memory operations, terminators and φ-nodes alike. Values live in an
//! arena owned by the context and reference each other by [`ValueId`];
//! operand edges are mirrored by reverse use edges, and the builder is the
//! only place that maintains that symmetry.

use std::collections::BTreeSet;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::block::BlockId;
use crate::method::MethodId;
use crate::types::{PrimitiveType, TypeId};

/// Identity of a value within one IR context.
///
/// Ids are unique per context and strictly increase in creation order,
/// which makes them the total order used wherever iteration order matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A typed literal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveValue {
    Int1(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl PrimitiveValue {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            PrimitiveValue::Int1(_) => PrimitiveType::Int1,
            PrimitiveValue::Int8(_) => PrimitiveType::Int8,
            PrimitiveValue::Int16(_) => PrimitiveType::Int16,
            PrimitiveValue::Int32(_) => PrimitiveType::Int32,
            PrimitiveValue::Int64(_) => PrimitiveType::Int64,
            PrimitiveValue::Float32(_) => PrimitiveType::Float32,
            PrimitiveValue::Float64(_) => PrimitiveType::Float64,
        }
    }

    /// The raw bits widened to 64, sign-extended for signed integers.
    pub fn raw_bits(&self) -> u64 {
        match self {
            PrimitiveValue::Int1(b) => *b as u64,
            PrimitiveValue::Int8(v) => *v as i64 as u64,
            PrimitiveValue::Int16(v) => *v as i64 as u64,
            PrimitiveValue::Int32(v) => *v as i64 as u64,
            PrimitiveValue::Int64(v) => *v as u64,
            PrimitiveValue::Float32(v) => v.to_bits() as u64,
            PrimitiveValue::Float64(v) => v.to_bits(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            PrimitiveValue::Int1(b) => !*b,
            PrimitiveValue::Int8(v) => *v == 0,
            PrimitiveValue::Int16(v) => *v == 0,
            PrimitiveValue::Int32(v) => *v == 0,
            PrimitiveValue::Int64(v) => *v == 0,
            PrimitiveValue::Float32(v) => *v == 0.0,
            PrimitiveValue::Float64(v) => *v == 0.0,
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Int1(b) => write!(f, "{}:i1", *b as u8),
            PrimitiveValue::Int8(v) => write!(f, "{}:i8", v),
            PrimitiveValue::Int16(v) => write!(f, "{}:i16", v),
            PrimitiveValue::Int32(v) => write!(f, "{}:i32", v),
            PrimitiveValue::Int64(v) => write!(f, "{}:i64", v),
            PrimitiveValue::Float32(v) => write!(f, "{}:f32", v),
            PrimitiveValue::Float64(v) => write!(f, "{}:f64", v),
        }
    }
}

bitflags! {
    /// Modifier flags on arithmetic, compare and convert operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArithFlags: u32 {
        /// Treat integer operands as unsigned.
        const UNSIGNED = 1 << 0;
        /// Permit reassociation and approximate float instructions.
        const FAST_MATH = 1 << 1;
        /// Float compares return true when either operand is NaN.
        const UNORDERED = 1 << 2;
    }
}

/// Unary arithmetic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryArithKind {
    Neg,
    Not,
    Abs,
    Sqrt,
    Rsqrt,
    Sin,
    Cos,
    Tanh,
    Exp,
    Exp2,
    Log,
    Log2,
    Floor,
    Ceiling,
}

impl UnaryArithKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryArithKind::Neg => "neg",
            UnaryArithKind::Not => "not",
            UnaryArithKind::Abs => "abs",
            UnaryArithKind::Sqrt => "sqrt",
            UnaryArithKind::Rsqrt => "rsqrt",
            UnaryArithKind::Sin => "sin",
            UnaryArithKind::Cos => "cos",
            UnaryArithKind::Tanh => "tanh",
            UnaryArithKind::Exp => "exp",
            UnaryArithKind::Exp2 => "exp2",
            UnaryArithKind::Log => "log",
            UnaryArithKind::Log2 => "log2",
            UnaryArithKind::Floor => "floor",
            UnaryArithKind::Ceiling => "ceil",
        }
    }
}

/// Binary arithmetic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryArithKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Min,
    Max,
    Pow,
    Atan2,
    CopySign,
}

impl BinaryArithKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryArithKind::Add => "add",
            BinaryArithKind::Sub => "sub",
            BinaryArithKind::Mul => "mul",
            BinaryArithKind::Div => "div",
            BinaryArithKind::Rem => "rem",
            BinaryArithKind::And => "and",
            BinaryArithKind::Or => "or",
            BinaryArithKind::Xor => "xor",
            BinaryArithKind::Shl => "shl",
            BinaryArithKind::Shr => "shr",
            BinaryArithKind::Min => "min",
            BinaryArithKind::Max => "max",
            BinaryArithKind::Pow => "pow",
            BinaryArithKind::Atan2 => "atan2",
            BinaryArithKind::CopySign => "copysign",
        }
    }
}

/// Ternary arithmetic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TernaryArithKind {
    /// Fused multiply-add: `a * b + c`.
    MultiplyAdd,
}

impl TernaryArithKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            TernaryArithKind::MultiplyAdd => "fma",
        }
    }
}

/// The six comparison relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl CompareKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CompareKind::Equal => "eq",
            CompareKind::NotEqual => "ne",
            CompareKind::LessThan => "lt",
            CompareKind::LessEqual => "le",
            CompareKind::GreaterThan => "gt",
            CompareKind::GreaterEqual => "ge",
        }
    }

    /// The relation with operand order swapped.
    pub fn swapped(self) -> Self {
        match self {
            CompareKind::Equal => CompareKind::Equal,
            CompareKind::NotEqual => CompareKind::NotEqual,
            CompareKind::LessThan => CompareKind::GreaterThan,
            CompareKind::LessEqual => CompareKind::GreaterEqual,
            CompareKind::GreaterThan => CompareKind::LessThan,
            CompareKind::GreaterEqual => CompareKind::LessEqual,
        }
    }
}

/// Atomic read-modify-write kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicKind {
    Exchange,
    Add,
    And,
    Or,
    Xor,
    Min,
    Max,
}

impl AtomicKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            AtomicKind::Exchange => "exch",
            AtomicKind::Add => "add",
            AtomicKind::And => "and",
            AtomicKind::Or => "or",
            AtomicKind::Xor => "xor",
            AtomicKind::Min => "min",
            AtomicKind::Max => "max",
        }
    }
}

/// Scope of a memory barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierScope {
    Group,
    Device,
    System,
}

/// Warp shuffle addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShuffleMode {
    /// Read from an absolute lane index.
    Idx,
    /// Read from the lane `delta` below the current one.
    Up,
    /// Read from the lane `delta` above the current one.
    Down,
    /// Read from the lane with index `lane ^ mask`.
    Xor,
}

impl ShuffleMode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ShuffleMode::Idx => "idx",
            ShuffleMode::Up => "up",
            ShuffleMode::Down => "down",
            ShuffleMode::Xor => "bfly",
        }
    }
}

/// A grid/group dimension axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    X,
    Y,
    Z,
}

impl Dim {
    pub fn letter(self) -> char {
        match self {
            Dim::X => 'x',
            Dim::Y => 'y',
            Dim::Z => 'z',
        }
    }
}

/// Device intrinsic queries without operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicQuery {
    /// Index of the group within the grid.
    GridIndex(Dim),
    /// Number of groups in the grid.
    GridDim(Dim),
    /// Index of the thread within its group.
    GroupIndex(Dim),
    /// Number of threads in a group.
    GroupDim(Dim),
    /// Lane index within the warp.
    LaneId,
}

/// The node kind of an IR value.
///
/// Operands are stored uniformly on the [`Value`]; the variant payload holds
/// only the data that is not an operand edge.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    /// A typed literal.
    Constant(PrimitiveValue),
    /// Null of any pointer, view or structure type.
    Null,
    /// Result of an operation with no defined value, e.g. integer division
    /// by a constant zero.
    Poison,
    /// Global string constant; used for diagnostics output on the device.
    StringConstant(String),
    /// Size of a type under the target ABI; folded before emission.
    SizeOf(TypeId),

    /// Method parameter `index`; not attached to any block.
    Parameter { index: usize },

    UnaryArith {
        op: UnaryArithKind,
        flags: ArithFlags,
    },
    BinaryArith {
        op: BinaryArithKind,
        flags: ArithFlags,
    },
    TernaryArith {
        op: TernaryArithKind,
        flags: ArithFlags,
    },
    Compare {
        kind: CompareKind,
        flags: ArithFlags,
    },
    /// Numeric conversion to the value's type.
    Convert { flags: ArithFlags },
    /// Reinterpret a pointer as a pointer of another type/space.
    PointerCast,
    /// Bit-preserving reinterpretation between floats and same-width ints.
    BitCast,

    /// Load from the address operand.
    Load,
    /// Store the value operand to the address operand.
    Store,
    /// Stack slot of the value's pointee type.
    Alloca { space: crate::types::AddressSpace },
    MemoryBarrier { scope: BarrierScope },

    /// Address of an element of the view or pointer operand; operands are
    /// (source, index).
    LoadElementAddress,
    /// Read field `index` of the structure operand.
    GetField { index: usize },
    /// Replace field `index` of the structure operand, yielding the
    /// updated structure value.
    SetField { index: usize },
    /// Address of field `index` behind the pointer operand.
    LoadFieldAddress { index: usize },

    /// `atom.<op>` with operands (address, value).
    AtomicRmw {
        op: AtomicKind,
        flags: ArithFlags,
    },
    /// Compare-and-swap with operands (address, compare, value).
    AtomicCas,

    /// Unconditional branch.
    Branch { target: BlockId },
    /// Two-way branch on the `i1` condition operand.
    ConditionalBranch {
        true_target: BlockId,
        false_target: BlockId,
    },
    /// Multi-way branch on the integer operand; `targets[i]` is taken for
    /// value `i`, anything else goes to `default`.
    Switch {
        targets: Vec<BlockId>,
        default: BlockId,
    },
    /// Return; the operand, if any, is the return value.
    Return,

    /// φ-node; operand `i` flows in from `incoming[i]`.
    Phi { incoming: Vec<BlockId> },

    /// Call of another method in the same context; operands are arguments.
    Call { target: MethodId },

    /// Grid/group/lane query intrinsic.
    Query(IntrinsicQuery),
    /// Warp shuffle with operands (value, origin); `width` selects a
    /// sub-warp segment.
    WarpShuffle { mode: ShuffleMode, width: u32 },
    /// Group-wide execution barrier.
    Barrier,
}

impl ValueKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            ValueKind::Branch { .. }
                | ValueKind::ConditionalBranch { .. }
                | ValueKind::Switch { .. }
                | ValueKind::Return
        )
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            ValueKind::Constant(_) | ValueKind::Null | ValueKind::Poison
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, ValueKind::Phi { .. })
    }

    /// Values that must survive dead-code elimination even with zero uses.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            ValueKind::Store
                | ValueKind::MemoryBarrier { .. }
                | ValueKind::AtomicRmw { .. }
                | ValueKind::AtomicCas
                | ValueKind::Call { .. }
                | ValueKind::Barrier
        ) || self.is_terminator()
    }

    /// Successor blocks if this kind is a terminator.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            ValueKind::Branch { target } => vec![*target],
            ValueKind::ConditionalBranch {
                true_target,
                false_target,
            } => vec![*true_target, *false_target],
            ValueKind::Switch { targets, default } => {
                let mut successors = targets.clone();
                successors.push(*default);
                successors
            }
            _ => Vec::new(),
        }
    }
}

/// One SSA node.
#[derive(Debug, Clone)]
pub struct Value {
    pub id: ValueId,
    pub ty: TypeId,
    /// Parent block; `None` for parameters.
    pub block: Option<BlockId>,
    pub kind: ValueKind,
    /// Ordered operand edges.
    pub operands: SmallVec<[ValueId; 3]>,
    /// Reverse edges: every value that has `self` as an operand.
    /// BTreeSet keeps iteration in id order.
    pub uses: BTreeSet<ValueId>,
}

impl Value {
    pub fn operand(&self, index: usize) -> ValueId {
        self.operands[index]
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn as_constant(&self) -> Option<PrimitiveValue> {
        match &self.kind {
            ValueKind::Constant(value) => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_classification() {
        assert!(ValueKind::Return.is_terminator());
        assert!(ValueKind::Branch {
            target: BlockId(0)
        }
        .is_terminator());
        assert!(!ValueKind::Load.is_terminator());
        assert!(!ValueKind::Phi {
            incoming: Vec::new()
        }
        .is_terminator());
    }

    #[test]
    fn test_side_effects() {
        assert!(ValueKind::Store.has_side_effects());
        assert!(ValueKind::Barrier.has_side_effects());
        assert!(ValueKind::Return.has_side_effects());
        assert!(!ValueKind::Load.has_side_effects());
        assert!(!ValueKind::BinaryArith {
            op: BinaryArithKind::Add,
            flags: ArithFlags::empty()
        }
        .has_side_effects());
    }

    #[test]
    fn test_successors() {
        let kind = ValueKind::ConditionalBranch {
            true_target: BlockId(1),
            false_target: BlockId(2),
        };
        assert_eq!(kind.successors(), vec![BlockId(1), BlockId(2)]);
        assert!(ValueKind::Return.successors().is_empty());
    }

    #[test]
    fn test_primitive_value_bits() {
        assert_eq!(PrimitiveValue::Int8(-1).raw_bits(), u64::MAX);
        assert_eq!(PrimitiveValue::Int32(7).raw_bits(), 7);
        assert!(PrimitiveValue::Float64(0.0).is_zero());
        assert!(!PrimitiveValue::Float64(1.5).is_zero());
    }
}
