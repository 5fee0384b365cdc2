//! The host bytecode model
//!
//! A stack-machine instruction list with explicit branch offsets, plus the
//! typed method description the resolver hands out. Serde-serializable so
//! test fixtures can be written inline.

use serde::{Deserialize, Serialize};

use vega_common::MethodHandle;

/// Scalar value categories of the host language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

/// Types as the host reflection layer describes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BytecodeType {
    Void,
    Scalar(ScalarType),
    /// A device view over global memory.
    View(ScalarType),
    Struct(Vec<BytecodeType>),
}

/// Literals carried by `Const`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

/// Two-operand arithmetic opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
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
}

/// One-operand arithmetic opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    Abs,
    Sqrt,
}

/// Comparison relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One bytecode instruction. Branch operands are instruction offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpCode {
    /// Push argument `n`.
    LoadArg(u16),
    /// Push local `n`.
    LoadLocal(u16),
    /// Pop into local `n`.
    StoreLocal(u16),
    /// Push the address of local `n` (demotes it to a memory slot).
    LocalAddress(u16),
    /// Push a literal.
    Const(Literal),
    Dup,
    Pop,

    Binary { op: BinOp, unsigned: bool },
    Unary(UnOp),
    Compare { op: CmpOp, unsigned: bool },
    /// Pop, convert to `to`, push.
    Convert { to: ScalarType, unsigned: bool },

    /// Pop (view, index); push the element.
    LoadElement,
    /// Pop (view, index, value); store the element.
    StoreElement,
    /// Pop a view; push its length.
    ViewLength,
    /// Pop a struct; push field `n`.
    LoadField(u16),
    /// Pop (struct, value); push the updated struct.
    StoreField(u16),
    /// Pop an address; push the loaded value.
    LoadIndirect,
    /// Pop (address, value).
    StoreIndirect,

    /// Unconditional jump.
    Branch(u32),
    /// Pop a bool; jump when true, else fall through.
    BranchIf(u32),
    /// Pop a bool; jump when false, else fall through.
    BranchIfNot(u32),
    /// Pop an i32 selector; jump to `targets[selector]`, else `default`.
    Switch { targets: Vec<u32>, default: u32 },
    /// Call the method behind `token`; pops the arguments, pushes the
    /// result if any.
    Call { token: u64 },
    /// Pop the return value (if the method is non-void) and return.
    Return,
}

impl OpCode {
    /// Offsets this instruction can transfer control to (explicit targets
    /// only; fallthrough is implied).
    pub fn branch_targets(&self) -> Vec<u32> {
        match self {
            OpCode::Branch(target) | OpCode::BranchIf(target) | OpCode::BranchIfNot(target) => {
                vec![*target]
            }
            OpCode::Switch { targets, default } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }

    /// Whether control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            OpCode::Branch(_) | OpCode::Switch { .. } | OpCode::Return
        )
    }
}

/// Properties the host reflection layer reports for a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BytecodeMethodFlags {
    pub no_inlining: bool,
    pub aggressive_inlining: bool,
    pub external: bool,
}

/// A method as delivered by the resolver: typed signature, local slots and
/// the instruction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeMethod {
    pub handle: MethodHandle,
    pub param_types: Vec<BytecodeType>,
    pub return_type: BytecodeType,
    pub local_types: Vec<BytecodeType>,
    pub code: Vec<OpCode>,
    pub flags: BytecodeMethodFlags,
}

/// Supplies bytecode for method handles; the host runtime implements this.
pub trait BytecodeResolver {
    fn resolve(&self, token: u64) -> Option<&BytecodeMethod>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_branch_targets() {
        assert_eq!(OpCode::Branch(4).branch_targets(), vec![4]);
        assert_eq!(
            OpCode::Switch {
                targets: vec![2, 4],
                default: 6
            }
            .branch_targets(),
            vec![2, 4, 6]
        );
        assert!(OpCode::Pop.branch_targets().is_empty());
    }

    #[test]
    fn test_flow_termination() {
        assert!(OpCode::Return.ends_flow());
        assert!(OpCode::Branch(0).ends_flow());
        assert!(!OpCode::BranchIf(0).ends_flow());
    }

    #[test]
    fn test_method_roundtrips_through_serde() {
        let method = BytecodeMethod {
            handle: MethodHandle::new(1, "k"),
            param_types: vec![BytecodeType::Scalar(ScalarType::I32)],
            return_type: BytecodeType::Void,
            local_types: vec![],
            code: vec![OpCode::Return],
            flags: BytecodeMethodFlags::default(),
        };
        let json = serde_json::to_string(&method).unwrap();
        let back: BytecodeMethod = serde_json::from_str(&json).unwrap();
        assert_eq!(method, back);
    }
}
