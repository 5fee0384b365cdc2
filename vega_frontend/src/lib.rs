//! Bytecode to IR lifting for the Vega kernel compiler
//!
//! The frontend consumes the typed stack-machine bytecode a
//! [`BytecodeResolver`] hands out for a method handle and produces SSA IR:
//! an evaluation stack and local map are simulated per block, join points
//! receive φ-nodes, intrinsic calls lower to dedicated IR nodes, and other
//! callees are compiled recursively.

pub mod bytecode;
pub mod intrinsics;
pub mod lift;

pub use bytecode::{
    BinOp, BytecodeMethod, BytecodeMethodFlags, BytecodeResolver, BytecodeType, CmpOp, Literal,
    OpCode, ScalarType, UnOp,
};
pub use intrinsics::Intrinsic;
pub use lift::Frontend;
