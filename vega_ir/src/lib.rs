//! SSA intermediate representation for the Vega kernel compiler
//!
//! Kernel methods are lowered into this IR by the frontend, rewritten by
//! the transformation passes, and walked by the backends. A single
//! [`IrContext`] owns every type, method, block and value of a
//! compilation; all mutation goes through the exclusive per-method
//! [`MethodBuilder`].

pub mod abi;
pub mod analysis;
pub mod block;
pub mod builder;
pub mod context;
pub mod dump;
pub mod fold;
pub mod method;
pub mod transform;
pub mod types;
pub mod value;
pub mod verify;

pub use abi::TargetAbi;
pub use block::{Block, BlockId};
pub use builder::MethodBuilder;
pub use context::IrContext;
pub use dump::{dump_method, type_to_string};
pub use method::{Method, MethodDeclaration, MethodFlags, MethodId, TransformFlags};
pub use transform::{
    ConstantFolder, DeadCodeElim, Inliner, KernelSpecialization, Mem2Reg, Pass, PassPipeline,
    PassResult, SimplifyCfg, SpecializationFlags, Specializer,
};
pub use types::{AddressSpace, PrimitiveType, TypeId, TypeKind};
pub use value::{
    ArithFlags, AtomicKind, BarrierScope, BinaryArithKind, CompareKind, Dim, IntrinsicQuery,
    PrimitiveValue, ShuffleMode, TernaryArithKind, UnaryArithKind, Value, ValueId, ValueKind,
};
pub use verify::verify_method;
