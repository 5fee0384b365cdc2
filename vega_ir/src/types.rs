//! Type system for the Vega IR
//!
//! Types form an interned DAG owned by an [`IrContext`](crate::IrContext):
//! structurally equal shapes always map to the same [`TypeId`], so type
//! equality is id equality everywhere downstream.

use std::fmt;
use serde::{Deserialize, Serialize};

/// Identity of an interned type within one IR context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Memory region class for pointers and views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Generic,
    Global,
    Shared,
    Local,
    Constant,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpace::Generic => write!(f, "generic"),
            AddressSpace::Global => write!(f, "global"),
            AddressSpace::Shared => write!(f, "shared"),
            AddressSpace::Local => write!(f, "local"),
            AddressSpace::Constant => write!(f, "constant"),
        }
    }
}

/// Scalar types representable in a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Int1,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Void,
}

impl PrimitiveType {
    /// Bit width of the type; 1 for `Int1`, 0 for `Void`.
    pub fn bits(self) -> u32 {
        match self {
            PrimitiveType::Int1 => 1,
            PrimitiveType::Int8 => 8,
            PrimitiveType::Int16 => 16,
            PrimitiveType::Int32 => 32,
            PrimitiveType::Int64 => 64,
            PrimitiveType::Float32 => 32,
            PrimitiveType::Float64 => 64,
            PrimitiveType::Void => 0,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int1
                | PrimitiveType::Int8
                | PrimitiveType::Int16
                | PrimitiveType::Int32
                | PrimitiveType::Int64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveType::Float32 | PrimitiveType::Float64)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::Int1 => write!(f, "i1"),
            PrimitiveType::Int8 => write!(f, "i8"),
            PrimitiveType::Int16 => write!(f, "i16"),
            PrimitiveType::Int32 => write!(f, "i32"),
            PrimitiveType::Int64 => write!(f, "i64"),
            PrimitiveType::Float32 => write!(f, "f32"),
            PrimitiveType::Float64 => write!(f, "f64"),
            PrimitiveType::Void => write!(f, "void"),
        }
    }
}

/// Structural shape of a type; the interning key inside the context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive(PrimitiveType),
    Pointer {
        element: TypeId,
        space: AddressSpace,
    },
    /// A pointer plus an `i32` length describing a contiguous region.
    View {
        element: TypeId,
        space: AddressSpace,
    },
    Array {
        element: TypeId,
        dimensions: u32,
    },
    Structure {
        fields: Vec<TypeId>,
    },
}

impl TypeKind {
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeKind::Primitive(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeKind::Pointer { .. })
    }

    pub fn is_view(&self) -> bool {
        matches!(self, TypeKind::View { .. })
    }

    pub fn is_structure(&self) -> bool {
        matches!(self, TypeKind::Structure { .. })
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            TypeKind::Primitive(prim) => Some(*prim),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_bits() {
        assert_eq!(PrimitiveType::Int1.bits(), 1);
        assert_eq!(PrimitiveType::Int64.bits(), 64);
        assert_eq!(PrimitiveType::Float32.bits(), 32);
        assert_eq!(PrimitiveType::Void.bits(), 0);
    }

    #[test]
    fn test_primitive_classification() {
        assert!(PrimitiveType::Int8.is_int());
        assert!(!PrimitiveType::Float64.is_int());
        assert!(PrimitiveType::Float32.is_float());
        assert!(!PrimitiveType::Void.is_float());
    }

    #[test]
    fn test_address_space_display() {
        assert_eq!(AddressSpace::Global.to_string(), "global");
        assert_eq!(AddressSpace::Shared.to_string(), "shared");
    }
}
