//! Target ABI: sizes, alignments and structure field offsets
//!
//! The lowering of structure access and the parameter layout of kernel entry
//! points both depend on these rules, so the ABI travels with the backend
//! descriptor rather than being baked into the type system.

use serde::{Deserialize, Serialize};

use crate::context::IrContext;
use crate::types::{PrimitiveType, TypeId, TypeKind};

/// Alignment and size rules for one target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAbi {
    /// Size of a pointer in bytes.
    pub pointer_size: u32,
    /// Alignment of a pointer in bytes.
    pub pointer_align: u32,
    /// Number of lanes in a warp; used for shuffle masks.
    pub warp_size: u32,
}

impl TargetAbi {
    /// ABI of NVIDIA PTX targets: 64-bit pointers, 32-lane warps.
    pub fn ptx() -> Self {
        Self {
            pointer_size: 8,
            pointer_align: 8,
            warp_size: 32,
        }
    }

    /// ABI of OpenCL C targets.
    pub fn opencl() -> Self {
        Self {
            pointer_size: 8,
            pointer_align: 8,
            warp_size: 32,
        }
    }

    /// Size in bytes of a type under this ABI.
    pub fn size_of(&self, context: &IrContext, ty: TypeId) -> u32 {
        match context.type_kind(ty) {
            TypeKind::Primitive(prim) => primitive_size(*prim),
            TypeKind::Pointer { .. } => self.pointer_size,
            // A view is a pointer plus an i32 length, padded to pointer
            // alignment.
            TypeKind::View { .. } => align_up(self.pointer_size + 4, self.pointer_align),
            TypeKind::Array { element, dimensions } => {
                self.size_of(context, *element) * (*dimensions).max(1)
            }
            TypeKind::Structure { fields } => {
                let fields = fields.clone();
                let mut offset = 0;
                for field in &fields {
                    let align = self.align_of(context, *field);
                    offset = align_up(offset, align) + self.size_of(context, *field);
                }
                align_up(offset, self.align_of(context, ty))
            }
        }
    }

    /// Alignment in bytes of a type under this ABI.
    pub fn align_of(&self, context: &IrContext, ty: TypeId) -> u32 {
        match context.type_kind(ty) {
            TypeKind::Primitive(prim) => primitive_size(*prim).max(1),
            TypeKind::Pointer { .. } | TypeKind::View { .. } => self.pointer_align,
            TypeKind::Array { element, .. } => self.align_of(context, *element),
            TypeKind::Structure { fields } => {
                let fields = fields.clone();
                fields
                    .iter()
                    .map(|field| self.align_of(context, *field))
                    .max()
                    .unwrap_or(1)
            }
        }
    }

    /// Byte offsets of all fields of a structure type, in declaration order.
    pub fn field_offsets(&self, context: &IrContext, ty: TypeId) -> Vec<u32> {
        let fields = match context.type_kind(ty) {
            TypeKind::Structure { fields } => fields.clone(),
            _ => return Vec::new(),
        };
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for field in &fields {
            let align = self.align_of(context, *field);
            offset = align_up(offset, align);
            offsets.push(offset);
            offset += self.size_of(context, *field);
        }
        offsets
    }

    /// Offset of a single structure field.
    pub fn field_offset(&self, context: &IrContext, ty: TypeId, index: usize) -> u32 {
        self.field_offsets(context, ty)
            .get(index)
            .copied()
            .unwrap_or(0)
    }
}

fn primitive_size(prim: PrimitiveType) -> u32 {
    match prim {
        PrimitiveType::Int1 | PrimitiveType::Int8 => 1,
        PrimitiveType::Int16 => 2,
        PrimitiveType::Int32 | PrimitiveType::Float32 => 4,
        PrimitiveType::Int64 | PrimitiveType::Float64 => 8,
        PrimitiveType::Void => 0,
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        return value;
    }
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IrContext;

    #[test]
    fn test_primitive_sizes() {
        let context = IrContext::new();
        let abi = TargetAbi::ptx();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let f64_ty = context.primitive_type(PrimitiveType::Float64);
        assert_eq!(abi.size_of(&context, i32_ty), 4);
        assert_eq!(abi.size_of(&context, f64_ty), 8);
    }

    #[test]
    fn test_struct_offsets_with_padding() {
        let mut context = IrContext::new();
        let abi = TargetAbi::ptx();
        let i8_ty = context.primitive_type(PrimitiveType::Int8);
        let i64_ty = context.primitive_type(PrimitiveType::Int64);
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let st = context.intern_type(TypeKind::Structure {
            fields: vec![i8_ty, i64_ty, i32_ty],
        });

        // i8 at 0, i64 padded to 8, i32 at 16, total padded to 24.
        assert_eq!(abi.field_offsets(&context, st), vec![0, 8, 16]);
        assert_eq!(abi.size_of(&context, st), 24);
        assert_eq!(abi.align_of(&context, st), 8);
    }

    #[test]
    fn test_view_layout() {
        let mut context = IrContext::new();
        let abi = TargetAbi::ptx();
        let f32_ty = context.primitive_type(PrimitiveType::Float32);
        let view = context.intern_type(TypeKind::View {
            element: f32_ty,
            space: crate::types::AddressSpace::Global,
        });
        // pointer + i32 length, padded to pointer alignment
        assert_eq!(abi.size_of(&context, view), 16);
    }
}
