//! IR type to OpenCL C type-name generation
//!
//! Keeps a bijection between IR types and their rendered names; structure
//! types get a typedef emitted once and are referred to by that name
//! everywhere else.

use std::collections::HashMap;

use vega_common::{CompileError, Result};
use vega_ir::{AddressSpace, IrContext, PrimitiveType, TypeId, TypeKind};

pub struct TypeGenerator {
    names: HashMap<TypeId, String>,
    typedefs: Vec<String>,
}

impl TypeGenerator {
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            typedefs: Vec::new(),
        }
    }

    /// The typedef block to print at the top of the module.
    pub fn typedefs(&self) -> &[String] {
        &self.typedefs
    }

    pub fn scalar_name(prim: PrimitiveType) -> &'static str {
        match prim {
            PrimitiveType::Int1 => "bool",
            PrimitiveType::Int8 => "char",
            PrimitiveType::Int16 => "short",
            PrimitiveType::Int32 => "int",
            PrimitiveType::Int64 => "long",
            PrimitiveType::Float32 => "float",
            PrimitiveType::Float64 => "double",
            PrimitiveType::Void => "void",
        }
    }

    pub fn unsigned_scalar_name(prim: PrimitiveType) -> &'static str {
        match prim {
            PrimitiveType::Int8 => "uchar",
            PrimitiveType::Int16 => "ushort",
            PrimitiveType::Int32 => "uint",
            PrimitiveType::Int64 => "ulong",
            other => Self::scalar_name(other),
        }
    }

    pub fn space_qualifier(space: AddressSpace) -> &'static str {
        match space {
            AddressSpace::Generic => "",
            AddressSpace::Global => "__global ",
            AddressSpace::Shared => "__local ",
            AddressSpace::Local => "__private ",
            AddressSpace::Constant => "__constant ",
        }
    }

    /// Rendered name of a type; registers a typedef for new structures.
    ///
    /// Views have no single name (they travel as a pointer and a length)
    /// and are rejected here.
    pub fn name(&mut self, context: &IrContext, ty: TypeId) -> Result<String> {
        if let Some(name) = self.names.get(&ty) {
            return Ok(name.clone());
        }
        let name = match context.type_kind(ty) {
            TypeKind::Primitive(prim) => Self::scalar_name(*prim).to_string(),
            TypeKind::Pointer { element, space } => {
                let (element, space) = (*element, *space);
                let inner = self.name(context, element)?;
                format!("{}{}*", Self::space_qualifier(space), inner)
            }
            TypeKind::View { .. } => {
                return Err(CompileError::InvalidCodeGeneration(
                    "views are decomposed before type naming".to_string(),
                ))
            }
            TypeKind::Array { .. } => {
                return Err(CompileError::NotSupported(
                    "array-typed values in OpenCL output".to_string(),
                ))
            }
            TypeKind::Structure { fields } => {
                let fields = fields.clone();
                let name = format!("struct_t{}", ty.0);
                let mut body = String::new();
                for (index, field) in fields.iter().enumerate() {
                    let field_name = self.name(context, *field)?;
                    body.push_str(&format!(" {} _f{};", field_name, index));
                }
                self.typedefs
                    .push(format!("typedef struct {{{} }} {};", body, name));
                name
            }
        };
        self.names.insert(ty, name.clone());
        Ok(name)
    }
}

impl Default for TypeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_and_pointer_names() {
        let mut context = IrContext::new();
        let mut generator = TypeGenerator::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let ptr = context.pointer_type(i32_ty, AddressSpace::Global);
        assert_eq!(generator.name(&context, i32_ty).unwrap(), "int");
        assert_eq!(generator.name(&context, ptr).unwrap(), "__global int*");
    }

    #[test]
    fn test_structure_typedef_emitted_once() {
        let mut context = IrContext::new();
        let mut generator = TypeGenerator::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let i64_ty = context.primitive_type(PrimitiveType::Int64);
        let st = context.structure_type(vec![i32_ty, i64_ty]);
        let first = generator.name(&context, st).unwrap();
        let second = generator.name(&context, st).unwrap();
        assert_eq!(first, second);
        assert_eq!(generator.typedefs().len(), 1);
        assert!(generator.typedefs()[0].contains("_f0"));
        assert!(generator.typedefs()[0].contains("_f1"));
    }
}
