//! Kernel specialization: the record and the substitution pass

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use vega_common::Result;

use crate::analysis::Scope;
use crate::builder::MethodBuilder;
use crate::transform::{Pass, PassResult};
use crate::value::{Dim, IntrinsicQuery, PrimitiveValue, ValueId, ValueKind};

bitflags! {
    /// Optional-feature bitmap of a specialization.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SpecializationFlags: u32 {
        const SHARED_MEMORY_OVERRIDE = 1 << 0;
        const FAST_MATH = 1 << 1;
    }
}

/// Compile-time-known kernel parameters that affect code generation.
///
/// Two specializations compare equal iff all fields match; the record also
/// serves as part of the kernel-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KernelSpecialization {
    pub max_group_size: Option<u32>,
    pub min_group_size: Option<u32>,
    pub shared_memory_size: Option<u32>,
    pub flags: SpecializationFlags,
}

impl KernelSpecialization {
    pub fn with_group_size(mut self, size: u32) -> Self {
        self.max_group_size = Some(size);
        self.min_group_size = Some(size);
        self
    }

    pub fn with_fast_math(mut self) -> Self {
        self.flags |= SpecializationFlags::FAST_MATH;
        self
    }

    pub fn with_shared_memory_size(mut self, bytes: u32) -> Self {
        self.shared_memory_size = Some(bytes);
        self.flags |= SpecializationFlags::SHARED_MEMORY_OVERRIDE;
        self
    }

    pub fn fast_math(&self) -> bool {
        self.flags.contains(SpecializationFlags::FAST_MATH)
    }

    /// The group size substituted into the IR, if pinned.
    pub fn pinned_group_size(&self) -> Option<u32> {
        match (self.min_group_size, self.max_group_size) {
            (Some(min), Some(max)) if min == max => Some(max),
            _ => None,
        }
    }
}

/// Substitutes specialization-known values into the IR.
pub struct Specializer {
    specialization: KernelSpecialization,
}

impl Specializer {
    pub fn new(specialization: KernelSpecialization) -> Self {
        Self { specialization }
    }
}

impl Pass for Specializer {
    fn name(&self) -> &'static str {
        "specialize"
    }

    fn run(&self, builder: &mut MethodBuilder<'_>) -> Result<PassResult> {
        let Some(group_size) = self.specialization.pinned_group_size() else {
            return Ok(PassResult::Unchanged);
        };
        let scope = Scope::compute(builder.context(), builder.method_id());
        let mut substitutions: Vec<(ValueId, i32)> = Vec::new();
        for block in scope.rpo() {
            for value in &builder.context().block(*block).values {
                if let ValueKind::Query(IntrinsicQuery::GroupDim(dim)) =
                    builder.context().value(*value).kind
                {
                    // Kernels are launched one-dimensional; Y/Z pin to 1.
                    let known = match dim {
                        Dim::X => group_size as i32,
                        Dim::Y | Dim::Z => 1,
                    };
                    substitutions.push((*value, known));
                }
            }
        }
        if substitutions.is_empty() {
            return Ok(PassResult::Unchanged);
        }
        for (value, known) in substitutions {
            let block = builder.context().value(value).block.expect("query in block");
            builder.set_insert_point(block);
            // Insert point sits at the tail; the constant is created loose
            // and replaces the query everywhere.
            let value_ty = builder.context().value(value).ty;
            let constant = builder.context_mut().alloc_value(
                value_ty,
                Some(block),
                ValueKind::Constant(PrimitiveValue::Int32(known)),
                Default::default(),
            );
            let position = builder
                .context()
                .block(block)
                .values
                .iter()
                .position(|v| *v == value)
                .expect("query is in its block");
            builder.context_mut().block_mut(block).values.insert(position, constant);
            builder.context_mut().block_mut(block).mark_dirty();
            builder.replace_all_uses(value, constant);
            builder.remove_value(value);
        }
        Ok(PassResult::Changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IrContext;
    use crate::method::MethodDeclaration;
    use crate::types::PrimitiveType;
    use vega_common::MethodHandle;

    #[test]
    fn test_specialization_equality() {
        let a = KernelSpecialization::default().with_group_size(128);
        let b = KernelSpecialization::default().with_group_size(128);
        let c = KernelSpecialization::default().with_group_size(256);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, a.with_fast_math());
    }

    #[test]
    fn test_pinned_group_size() {
        assert_eq!(
            KernelSpecialization::default()
                .with_group_size(64)
                .pinned_group_size(),
            Some(64)
        );
        let unpinned = KernelSpecialization {
            max_group_size: Some(256),
            ..Default::default()
        };
        assert_eq!(unpinned.pinned_group_size(), None);
    }

    #[test]
    fn test_group_dim_substitution() {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![]);
        let method = context.create_method(decl).unwrap();
        {
            let mut builder = context.create_builder(method).unwrap();
            builder.create_block();
            let dim = builder.query(IntrinsicQuery::GroupDim(Dim::X));
            builder.ret(Some(dim));
        }
        {
            let mut builder = context.create_builder(method).unwrap();
            let pass = Specializer::new(KernelSpecialization::default().with_group_size(128));
            let result = pass.run(&mut builder).unwrap();
            assert_eq!(result, PassResult::Changed);
        }
        let entry = context.method(method).entry.unwrap();
        let ret = context.terminator(entry).unwrap();
        let returned = context.value(ret).operands[0];
        assert_eq!(
            context.value(returned).as_constant(),
            Some(PrimitiveValue::Int32(128))
        );
    }
}
