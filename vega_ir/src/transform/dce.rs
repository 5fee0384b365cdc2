//! Dead-code elimination

use vega_common::Result;

use crate::analysis::Scope;
use crate::builder::MethodBuilder;
use crate::transform::{Pass, PassResult};
use crate::value::ValueId;

/// Removes values with zero uses and no side effects.
///
/// Stores, atomics, barriers, calls and terminators are never dead.
pub struct DeadCodeElim;

impl Pass for DeadCodeElim {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&self, builder: &mut MethodBuilder<'_>) -> Result<PassResult> {
        let mut changed = false;
        // Removing a value can strand its operands, so sweep to a local
        // fixed point.
        loop {
            let scope = Scope::compute(builder.context(), builder.method_id());
            let mut dead: Vec<ValueId> = Vec::new();
            for block in scope.rpo() {
                for value in &builder.context().block(*block).values {
                    let node = builder.context().value(*value);
                    if node.uses.is_empty() && !node.kind.has_side_effects() {
                        dead.push(*value);
                    }
                }
            }
            if dead.is_empty() {
                break;
            }
            for value in dead {
                builder.remove_value(value);
            }
            changed = true;
        }
        Ok(PassResult::from_flag(changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IrContext;
    use crate::method::MethodDeclaration;
    use crate::types::{AddressSpace, PrimitiveType};
    use crate::value::{ArithFlags, BinaryArithKind};
    use vega_common::MethodHandle;

    #[test]
    fn test_unused_chain_removed_stores_kept() {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let ptr_ty = context.pointer_type(i32_ty, AddressSpace::Global);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![i32_ty, ptr_ty]);
        let method = context.create_method(decl).unwrap();
        {
            let mut builder = context.create_builder(method).unwrap();
            builder.create_block();
            let x = builder.param(0);
            let address = builder.param(1);
            // Dead chain: (x + x) * x, never used.
            let sum = builder
                .binary(BinaryArithKind::Add, ArithFlags::empty(), x, x)
                .unwrap();
            let _dead = builder
                .binary(BinaryArithKind::Mul, ArithFlags::empty(), sum, x)
                .unwrap();
            // A store is never dead.
            builder.store(address, x).unwrap();
            builder.ret(Some(x));
        }
        {
            let mut builder = context.create_builder(method).unwrap();
            let result = DeadCodeElim.run(&mut builder).unwrap();
            assert_eq!(result, PassResult::Changed);
        }
        let entry = context.method(method).entry.unwrap();
        // Only the store and the return remain.
        assert_eq!(context.block(entry).values.len(), 2);
    }
}
