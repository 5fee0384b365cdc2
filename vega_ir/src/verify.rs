//! IR verifier
//!
//! Checks the structural invariants of a method after construction or
//! transformation: operand/use symmetry, terminator placement, φ position,
//! dominance of definitions over uses, and id uniqueness across blocks.
//! Violations are internal bugs, reported as `InvalidCodeGeneration`.

use std::collections::{HashMap, HashSet};

use vega_common::{CompileError, Result};

use crate::analysis::{Dominators, Scope};
use crate::context::IrContext;
use crate::method::MethodId;
use crate::value::{ValueId, ValueKind};

/// Verify all structural invariants of a method.
pub fn verify_method(context: &IrContext, method: MethodId) -> Result<()> {
    let scope = Scope::compute(context, method);
    let doms = Dominators::compute(context, &scope);

    let mut owner: HashMap<ValueId, usize> = HashMap::new();
    let mut positions: HashMap<ValueId, (usize, usize)> = HashMap::new();
    for (block_index, block) in scope.rpo().iter().enumerate() {
        let values = &context.block(*block).values;
        for (value_index, value) in values.iter().enumerate() {
            if owner.insert(*value, block_index).is_some() {
                return fail(format!("value {} appears in more than one block", value));
            }
            positions.insert(*value, (block_index, value_index));
        }

        // Exactly one terminator, at the tail; φs only at the head.
        let mut seen_non_phi = false;
        for (value_index, value) in values.iter().enumerate() {
            let node = context.value(*value);
            if node.kind.is_terminator() && value_index + 1 != values.len() {
                return fail(format!("terminator {} is not at the tail of {}", value, block));
            }
            if node.kind.is_phi() {
                if seen_non_phi {
                    return fail(format!("phi {} is not at the head of {}", value, block));
                }
            } else {
                seen_non_phi = true;
            }
        }
        match values.last() {
            Some(last) if context.value(*last).kind.is_terminator() => {}
            _ => return fail(format!("block {} has no terminator", block)),
        }
    }

    let params: HashSet<ValueId> = context.method(method).params.iter().copied().collect();

    for block in scope.rpo() {
        for value in &context.block(*block).values {
            let node = context.value(*value);

            // Operand/use symmetry, both directions.
            for operand in &node.operands {
                if !context.is_live(*operand) {
                    return fail(format!("{} has a dangling operand", value));
                }
                if !context.value(*operand).uses.contains(value) {
                    return fail(format!(
                        "use edge missing: {} uses {} but is not registered",
                        value, operand
                    ));
                }
            }
            for user in &node.uses {
                if !context.is_live(*user)
                    || !context.value(*user).operands.iter().any(|o| o == value)
                {
                    return fail(format!(
                        "stale use edge: {} lists {} as user",
                        value, user
                    ));
                }
            }

            // Definitions dominate uses; φ operands dominate their edge.
            match &node.kind {
                ValueKind::Phi { incoming } => {
                    if incoming.len() != node.operands.len() {
                        return fail(format!("phi {} has mismatched edges", value));
                    }
                    for (operand, pred) in node.operands.iter().zip(incoming) {
                        if params.contains(operand) || context.value(*operand).block.is_none() {
                            continue;
                        }
                        let def_block = context.value(*operand).block.expect("checked");
                        if !doms.dominates(def_block, *pred) {
                            return fail(format!(
                                "phi operand {} does not dominate edge {} -> {}",
                                operand, pred, block
                            ));
                        }
                    }
                }
                _ => {
                    for operand in &node.operands {
                        if params.contains(operand) {
                            continue;
                        }
                        let Some(def_block) = context.value(*operand).block else {
                            continue;
                        };
                        let Some(&(_, def_minor)) = positions.get(operand) else {
                            return fail(format!(
                                "{} uses {} defined outside the scope",
                                value, operand
                            ));
                        };
                        if def_block == *block {
                            let (_, use_minor) = positions[value];
                            if def_minor >= use_minor {
                                return fail(format!("{} used before defined", operand));
                            }
                        } else if !doms.dominates(def_block, *block) {
                            return fail(format!(
                                "{} does not dominate its use in {}",
                                operand, value
                            ));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn fail(message: String) -> Result<()> {
    Err(CompileError::InvalidCodeGeneration(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodDeclaration;
    use crate::transform::{KernelSpecialization, PassPipeline};
    use crate::types::PrimitiveType;
    use crate::value::{ArithFlags, BinaryArithKind, CompareKind};
    use vega_common::MethodHandle;

    #[test]
    fn test_verifies_diamond_after_pipeline() {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![i32_ty]);
        let method = context.create_method(decl).unwrap();
        {
            let mut builder = context.create_builder(method).unwrap();
            let entry = builder.create_block();
            let on_true = builder.create_block();
            let on_false = builder.create_block();
            let join = builder.create_block();

            builder.set_insert_point(entry);
            let x = builder.param(0);
            let zero = builder.int32(0);
            let condition = builder
                .compare(CompareKind::GreaterThan, ArithFlags::empty(), x, zero)
                .unwrap();
            builder.cond_branch(condition, on_true, on_false).unwrap();

            builder.set_insert_point(on_true);
            let one = builder.int32(1);
            let a = builder
                .binary(BinaryArithKind::Add, ArithFlags::empty(), x, one)
                .unwrap();
            builder.branch(join);

            builder.set_insert_point(on_false);
            let two = builder.int32(2);
            let b = builder
                .binary(BinaryArithKind::Mul, ArithFlags::empty(), x, two)
                .unwrap();
            builder.branch(join);

            builder.set_insert_point(join);
            let phi = builder.create_phi(join, i32_ty);
            builder.add_phi_incoming(phi, on_true, a);
            builder.add_phi_incoming(phi, on_false, b);
            builder.ret(Some(phi));
        }
        verify_method(&context, method).unwrap();

        let pipeline = PassPipeline::standard(KernelSpecialization::default());
        pipeline.run(&mut context, method).unwrap();
        verify_method(&context, method).unwrap();
    }

    #[test]
    fn test_detects_missing_terminator() {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![]);
        let method = context.create_method(decl).unwrap();
        {
            let mut builder = context.create_builder(method).unwrap();
            builder.create_block();
            builder.int32(1);
        }
        assert!(verify_method(&context, method).is_err());
    }
}
