//! Control-flow simplification
//!
//! Removes unreachable blocks, folds branches on constant conditions,
//! merges straight-line block chains and forwards empty blocks.

use vega_common::Result;

use crate::analysis::Scope;
use crate::block::BlockId;
use crate::builder::MethodBuilder;
use crate::transform::{Pass, PassResult};
use crate::value::{PrimitiveValue, ValueId, ValueKind};

pub struct SimplifyCfg;

impl Pass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run(&self, builder: &mut MethodBuilder<'_>) -> Result<PassResult> {
        let mut changed = false;
        loop {
            let step = remove_unreachable(builder)
                || fold_constant_branches(builder)
                || merge_chains(builder)
                || forward_empty_blocks(builder);
            if !step {
                break;
            }
            changed = true;
        }
        Ok(PassResult::from_flag(changed))
    }
}

fn phis_of(builder: &MethodBuilder<'_>, block: BlockId) -> Vec<ValueId> {
    builder
        .context()
        .block(block)
        .values
        .iter()
        .copied()
        .filter(|value| builder.context().value(*value).kind.is_phi())
        .collect()
}

/// Drop blocks not reachable from the entry.
fn remove_unreachable(builder: &mut MethodBuilder<'_>) -> bool {
    let scope = Scope::compute(builder.context(), builder.method_id());
    let unreachable: Vec<BlockId> = builder
        .method()
        .blocks
        .iter()
        .copied()
        .filter(|block| !scope.contains(*block))
        .collect();
    if unreachable.is_empty() {
        return false;
    }
    // φ edges from unreachable predecessors disappear with them.
    for block in scope.rpo() {
        for phi in phis_of(builder, *block) {
            for dead in &unreachable {
                builder.remove_phi_incoming(phi, *dead);
            }
        }
    }
    for block in unreachable {
        builder.remove_block(block);
    }
    true
}

/// Rewrite conditional branches over constants into plain branches.
fn fold_constant_branches(builder: &mut MethodBuilder<'_>) -> bool {
    let scope = Scope::compute(builder.context(), builder.method_id());
    for block in scope.rpo() {
        let Some(terminator) = builder.context().terminator(*block) else {
            continue;
        };
        let node = builder.context().value(terminator);
        let (taken, skipped) = match &node.kind {
            ValueKind::ConditionalBranch {
                true_target,
                false_target,
            } => {
                if true_target == false_target {
                    (*true_target, None)
                } else {
                    match builder.context().value(node.operands[0]).as_constant() {
                        Some(PrimitiveValue::Int1(true)) => (*true_target, Some(*false_target)),
                        Some(PrimitiveValue::Int1(false)) => (*false_target, Some(*true_target)),
                        _ => continue,
                    }
                }
            }
            _ => continue,
        };
        if let Some(skipped) = skipped {
            for phi in phis_of(builder, skipped) {
                builder.remove_phi_incoming(phi, *block);
            }
        }
        builder.remove_value(terminator);
        builder.set_insert_point(*block);
        builder.branch(taken);
        return true;
    }
    false
}

/// Merge `B -> S` when B ends in an unconditional branch and S has no other
/// predecessors.
fn merge_chains(builder: &mut MethodBuilder<'_>) -> bool {
    let scope = Scope::compute(builder.context(), builder.method_id());
    for block in scope.rpo() {
        let Some(terminator) = builder.context().terminator(*block) else {
            continue;
        };
        let ValueKind::Branch { target } = builder.context().value(terminator).kind else {
            continue;
        };
        if target == *block || scope.predecessors(target) != &[*block][..] {
            continue;
        }
        // Single-predecessor φs are aliases of their only operand.
        for phi in phis_of(builder, target) {
            let operand = builder.context().value(phi).operands[0];
            builder.replace_all_uses(phi, operand);
            builder.remove_value(phi);
        }
        builder.remove_value(terminator);
        // Move the successor's values into this block.
        let moved: Vec<ValueId> = builder.context().block(target).values.clone();
        for value in &moved {
            builder.context_mut().value_mut(*value).block = Some(*block);
        }
        {
            let context = builder.context_mut();
            context.block_mut(target).values.clear();
            let block_data = context.block_mut(*block);
            block_data.values.extend(moved);
            block_data.mark_dirty();
        }
        // Successors of the merged block now flow in from `block`.
        for successor in builder.context().successors(*block) {
            for phi in phis_of(builder, successor) {
                builder.replace_phi_incoming_block(phi, target, *block);
            }
        }
        let method = builder.method_id();
        builder
            .context_mut()
            .method_mut(method)
            .blocks
            .retain(|b| *b != target);
        return true;
    }
    false
}

/// Redirect predecessors around blocks that contain only a branch.
fn forward_empty_blocks(builder: &mut MethodBuilder<'_>) -> bool {
    let scope = Scope::compute(builder.context(), builder.method_id());
    let entry = scope.rpo().first().copied();
    'blocks: for block in scope.rpo() {
        if Some(*block) == entry {
            continue;
        }
        let values = &builder.context().block(*block).values;
        if values.len() != 1 {
            continue;
        }
        let ValueKind::Branch { target } = builder.context().value(values[0]).kind else {
            continue;
        };
        if target == *block {
            continue;
        }
        let preds: Vec<BlockId> = scope.predecessors(*block).to_vec();
        // Forwarding duplicates φ edges in the target; skip when a
        // predecessor already reaches the target directly.
        let target_phis = phis_of(builder, target);
        if !target_phis.is_empty() {
            for phi in &target_phis {
                let ValueKind::Phi { incoming } = &builder.context().value(*phi).kind else {
                    continue;
                };
                if preds.iter().any(|pred| incoming.contains(pred)) {
                    continue 'blocks;
                }
            }
        }
        for phi in &target_phis {
            let node = builder.context().value(*phi);
            let ValueKind::Phi { incoming } = &node.kind else {
                continue;
            };
            if let Some(index) = incoming.iter().position(|b| *b == *block) {
                let operand = node.operands[index];
                for pred in &preds {
                    builder.add_phi_incoming(*phi, *pred, operand);
                }
                builder.remove_phi_incoming(*phi, *block);
            }
        }
        for pred in preds {
            if let Some(terminator) = builder.context().terminator(pred) {
                builder.retarget(terminator, *block, target);
            }
        }
        builder.remove_block(*block);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IrContext;
    use crate::method::{MethodDeclaration, MethodId};
    use crate::types::PrimitiveType;
    use vega_common::MethodHandle;

    fn new_method(context: &mut IrContext) -> MethodId {
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![i32_ty]);
        context.create_method(decl).unwrap()
    }

    #[test]
    fn test_constant_branch_folds_and_chain_merges() {
        let mut context = IrContext::new();
        let method = new_method(&mut context);
        {
            let mut builder = context.create_builder(method).unwrap();
            let entry = builder.create_block();
            let taken = builder.create_block();
            let skipped = builder.create_block();
            builder.set_insert_point(entry);
            let condition = builder.bool_const(true);
            builder.cond_branch(condition, taken, skipped).unwrap();
            builder.set_insert_point(taken);
            let x = builder.param(0);
            builder.ret(Some(x));
            builder.set_insert_point(skipped);
            let x = builder.param(0);
            builder.ret(Some(x));
        }
        {
            let mut builder = context.create_builder(method).unwrap();
            let result = SimplifyCfg.run(&mut builder).unwrap();
            assert_eq!(result, PassResult::Changed);
        }
        // Everything collapses into the entry block.
        assert_eq!(context.method(method).blocks.len(), 1);
        let entry = context.method(method).entry.unwrap();
        assert!(matches!(
            context
                .value(context.terminator(entry).unwrap())
                .kind,
            ValueKind::Return
        ));
    }

    #[test]
    fn test_empty_block_forwarded() {
        let mut context = IrContext::new();
        let method = new_method(&mut context);
        {
            let mut builder = context.create_builder(method).unwrap();
            let entry = builder.create_block();
            let left = builder.create_block();
            let right = builder.create_block();
            let exit = builder.create_block();
            builder.set_insert_point(entry);
            let x = builder.param(0);
            let zero = builder.int32(0);
            let condition = builder
                .compare(
                    crate::value::CompareKind::LessThan,
                    crate::value::ArithFlags::empty(),
                    x,
                    zero,
                )
                .unwrap();
            builder.cond_branch(condition, left, right).unwrap();
            // Both arms are empty forwarders.
            builder.set_insert_point(left);
            builder.branch(exit);
            builder.set_insert_point(right);
            builder.branch(exit);
            builder.set_insert_point(exit);
            builder.ret(Some(x));
        }
        {
            let mut builder = context.create_builder(method).unwrap();
            SimplifyCfg.run(&mut builder).unwrap();
        }
        // Forwarders go first, then the now-trivial conditional branch
        // folds and the exit merges in: a single straight-line block.
        assert_eq!(context.method(method).blocks.len(), 1);
    }
}
