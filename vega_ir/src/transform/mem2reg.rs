//! Promotion of memory slots to SSA values
//!
//! Allocas that are only ever loaded from and stored to (their address
//! never escapes) become SSA values: φ-nodes are placed on the iterated
//! dominance frontier of the defining blocks and loads are rewritten to
//! the reaching definition.

use std::collections::{HashMap, HashSet};

use vega_common::Result;

use crate::analysis::{Dominators, Scope};
use crate::block::BlockId;
use crate::builder::MethodBuilder;
use crate::transform::{Pass, PassResult};
use crate::types::TypeKind;
use crate::value::{ValueId, ValueKind};

pub struct Mem2Reg;

impl Pass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn run(&self, builder: &mut MethodBuilder<'_>) -> Result<PassResult> {
        let scope = Scope::compute(builder.context(), builder.method_id());
        let doms = Dominators::compute(builder.context(), &scope);

        let mut promotable: Vec<ValueId> = Vec::new();
        for block in scope.rpo() {
            for value in &builder.context().block(*block).values {
                if !matches!(builder.context().value(*value).kind, ValueKind::Alloca { .. }) {
                    continue;
                }
                if is_promotable(builder, *value) {
                    promotable.push(*value);
                }
            }
        }
        if promotable.is_empty() {
            return Ok(PassResult::Unchanged);
        }
        for alloca in promotable {
            promote(builder, &scope, &doms, alloca);
        }
        Ok(PassResult::Changed)
    }
}

/// An alloca is promotable when every use is a load from it or a store to
/// it; any other use means its address escapes.
fn is_promotable(builder: &MethodBuilder<'_>, alloca: ValueId) -> bool {
    let context = builder.context();
    context.value(alloca).uses.iter().all(|user| {
        let node = context.value(*user);
        match node.kind {
            ValueKind::Load => node.operands[0] == alloca,
            ValueKind::Store => node.operands[0] == alloca && node.operands[1] != alloca,
            _ => false,
        }
    })
}

fn promote(builder: &mut MethodBuilder<'_>, scope: &Scope, doms: &Dominators, alloca: ValueId) {
    let context = builder.context();
    let pointee = match context.type_kind(context.value(alloca).ty) {
        TypeKind::Pointer { element, .. } => *element,
        _ => return,
    };
    let alloca_block = context.value(alloca).block.expect("alloca is in a block");

    // Blocks that define the slot.
    let mut def_blocks: HashSet<BlockId> = HashSet::new();
    for user in context.value(alloca).uses.iter() {
        let node = context.value(*user);
        if matches!(node.kind, ValueKind::Store) {
            if let Some(block) = node.block {
                def_blocks.insert(block);
            }
        }
    }

    // φ placement on the iterated dominance frontier.
    let frontiers = doms.frontiers(scope);
    let mut phi_blocks: HashSet<BlockId> = HashSet::new();
    let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
    worklist.sort();
    while let Some(block) = worklist.pop() {
        for frontier in frontiers.get(&block).map(Vec::as_slice).unwrap_or(&[]) {
            if phi_blocks.insert(*frontier) {
                worklist.push(*frontier);
            }
        }
    }
    let mut phis: HashMap<BlockId, ValueId> = HashMap::new();
    let mut phi_list: Vec<BlockId> = phi_blocks.into_iter().collect();
    phi_list.sort();
    for block in phi_list {
        phis.insert(block, builder.create_phi(block, pointee));
    }

    // A read before any write yields poison; materialize it right where the
    // alloca sat so it dominates every former use.
    let undefined = {
        let position = builder
            .context()
            .block(alloca_block)
            .values
            .iter()
            .position(|v| *v == alloca)
            .expect("alloca is in its block");
        let poison =
            builder
                .context_mut()
                .alloc_value(pointee, Some(alloca_block), ValueKind::Poison, Default::default());
        let block = builder.context_mut().block_mut(alloca_block);
        block.values.insert(position, poison);
        block.mark_dirty();
        poison
    };

    // Rename along the dominator tree.
    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for block in scope.rpo() {
        if let Some(idom) = doms.idom(*block) {
            children.entry(idom).or_default().push(*block);
        }
    }
    for list in children.values_mut() {
        list.sort();
    }

    let entry = scope.rpo()[0];
    let mut stack: Vec<(BlockId, ValueId)> = vec![(entry, undefined)];
    while let Some((block, incoming)) = stack.pop() {
        let mut reaching = phis.get(&block).copied().unwrap_or(incoming);
        for value in builder.context().block(block).values.clone() {
            if !builder.context().is_live(value) {
                continue;
            }
            let node = builder.context().value(value);
            match node.kind {
                ValueKind::Load if node.operands[0] == alloca => {
                    builder.replace_all_uses(value, reaching);
                    builder.remove_value(value);
                }
                ValueKind::Store if node.operands[0] == alloca => {
                    reaching = node.operands[1];
                    builder.remove_value(value);
                }
                _ => {}
            }
        }
        for successor in builder.context().successors(block) {
            if let Some(phi) = phis.get(&successor) {
                builder.add_phi_incoming(*phi, block, reaching);
            }
        }
        // Children are pushed in reverse so they pop in ascending order,
        // keeping φ operand order deterministic.
        for child in children
            .get(&block)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .rev()
        {
            stack.push((*child, reaching));
        }
    }

    builder.remove_value(alloca);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IrContext;
    use crate::dump::dump_method;
    use crate::method::{MethodDeclaration, MethodId};
    use crate::types::{AddressSpace, PrimitiveType};
    use crate::value::{ArithFlags, BinaryArithKind, CompareKind};
    use vega_common::MethodHandle;

    fn new_method(context: &mut IrContext) -> MethodId {
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![i32_ty]);
        context.create_method(decl).unwrap()
    }

    #[test]
    fn test_straight_line_promotion() {
        let mut context = IrContext::new();
        let method = new_method(&mut context);
        {
            let mut builder = context.create_builder(method).unwrap();
            builder.create_block();
            let i32_ty = builder.context().primitive_type(PrimitiveType::Int32);
            let slot = builder.alloca(i32_ty, AddressSpace::Local);
            let x = builder.param(0);
            builder.store(slot, x).unwrap();
            let loaded = builder.load(slot).unwrap();
            builder.ret(Some(loaded));
        }
        {
            let mut builder = context.create_builder(method).unwrap();
            let result = Mem2Reg.run(&mut builder).unwrap();
            assert_eq!(result, PassResult::Changed);
        }
        // The return now takes the parameter directly; no alloca remains.
        let entry = context.method(method).entry.unwrap();
        let ret = context.terminator(entry).unwrap();
        assert_eq!(
            context.value(ret).operands[0],
            context.method(method).params[0]
        );
        for value in &context.block(entry).values {
            assert!(!matches!(
                context.value(*value).kind,
                ValueKind::Alloca { .. } | ValueKind::Load | ValueKind::Store
            ));
        }
    }

    #[test]
    fn test_diamond_promotion_places_phi() {
        let mut context = IrContext::new();
        let method = new_method(&mut context);
        {
            let mut builder = context.create_builder(method).unwrap();
            let entry = builder.create_block();
            let on_true = builder.create_block();
            let on_false = builder.create_block();
            let join = builder.create_block();

            builder.set_insert_point(entry);
            let i32_ty = builder.context().primitive_type(PrimitiveType::Int32);
            let slot = builder.alloca(i32_ty, AddressSpace::Local);
            let x = builder.param(0);
            let zero = builder.int32(0);
            let condition = builder
                .compare(CompareKind::GreaterThan, ArithFlags::empty(), x, zero)
                .unwrap();
            builder.cond_branch(condition, on_true, on_false).unwrap();

            builder.set_insert_point(on_true);
            let one = builder.int32(1);
            let incremented = builder
                .binary(BinaryArithKind::Add, ArithFlags::empty(), x, one)
                .unwrap();
            builder.store(slot, incremented).unwrap();
            builder.branch(join);

            builder.set_insert_point(on_false);
            let one = builder.int32(1);
            let decremented = builder
                .binary(BinaryArithKind::Sub, ArithFlags::empty(), x, one)
                .unwrap();
            builder.store(slot, decremented).unwrap();
            builder.branch(join);

            builder.set_insert_point(join);
            let merged = builder.load(slot).unwrap();
            builder.ret(Some(merged));
        }
        {
            let mut builder = context.create_builder(method).unwrap();
            Mem2Reg.run(&mut builder).unwrap();
        }
        // One φ at the join, fed by both arms.
        let text = dump_method(&context, method);
        assert!(text.contains("phi [BB1: "), "dump was:\n{}", text);
        assert!(!text.contains("alloca"), "dump was:\n{}", text);
        let join = context.method(method).blocks[3];
        let phi = context.block(join).values[0];
        assert!(context.value(phi).kind.is_phi());
        assert_eq!(context.value(phi).operands.len(), 2);
    }
}
