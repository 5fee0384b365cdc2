//! Scope: the blocks reachable from a method's entry, in reverse post-order

use std::collections::HashMap;

use crate::block::BlockId;
use crate::context::IrContext;
use crate::method::MethodId;

/// Reachable blocks of one method in deterministic reverse post-order,
/// plus the predecessor relation restricted to reachable blocks.
pub struct Scope {
    method: MethodId,
    rpo: Vec<BlockId>,
    positions: HashMap<BlockId, usize>,
    predecessors: HashMap<BlockId, Vec<BlockId>>,
}

impl Scope {
    pub fn compute(context: &IrContext, method: MethodId) -> Self {
        let mut rpo = Vec::new();
        let mut positions = HashMap::new();
        let mut predecessors: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        if let Some(entry) = context.method(method).entry {
            // Iterative post-order DFS; successors are pushed in order so the
            // traversal is deterministic.
            let mut visited = HashMap::new();
            let mut post = Vec::new();
            let mut stack = vec![(entry, 0usize)];
            visited.insert(entry, ());
            while let Some((block, next)) = stack.pop() {
                let successors = context.successors(block);
                if next == 0 {
                    predecessors.entry(block).or_default();
                }
                if next < successors.len() {
                    stack.push((block, next + 1));
                    let successor = successors[next];
                    predecessors.entry(successor).or_default().push(block);
                    if visited.insert(successor, ()).is_none() {
                        stack.push((successor, 0));
                    }
                } else {
                    post.push(block);
                }
            }
            rpo = post.into_iter().rev().collect();
            for (index, block) in rpo.iter().enumerate() {
                positions.insert(*block, index);
            }
            // Drop duplicate predecessor edges from multi-edges (e.g. a
            // conditional branch with both arms on the same target).
            for preds in predecessors.values_mut() {
                preds.sort();
                preds.dedup();
            }
        }

        Self {
            method,
            rpo,
            positions,
            predecessors,
        }
    }

    pub fn method(&self) -> MethodId {
        self.method
    }

    /// Reachable blocks in reverse post-order; the entry is first.
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.positions.contains_key(&block)
    }

    pub fn rpo_index(&self, block: BlockId) -> Option<usize> {
        self.positions.get(&block).copied()
    }

    /// Predecessors of a reachable block, in deterministic order.
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors
            .get(&block)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rpo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rpo.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodDeclaration;
    use vega_common::MethodHandle;

    /// entry -> (left, right) -> join, plus one unreachable block.
    fn diamond() -> (IrContext, MethodId, Vec<BlockId>) {
        let mut context = IrContext::new();
        let void = context.void_type();
        let decl = MethodDeclaration::new(MethodHandle::new(1, "d"), void, vec![]);
        let method = context.create_method(decl).unwrap();
        let mut blocks = Vec::new();
        {
            let mut builder = context.create_builder(method).unwrap();
            let entry = builder.create_block();
            let left = builder.create_block();
            let right = builder.create_block();
            let join = builder.create_block();
            let dead = builder.create_block();
            blocks.extend([entry, left, right, join, dead]);

            builder.set_insert_point(entry);
            let condition = builder.bool_const(true);
            builder.cond_branch(condition, left, right).unwrap();
            builder.set_insert_point(left);
            builder.branch(join);
            builder.set_insert_point(right);
            builder.branch(join);
            builder.set_insert_point(join);
            builder.ret(None);
            builder.set_insert_point(dead);
            builder.ret(None);
        }
        (context, method, blocks)
    }

    #[test]
    fn test_rpo_starts_at_entry_and_skips_unreachable() {
        let (context, method, blocks) = diamond();
        let scope = Scope::compute(&context, method);
        assert_eq!(scope.rpo()[0], blocks[0]);
        assert_eq!(scope.len(), 4);
        assert!(!scope.contains(blocks[4]));
        // The join comes after both arms.
        let join_pos = scope.rpo_index(blocks[3]).unwrap();
        assert!(join_pos > scope.rpo_index(blocks[1]).unwrap());
        assert!(join_pos > scope.rpo_index(blocks[2]).unwrap());
    }

    #[test]
    fn test_predecessors() {
        let (context, method, blocks) = diamond();
        let scope = Scope::compute(&context, method);
        let mut preds = scope.predecessors(blocks[3]).to_vec();
        preds.sort();
        assert_eq!(preds, vec![blocks[1], blocks[2]]);
        assert!(scope.predecessors(blocks[0]).is_empty());
    }
}
