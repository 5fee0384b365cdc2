//! Dominator tree via the semi-NCA algorithm
//!
//! Semidominators are computed with the Lengauer-Tarjan eval/link forest
//! (path compression only); immediate dominators are then derived by
//! walking already-final idoms up to the semidominator, which replaces the
//! bucket phase of classic Lengauer-Tarjan.

use std::collections::HashMap;

use crate::analysis::Scope;
use crate::block::BlockId;
use crate::context::IrContext;

/// Immediate-dominator tree of one method scope.
pub struct Dominators {
    /// Immediate dominator per reachable block; the entry maps to itself.
    idom: HashMap<BlockId, BlockId>,
    /// Depth in the dominator tree; the entry has depth 0.
    depth: HashMap<BlockId, usize>,
    entry: Option<BlockId>,
}

/// Eval/link forest state, indexed by DFS preorder number.
struct Forest {
    semi: Vec<usize>,
    ancestor: Vec<Option<usize>>,
    label: Vec<usize>,
}

impl Forest {
    fn new(n: usize) -> Self {
        Self {
            semi: (0..n).collect(),
            ancestor: vec![None; n],
            label: (0..n).collect(),
        }
    }

    /// Label with minimal semidominator on the linked path above `node`,
    /// compressing the path as a side effect.
    fn eval(&mut self, node: usize) -> usize {
        if self.ancestor[node].is_none() {
            return self.label[node];
        }
        // Collect the path to the forest root.
        let mut path = Vec::new();
        let mut current = node;
        while let Some(up) = self.ancestor[current] {
            if self.ancestor[up].is_none() {
                break;
            }
            path.push(current);
            current = up;
        }
        // Compress top-down, propagating the best label.
        for current in path.into_iter().rev() {
            let up = self.ancestor[current].expect("path nodes have ancestors");
            if self.semi[self.label[up]] < self.semi[self.label[current]] {
                self.label[current] = self.label[up];
            }
            self.ancestor[current] = self.ancestor[up].or(Some(up));
        }
        self.label[node]
    }
}

impl Dominators {
    pub fn compute(context: &IrContext, scope: &Scope) -> Self {
        if scope.is_empty() {
            return Self {
                idom: HashMap::new(),
                depth: HashMap::new(),
                entry: None,
            };
        }
        let entry = scope.rpo()[0];

        // DFS preorder numbering over the scope.
        let mut order: Vec<BlockId> = Vec::with_capacity(scope.len());
        let mut number: HashMap<BlockId, usize> = HashMap::with_capacity(scope.len());
        let mut parent: Vec<usize> = Vec::with_capacity(scope.len());
        let mut stack = vec![(entry, 0usize)];
        while let Some((block, parent_number)) = stack.pop() {
            if number.contains_key(&block) {
                continue;
            }
            let index = order.len();
            number.insert(block, index);
            order.push(block);
            parent.push(parent_number);
            // Push successors in reverse so they pop in order.
            for successor in context.successors(block).into_iter().rev() {
                if scope.contains(successor) && !number.contains_key(&successor) {
                    stack.push((successor, index));
                }
            }
        }
        let n = order.len();

        // Semidominators, processed in reverse preorder.
        let mut forest = Forest::new(n);
        for w in (1..n).rev() {
            for pred in scope.predecessors(order[w]) {
                let Some(&v) = number.get(pred) else { continue };
                let u = forest.eval(v);
                if forest.semi[u] < forest.semi[w] {
                    forest.semi[w] = forest.semi[u];
                }
            }
            forest.ancestor[w] = Some(parent[w]);
        }

        // NCA phase: in preorder, walk final idoms up to the semidominator.
        let mut idom_number: Vec<usize> = (0..n)
            .map(|w| if w == 0 { 0 } else { parent[w] })
            .collect();
        for w in 1..n {
            let mut candidate = idom_number[w];
            while candidate > forest.semi[w] {
                candidate = idom_number[candidate];
            }
            idom_number[w] = candidate;
        }

        let mut idom = HashMap::with_capacity(n);
        let mut depth = HashMap::with_capacity(n);
        idom.insert(entry, entry);
        depth.insert(entry, 0);
        // Preorder guarantees a parent's depth is final before its children.
        for w in 1..n {
            let block = order[w];
            let dominator = order[idom_number[w]];
            idom.insert(block, dominator);
            let d = depth[&dominator] + 1;
            depth.insert(block, d);
        }

        Self {
            idom,
            depth,
            entry: Some(entry),
        }
    }

    /// Immediate dominator; `None` for the entry and unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        if self.entry == Some(block) {
            return None;
        }
        self.idom.get(&block).copied()
    }

    /// Whether `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let (Some(&depth_a), Some(&depth_b)) = (self.depth.get(&a), self.depth.get(&b)) else {
            return false;
        };
        if depth_a > depth_b {
            return false;
        }
        let mut current = b;
        while self.depth[&current] > depth_a {
            current = self.idom[&current];
        }
        current == a
    }

    /// Nearest common dominator of two reachable blocks.
    pub fn nearest_common_dominator(&self, a: BlockId, b: BlockId) -> BlockId {
        let mut a = a;
        let mut b = b;
        while a != b {
            if self.depth[&a] >= self.depth[&b] {
                a = self.idom[&a];
            } else {
                b = self.idom[&b];
            }
        }
        a
    }

    /// Dominance frontiers of every reachable block.
    pub fn frontiers(&self, scope: &Scope) -> HashMap<BlockId, Vec<BlockId>> {
        let mut frontiers: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for block in scope.rpo() {
            frontiers.entry(*block).or_default();
        }
        for block in scope.rpo() {
            let preds = scope.predecessors(*block);
            if preds.len() < 2 {
                continue;
            }
            let Some(idom) = self.idom(*block) else { continue };
            for pred in preds {
                let mut runner = *pred;
                while runner != idom {
                    let entry = frontiers.entry(runner).or_default();
                    if !entry.contains(block) {
                        entry.push(*block);
                    }
                    match self.idom(runner) {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }
        frontiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::{MethodDeclaration, MethodId};
    use vega_common::MethodHandle;

    /// entry -> (left, right) -> join; join -> (body, exit); body -> join.
    fn build_cfg() -> (IrContext, MethodId, Vec<BlockId>) {
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
            let body = builder.create_block();
            let exit = builder.create_block();
            blocks.extend([entry, left, right, join, body, exit]);

            builder.set_insert_point(entry);
            let condition = builder.bool_const(true);
            builder.cond_branch(condition, left, right).unwrap();
            builder.set_insert_point(left);
            builder.branch(join);
            builder.set_insert_point(right);
            builder.branch(join);
            builder.set_insert_point(join);
            let condition = builder.bool_const(false);
            builder.cond_branch(condition, body, exit).unwrap();
            builder.set_insert_point(body);
            builder.branch(join);
            builder.set_insert_point(exit);
            builder.ret(None);
        }
        (context, method, blocks)
    }

    #[test]
    fn test_diamond_idoms() {
        let (context, method, blocks) = build_cfg();
        let scope = Scope::compute(&context, method);
        let doms = Dominators::compute(&context, &scope);

        let [entry, left, right, join, body, exit] = blocks[..] else {
            unreachable!()
        };
        assert_eq!(doms.idom(entry), None);
        assert_eq!(doms.idom(left), Some(entry));
        assert_eq!(doms.idom(right), Some(entry));
        // Neither arm dominates the join; the entry does.
        assert_eq!(doms.idom(join), Some(entry));
        assert_eq!(doms.idom(body), Some(join));
        assert_eq!(doms.idom(exit), Some(join));
        assert!(doms.dominates(entry, exit));
        assert!(doms.dominates(join, body));
        assert!(!doms.dominates(left, join));
        assert!(doms.dominates(join, join));
    }

    #[test]
    fn test_nearest_common_dominator() {
        let (context, method, blocks) = build_cfg();
        let scope = Scope::compute(&context, method);
        let doms = Dominators::compute(&context, &scope);
        let [entry, left, right, join, body, exit] = blocks[..] else {
            unreachable!()
        };
        assert_eq!(doms.nearest_common_dominator(left, right), entry);
        assert_eq!(doms.nearest_common_dominator(left, join), entry);
        assert_eq!(doms.nearest_common_dominator(body, exit), join);
        assert_eq!(doms.nearest_common_dominator(join, join), join);
    }

    #[test]
    fn test_frontiers_of_diamond() {
        let (context, method, blocks) = build_cfg();
        let scope = Scope::compute(&context, method);
        let doms = Dominators::compute(&context, &scope);
        let frontiers = doms.frontiers(&scope);
        let [_, left, right, join, body, _] = blocks[..] else {
            unreachable!()
        };
        assert_eq!(frontiers[&left], vec![join]);
        assert_eq!(frontiers[&right], vec![join]);
        // The loop body's frontier is the loop header itself.
        assert_eq!(frontiers[&body], vec![join]);
    }
}
