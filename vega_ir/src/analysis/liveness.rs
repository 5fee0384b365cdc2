//! Last-use liveness for backend register allocation
//!
//! Blocks are linearized in scope order and every value is assigned the
//! position of its last use. The PTX register allocator frees a value's
//! registers once emission passes that position. φ-operands count as used
//! at the terminator of the predecessor they flow in from, which is where
//! the backends materialize the φ copies.

use std::collections::HashMap;

use crate::analysis::Scope;
use crate::block::BlockId;
use crate::context::IrContext;
use crate::value::{ValueId, ValueKind};

/// Linearized definition/last-use positions for one method scope.
pub struct Liveness {
    positions: HashMap<ValueId, usize>,
    last_use: HashMap<ValueId, usize>,
}

impl Liveness {
    pub fn compute(context: &IrContext, scope: &Scope) -> Self {
        let mut positions = HashMap::new();
        let mut terminator_positions: HashMap<BlockId, usize> = HashMap::new();
        let mut counter = 0usize;
        for block in scope.rpo() {
            for value in &context.block(*block).values {
                positions.insert(*value, counter);
                counter += 1;
            }
            // The terminator holds the block's final position.
            terminator_positions.insert(*block, counter.saturating_sub(1));
        }

        let mut last_use: HashMap<ValueId, usize> = HashMap::new();
        let mut bump = |value: ValueId, position: usize| {
            let slot = last_use.entry(value).or_insert(position);
            if *slot < position {
                *slot = position;
            }
        };
        for block in scope.rpo() {
            for value in &context.block(*block).values {
                let node = context.value(*value);
                match &node.kind {
                    ValueKind::Phi { incoming } => {
                        // φ-operands are consumed on the incoming edge.
                        for (operand, pred) in node.operands.iter().zip(incoming) {
                            let position = terminator_positions
                                .get(pred)
                                .copied()
                                .unwrap_or(positions[value]);
                            bump(*operand, position);
                        }
                    }
                    _ => {
                        let position = positions[value];
                        for operand in &node.operands {
                            bump(*operand, position);
                        }
                    }
                }
            }
        }

        Self {
            positions,
            last_use,
        }
    }

    /// Linear position of a value's definition.
    pub fn position(&self, value: ValueId) -> Option<usize> {
        self.positions.get(&value).copied()
    }

    /// Position of the last use; `None` for values that are never used.
    pub fn last_use(&self, value: ValueId) -> Option<usize> {
        self.last_use.get(&value).copied()
    }

    /// Whether `value` is dead at (strictly after) `position`.
    pub fn dead_after(&self, value: ValueId, position: usize) -> bool {
        match self.last_use.get(&value) {
            Some(last) => *last <= position,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodDeclaration;
    use crate::types::PrimitiveType;
    use crate::value::{ArithFlags, BinaryArithKind};
    use vega_common::MethodHandle;

    #[test]
    fn test_last_use_positions() {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl =
            MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![i32_ty, i32_ty]);
        let method = context.create_method(decl).unwrap();
        let (a, b, sum, scaled);
        {
            let mut builder = context.create_builder(method).unwrap();
            builder.create_block();
            a = builder.param(0);
            b = builder.param(1);
            sum = builder
                .binary(BinaryArithKind::Add, ArithFlags::empty(), a, b)
                .unwrap();
            scaled = builder
                .binary(BinaryArithKind::Mul, ArithFlags::empty(), sum, b)
                .unwrap();
            builder.ret(Some(scaled));
        }
        let scope = Scope::compute(&context, method);
        let liveness = Liveness::compute(&context, &scope);

        // a dies at the add, b at the mul, scaled at the ret.
        assert_eq!(liveness.last_use(a), Some(liveness.position(sum).unwrap()));
        assert_eq!(
            liveness.last_use(b),
            Some(liveness.position(scaled).unwrap())
        );
        assert!(liveness.last_use(scaled).unwrap() > liveness.position(scaled).unwrap());
        assert!(liveness.dead_after(a, liveness.position(sum).unwrap()));
        assert!(!liveness.dead_after(b, liveness.position(sum).unwrap()));
    }
}
