//! Constant re-folding pass
//!
//! The builder folds at creation time; this pass catches values whose
//! operands only became constant through later rewrites (inlining,
//! specialization, φ collapsing), and collapses trivial φ-nodes.

use vega_common::Result;

use crate::analysis::Scope;
use crate::builder::MethodBuilder;
use crate::fold::{self, Folded};
use crate::transform::{Pass, PassResult};
use crate::value::{PrimitiveValue, ValueId, ValueKind};

pub struct ConstantFolder;

enum Rewrite {
    Fold(ValueId, Folded),
    /// Replace the value with an existing one (trivial φ).
    Alias(ValueId, ValueId),
}

impl Pass for ConstantFolder {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn run(&self, builder: &mut MethodBuilder<'_>) -> Result<PassResult> {
        let mut changed = false;
        loop {
            let scope = Scope::compute(builder.context(), builder.method_id());
            let mut rewrites: Vec<Rewrite> = Vec::new();
            for block in scope.rpo() {
                for value in &builder.context().block(*block).values {
                    let node = builder.context().value(*value);
                    let constant =
                        |id: ValueId| builder.context().value(id).as_constant();
                    match &node.kind {
                        ValueKind::UnaryArith { op, .. } => {
                            if let Some(operand) = constant(node.operands[0]) {
                                if let Some(outcome) = fold::fold_unary(*op, operand) {
                                    rewrites.push(Rewrite::Fold(*value, outcome));
                                }
                            }
                        }
                        ValueKind::BinaryArith { op, flags } => {
                            if let (Some(lhs), Some(rhs)) =
                                (constant(node.operands[0]), constant(node.operands[1]))
                            {
                                if let Some(outcome) = fold::fold_binary(*op, *flags, lhs, rhs) {
                                    rewrites.push(Rewrite::Fold(*value, outcome));
                                }
                            }
                        }
                        ValueKind::TernaryArith { op, .. } => {
                            if let (Some(a), Some(b), Some(c)) = (
                                constant(node.operands[0]),
                                constant(node.operands[1]),
                                constant(node.operands[2]),
                            ) {
                                if let Some(outcome) = fold::fold_ternary(*op, a, b, c) {
                                    rewrites.push(Rewrite::Fold(*value, outcome));
                                }
                            }
                        }
                        ValueKind::Compare { kind, flags } => {
                            if let (Some(lhs), Some(rhs)) =
                                (constant(node.operands[0]), constant(node.operands[1]))
                            {
                                if let Some(result) = fold::fold_compare(*kind, *flags, lhs, rhs) {
                                    rewrites.push(Rewrite::Fold(
                                        *value,
                                        Folded::Value(PrimitiveValue::Int1(result)),
                                    ));
                                }
                            }
                        }
                        ValueKind::Convert { flags } => {
                            if let Some(operand) = constant(node.operands[0]) {
                                let target = builder
                                    .context()
                                    .as_primitive(node.ty)
                                    .expect("convert result is primitive");
                                if let Some(folded) = fold::fold_convert(target, *flags, operand) {
                                    rewrites.push(Rewrite::Fold(*value, Folded::Value(folded)));
                                }
                            }
                        }
                        ValueKind::Phi { .. } => {
                            // φ with a single distinct incoming value (other
                            // than itself) is an alias.
                            let mut distinct: Option<ValueId> = None;
                            let mut trivial = true;
                            for operand in &node.operands {
                                if *operand == *value {
                                    continue;
                                }
                                match distinct {
                                    None => distinct = Some(*operand),
                                    Some(existing) if existing == *operand => {}
                                    Some(_) => {
                                        trivial = false;
                                        break;
                                    }
                                }
                            }
                            if trivial {
                                if let Some(replacement) = distinct {
                                    rewrites.push(Rewrite::Alias(*value, replacement));
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            if rewrites.is_empty() {
                break;
            }
            for rewrite in rewrites {
                match rewrite {
                    Rewrite::Fold(value, outcome) => {
                        if !builder.context().is_live(value) {
                            continue;
                        }
                        let block = builder
                            .context()
                            .value(value)
                            .block
                            .expect("foldable value is in a block");
                        builder.set_insert_point(block);
                        let replacement = insert_literal(builder, value, outcome);
                        builder.replace_all_uses(value, replacement);
                        builder.remove_value(value);
                    }
                    Rewrite::Alias(value, replacement) => {
                        if !builder.context().is_live(value)
                            || !builder.context().is_live(replacement)
                        {
                            continue;
                        }
                        builder.replace_all_uses(value, replacement);
                        builder.remove_value(value);
                    }
                }
            }
            changed = true;
        }
        Ok(PassResult::from_flag(changed))
    }
}

/// Create the literal replacement next to the folded value.
fn insert_literal(builder: &mut MethodBuilder<'_>, at: ValueId, outcome: Folded) -> ValueId {
    let ty = builder.context().value(at).ty;
    let block = builder.context().value(at).block.expect("value in block");
    let kind = match outcome {
        Folded::Value(literal) => ValueKind::Constant(literal),
        Folded::Poison => ValueKind::Poison,
    };
    let ty = match outcome {
        Folded::Value(literal) => builder.context().primitive_type(literal.primitive_type()),
        Folded::Poison => ty,
    };
    let constant = builder
        .context_mut()
        .alloc_value(ty, Some(block), kind, Default::default());
    let position = builder
        .context()
        .block(block)
        .values
        .iter()
        .position(|v| *v == at)
        .expect("folded value is in its block");
    builder
        .context_mut()
        .block_mut(block)
        .values
        .insert(position, constant);
    builder.context_mut().block_mut(block).mark_dirty();
    constant
}
