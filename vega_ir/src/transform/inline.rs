//! Call-site inlining
//!
//! Expands calls to methods marked for aggressive inlining and to small
//! callees. The call block is split at the call site, the callee body is
//! cloned with parameters bound to arguments, and returns are rewired to
//! branch into the continuation.

use std::collections::HashMap;

use log::debug;

use vega_common::Result;

use crate::analysis::Scope;
use crate::block::BlockId;
use crate::builder::MethodBuilder;
use crate::method::MethodFlags;
use crate::transform::{Pass, PassResult};
use crate::types::PrimitiveType;
use crate::value::{ValueId, ValueKind};

pub struct Inliner {
    /// Callees at or below this many values inline even without the
    /// aggressive flag.
    size_threshold: usize,
    /// Expansion cap per pass run; the driver iterates for the rest.
    max_expansions: usize,
}

impl Default for Inliner {
    fn default() -> Self {
        Self {
            size_threshold: 32,
            max_expansions: 8,
        }
    }
}

impl Inliner {
    pub fn with_size_threshold(mut self, size_threshold: usize) -> Self {
        self.size_threshold = size_threshold;
        self
    }
}

impl Pass for Inliner {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn run(&self, builder: &mut MethodBuilder<'_>) -> Result<PassResult> {
        let mut expansions = 0;
        while expansions < self.max_expansions {
            let Some(call) = find_candidate(builder, self.size_threshold) else {
                break;
            };
            inline_call(builder, call);
            expansions += 1;
        }
        Ok(PassResult::from_flag(expansions > 0))
    }
}

fn find_candidate(builder: &MethodBuilder<'_>, size_threshold: usize) -> Option<ValueId> {
    let context = builder.context();
    let scope = Scope::compute(context, builder.method_id());
    for block in scope.rpo() {
        for value in &context.block(*block).values {
            let ValueKind::Call { target } = context.value(*value).kind else {
                continue;
            };
            if target == builder.method_id() {
                continue;
            }
            let callee = context.method(target);
            if !callee.can_inline() || callee.entry.is_none() {
                continue;
            }
            if callee.flags().contains(MethodFlags::AGGRESSIVE_INLINING) {
                return Some(*value);
            }
            let size: usize = callee
                .blocks
                .iter()
                .map(|b| context.block(*b).values.len())
                .sum();
            if size <= size_threshold {
                return Some(*value);
            }
        }
    }
    None
}

fn inline_call(builder: &mut MethodBuilder<'_>, call: ValueId) {
    let ValueKind::Call { target } = builder.context().value(call).kind else {
        panic!("inline_call on a non-call value");
    };
    let caller_block = builder
        .context()
        .value(call)
        .block
        .expect("call is in a block");
    let args: Vec<ValueId> = builder.context().value(call).operands.to_vec();
    let callee_scope = Scope::compute(builder.context(), target);
    let callee_params: Vec<ValueId> = builder.context().method(target).params.clone();
    debug!(
        "inlining {} into {}",
        builder.context().method(target).name(),
        builder.method().name()
    );

    // Split the call block: everything after the call moves into the
    // continuation, including the terminator.
    let continuation = builder.create_block();
    let call_position = builder
        .context()
        .block(caller_block)
        .values
        .iter()
        .position(|v| *v == call)
        .expect("call is in its block");
    let moved: Vec<ValueId> = builder.context().block(caller_block).values[call_position + 1..].to_vec();
    {
        let context = builder.context_mut();
        context
            .block_mut(caller_block)
            .values
            .truncate(call_position + 1);
        context.block_mut(caller_block).mark_dirty();
        for value in &moved {
            context.value_mut(*value).block = Some(continuation);
        }
        context.block_mut(continuation).values = moved;
    }
    // Successors now flow in from the continuation.
    for successor in builder.context().successors(continuation) {
        for phi in phi_values(builder, successor) {
            builder.replace_phi_incoming_block(phi, caller_block, continuation);
        }
    }

    // Clone callee blocks, then values in two phases so back-edge φ
    // operands resolve.
    let mut block_map: HashMap<BlockId, BlockId> = HashMap::new();
    for block in callee_scope.rpo() {
        block_map.insert(*block, builder.create_block());
    }
    let mut value_map: HashMap<ValueId, ValueId> = HashMap::new();
    for (param, arg) in callee_params.iter().zip(&args) {
        value_map.insert(*param, *arg);
    }

    // Phase one: allocate clones with remapped kinds and empty operands.
    let mut returns: Vec<(BlockId, Option<ValueId>)> = Vec::new();
    for block in callee_scope.rpo() {
        let clone_block = block_map[block];
        for value in builder.context().block(*block).values.clone() {
            let node = builder.context().value(value);
            let ty = node.ty;
            let kind = match &node.kind {
                ValueKind::Return => {
                    returns.push((clone_block, node.operands.first().copied()));
                    ValueKind::Branch {
                        target: continuation,
                    }
                }
                ValueKind::Branch { target } => ValueKind::Branch {
                    target: block_map[target],
                },
                ValueKind::ConditionalBranch {
                    true_target,
                    false_target,
                } => ValueKind::ConditionalBranch {
                    true_target: block_map[true_target],
                    false_target: block_map[false_target],
                },
                ValueKind::Switch { targets, default } => ValueKind::Switch {
                    targets: targets.iter().map(|t| block_map[t]).collect(),
                    default: block_map[default],
                },
                ValueKind::Phi { incoming } => ValueKind::Phi {
                    incoming: incoming.iter().map(|b| block_map[b]).collect(),
                },
                other => other.clone(),
            };
            let clone = builder
                .context_mut()
                .alloc_value(ty, Some(clone_block), kind, Default::default());
            builder.context_mut().block_mut(clone_block).values.push(clone);
            value_map.insert(value, clone);
        }
    }
    // Phase two: wire operands (returns keep none; their operand feeds the
    // continuation φ instead).
    for block in callee_scope.rpo() {
        for value in builder.context().block(*block).values.clone() {
            let clone = value_map[&value];
            if matches!(builder.context().value(value).kind, ValueKind::Return) {
                continue;
            }
            let operands: Vec<ValueId> = builder
                .context()
                .value(value)
                .operands
                .iter()
                .map(|operand| value_map[operand])
                .collect();
            for operand in &operands {
                builder.context_mut().value_mut(*operand).uses.insert(clone);
            }
            builder.context_mut().value_mut(clone).operands = operands.into_iter().collect();
        }
    }

    // The split block now branches into the cloned entry.
    let callee_entry = block_map[&callee_scope.rpo()[0]];
    builder.set_insert_point(caller_block);
    // Temporarily pop the call so the branch lands at the tail.
    builder
        .context_mut()
        .block_mut(caller_block)
        .values
        .retain(|v| *v != call);
    builder.branch(callee_entry);

    // Bind the call result to the returned value(s).
    let return_type = builder.context().value(call).ty;
    let is_void = return_type == builder.context().primitive_type(PrimitiveType::Void);
    if !is_void {
        let replacement = match returns.as_slice() {
            [(_, Some(single))] => value_map[single],
            _ => {
                let phi = builder.create_phi(continuation, return_type);
                for (ret_block, ret_value) in &returns {
                    let value = ret_value.map(|v| value_map[&v]).expect(
                        "non-void method returns a value",
                    );
                    builder.add_phi_incoming(phi, *ret_block, value);
                }
                phi
            }
        };
        builder.replace_all_uses(call, replacement);
    }
    // The call was already unlinked from the block list above; drop its
    // edges and slot.
    debug_assert!(builder.context().value(call).uses.is_empty());
    for operand in builder.context().value(call).operands.to_vec() {
        builder
            .context_mut()
            .value_mut(operand)
            .uses
            .remove(&call);
    }
    builder.context_mut().remove_value_slot(call);
}

fn phi_values(builder: &MethodBuilder<'_>, block: BlockId) -> Vec<ValueId> {
    builder
        .context()
        .block(block)
        .values
        .iter()
        .copied()
        .filter(|value| builder.context().value(*value).kind.is_phi())
        .collect()
}
