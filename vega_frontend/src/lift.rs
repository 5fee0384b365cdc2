//! Bytecode lifting
//!
//! Simulates the stack machine one basic block at a time, producing SSA
//! values through the IR builder. Locals live in SSA form; blocks with
//! several predecessors receive φ-nodes for every stack slot and local
//! whose reaching definitions differ (trivial φs collapse in the fold
//! pass). Address-taken locals are demoted to allocas and left for the
//! promotion pass.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;

use vega_common::{CompileError, Result};
use vega_ir::{
    AddressSpace, ArithFlags, BinaryArithKind, BlockId, CompareKind, IrContext, MethodBuilder,
    MethodDeclaration, MethodFlags, MethodId, PrimitiveType, PrimitiveValue, TypeId,
    UnaryArithKind, ValueId,
};

use crate::bytecode::{
    BinOp, BytecodeMethod, BytecodeResolver, BytecodeType, CmpOp, Literal, OpCode, ScalarType,
    UnOp,
};
use crate::intrinsics::{self, Intrinsic};

/// Shuffle width covering the whole warp.
const FULL_WARP_WIDTH: u32 = 32;

/// Compiles bytecode methods into IR methods, recursively pulling in
/// callees.
pub struct Frontend<'r, R: BytecodeResolver> {
    resolver: &'r R,
    in_progress: HashSet<u64>,
}

impl<'r, R: BytecodeResolver> Frontend<'r, R> {
    pub fn new(resolver: &'r R) -> Self {
        Self {
            resolver,
            in_progress: HashSet::new(),
        }
    }

    /// Lift the method behind `token` (and everything it calls) into the
    /// context.
    pub fn compile(&mut self, context: &mut IrContext, token: u64) -> Result<MethodId> {
        let bytecode = self
            .resolver
            .resolve(token)
            .ok_or_else(|| CompileError::UnsupportedCallTarget(format!("token {}", token)))?
            .clone();
        if let Some(existing) = context.find_method(&bytecode.handle) {
            return Ok(existing);
        }
        debug!("lifting {}", bytecode.handle);

        let declaration = translate_declaration(context, &bytecode);
        let method = context.create_method(declaration)?;
        if bytecode.flags.external {
            return Ok(method);
        }

        // Callees are compiled up front so the body lift never needs a
        // second builder. Methods already being lifted (recursion) stay as
        // declarations until their own turn finishes.
        self.in_progress.insert(token);
        for op in &bytecode.code {
            let OpCode::Call { token: callee } = op else {
                continue;
            };
            if self.in_progress.contains(callee) {
                continue;
            }
            if let Some(target) = self.resolver.resolve(*callee) {
                if intrinsics::resolve(&target.handle.name).is_some() {
                    continue;
                }
            }
            self.compile(context, *callee)?;
        }

        let result = self.lift_body(context, method, &bytecode);
        self.in_progress.remove(&token);
        result?;
        Ok(method)
    }

    fn lift_body(
        &self,
        context: &mut IrContext,
        method: MethodId,
        bytecode: &BytecodeMethod,
    ) -> Result<()> {
        let local_types: Vec<TypeId> = bytecode
            .local_types
            .iter()
            .map(|ty| type_to_ir(context, ty))
            .collect();
        let mut builder = context.create_builder(method)?;
        Lifter::new(self.resolver, &mut builder, bytecode, local_types)?.run()
    }
}

fn scalar_to_ir(context: &IrContext, scalar: ScalarType) -> TypeId {
    let prim = match scalar {
        ScalarType::Bool => PrimitiveType::Int1,
        ScalarType::I8 => PrimitiveType::Int8,
        ScalarType::I16 => PrimitiveType::Int16,
        ScalarType::I32 => PrimitiveType::Int32,
        ScalarType::I64 => PrimitiveType::Int64,
        ScalarType::F32 => PrimitiveType::Float32,
        ScalarType::F64 => PrimitiveType::Float64,
    };
    context.primitive_type(prim)
}

fn type_to_ir(context: &mut IrContext, ty: &BytecodeType) -> TypeId {
    match ty {
        BytecodeType::Void => context.void_type(),
        BytecodeType::Scalar(scalar) => scalar_to_ir(context, *scalar),
        BytecodeType::View(scalar) => {
            let element = scalar_to_ir(context, *scalar);
            context.view_type(element, AddressSpace::Global)
        }
        BytecodeType::Struct(fields) => {
            let fields = fields
                .iter()
                .map(|field| type_to_ir(context, field))
                .collect();
            context.structure_type(fields)
        }
    }
}

fn translate_declaration(context: &mut IrContext, bytecode: &BytecodeMethod) -> MethodDeclaration {
    let return_type = type_to_ir(context, &bytecode.return_type);
    let param_types = bytecode
        .param_types
        .iter()
        .map(|ty| type_to_ir(context, ty))
        .collect();
    let mut flags = MethodFlags::empty();
    if bytecode.flags.no_inlining {
        flags |= MethodFlags::NO_INLINING;
    }
    if bytecode.flags.aggressive_inlining {
        flags |= MethodFlags::AGGRESSIVE_INLINING;
    }
    if bytecode.flags.external {
        flags |= MethodFlags::EXTERNAL;
    }
    MethodDeclaration::new(bytecode.handle.clone(), return_type, param_types).with_flags(flags)
}

/// Simulated machine state at a block boundary.
#[derive(Clone)]
struct MachineState {
    stack: Vec<ValueId>,
    locals: Vec<ValueId>,
}

struct Lifter<'a, 'b, 'r, R: BytecodeResolver> {
    resolver: &'r R,
    builder: &'a mut MethodBuilder<'b>,
    bytecode: &'a BytecodeMethod,
    local_types: Vec<TypeId>,
    /// Leader offset -> block.
    blocks: BTreeMap<u32, BlockId>,
    pred_count: HashMap<BlockId, usize>,
    /// Entry state per block; for joins these are the φ-nodes.
    states: HashMap<BlockId, MachineState>,
    joins: HashSet<BlockId>,
    /// Demoted (address-taken) locals and their allocas.
    demoted: HashMap<u16, ValueId>,
    visited: HashSet<BlockId>,
}

impl<'a, 'b, 'r, R: BytecodeResolver> Lifter<'a, 'b, 'r, R> {
    fn new(
        resolver: &'r R,
        builder: &'a mut MethodBuilder<'b>,
        bytecode: &'a BytecodeMethod,
        local_types: Vec<TypeId>,
    ) -> Result<Self> {
        // Leaders: offset 0, every branch target, and every instruction
        // following a control transfer.
        let code = &bytecode.code;
        let mut leaders: HashSet<u32> = HashSet::new();
        leaders.insert(0);
        for (pc, op) in code.iter().enumerate() {
            for target in op.branch_targets() {
                if target as usize >= code.len() {
                    return Err(CompileError::UnsupportedInstruction(format!(
                        "branch to offset {} beyond method end",
                        target
                    )));
                }
                leaders.insert(target);
            }
            let transfers = op.ends_flow() || !op.branch_targets().is_empty();
            if transfers && pc + 1 < code.len() {
                leaders.insert(pc as u32 + 1);
            }
        }

        // The synthetic entry holds allocas and local zero-init and makes
        // offset 0 an ordinary edge target, so loops back to 0 just work.
        builder.create_block();
        let mut blocks = BTreeMap::new();
        let mut sorted: Vec<u32> = leaders.into_iter().collect();
        sorted.sort_unstable();
        for leader in sorted {
            blocks.insert(leader, builder.create_block());
        }

        let mut pred_count: HashMap<BlockId, usize> = HashMap::new();
        *pred_count.entry(blocks[&0]).or_default() += 1;
        for (pc, op) in code.iter().enumerate() {
            for target in op.branch_targets() {
                *pred_count.entry(blocks[&target]).or_default() += 1;
            }
            let next = pc as u32 + 1;
            if !op.ends_flow() && (next as usize) < code.len() && blocks.contains_key(&next) {
                *pred_count.entry(blocks[&next]).or_default() += 1;
            }
        }

        Ok(Self {
            resolver,
            builder,
            bytecode,
            local_types,
            blocks,
            pred_count,
            states: HashMap::new(),
            joins: HashSet::new(),
            demoted: HashMap::new(),
            visited: HashSet::new(),
        })
    }

    fn run(mut self) -> Result<()> {
        let bytecode = self.bytecode;

        // Synthetic entry: demoted-local allocas, zero-initialized locals.
        let entry = self.builder.method().entry.expect("entry created");
        self.builder.set_insert_point(entry);

        let mut demoted_indices: HashSet<u16> = HashSet::new();
        for op in &bytecode.code {
            if let OpCode::LocalAddress(index) = op {
                demoted_indices.insert(*index);
            }
        }

        let mut locals = Vec::with_capacity(bytecode.local_types.len());
        for (index, ty) in bytecode.local_types.iter().enumerate() {
            let zero = self.zero_value(index, ty)?;
            if demoted_indices.contains(&(index as u16)) {
                let slot = self
                    .builder
                    .alloca(self.local_types[index], AddressSpace::Local);
                self.builder.store(slot, zero)?;
                self.demoted.insert(index as u16, slot);
                locals.push(slot);
            } else {
                locals.push(zero);
            }
        }

        let first = self.blocks[&0];
        let state = MachineState {
            stack: Vec::new(),
            locals,
        };
        self.flow(entry, first, &state, 0)?;
        self.builder.branch(first);

        // Process blocks in offset order, re-sweeping until no new entry
        // state appears; a block whose only entry is a back edge becomes
        // processable once its predecessor ran.
        let leaders: Vec<u32> = self.blocks.keys().copied().collect();
        loop {
            let mut progressed = false;
            for leader in &leaders {
                let block = self.blocks[leader];
                if self.visited.contains(&block) {
                    continue;
                }
                let Some(state) = self.states.get(&block).cloned() else {
                    continue;
                };
                self.visited.insert(block);
                self.builder.set_insert_point(block);
                self.simulate(*leader, block, state)?;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }

        // Drop leader blocks nothing flowed into.
        let unvisited: Vec<BlockId> = self
            .blocks
            .values()
            .copied()
            .filter(|block| !self.visited.contains(block))
            .collect();
        for block in unvisited {
            self.builder.remove_block(block);
        }
        Ok(())
    }

    /// Zero value of local `index`, created at the current insert point.
    fn zero_value(&mut self, index: usize, ty: &BytecodeType) -> Result<ValueId> {
        Ok(match ty {
            BytecodeType::Void => {
                return Err(CompileError::UnsupportedInstruction(
                    "local of type void".to_string(),
                ))
            }
            BytecodeType::Scalar(scalar) => {
                let literal = match scalar {
                    ScalarType::Bool => PrimitiveValue::Int1(false),
                    ScalarType::I8 => PrimitiveValue::Int8(0),
                    ScalarType::I16 => PrimitiveValue::Int16(0),
                    ScalarType::I32 => PrimitiveValue::Int32(0),
                    ScalarType::I64 => PrimitiveValue::Int64(0),
                    ScalarType::F32 => PrimitiveValue::Float32(0.0),
                    ScalarType::F64 => PrimitiveValue::Float64(0.0),
                };
                self.builder.primitive(literal)
            }
            _ => self.builder.null(self.local_types[index]),
        })
    }

    /// Propagate `state` along the edge `from -> to`.
    fn flow(
        &mut self,
        from: BlockId,
        to: BlockId,
        state: &MachineState,
        offset: usize,
    ) -> Result<()> {
        let preds = self.pred_count.get(&to).copied().unwrap_or(1);
        if preds <= 1 {
            self.states.insert(to, state.clone());
            return Ok(());
        }
        if !self.joins.contains(&to) {
            // First arrival: materialize φs for every slot.
            self.joins.insert(to);
            let mut stack = Vec::with_capacity(state.stack.len());
            for value in &state.stack {
                let ty = self.builder.context().value(*value).ty;
                let phi = self.builder.create_phi(to, ty);
                self.builder.add_phi_incoming(phi, from, *value);
                stack.push(phi);
            }
            let mut locals = Vec::with_capacity(state.locals.len());
            for (index, value) in state.locals.iter().enumerate() {
                if self.demoted.contains_key(&(index as u16)) {
                    locals.push(*value);
                    continue;
                }
                let ty = self.builder.context().value(*value).ty;
                let phi = self.builder.create_phi(to, ty);
                self.builder.add_phi_incoming(phi, from, *value);
                locals.push(phi);
            }
            self.states.insert(to, MachineState { stack, locals });
            return Ok(());
        }
        let join = self.states.get(&to).cloned().expect("join has a state");
        if join.stack.len() != state.stack.len() {
            return Err(CompileError::InvalidStackState {
                offset,
                message: format!(
                    "stack depth {} does not match join depth {}",
                    state.stack.len(),
                    join.stack.len()
                ),
            });
        }
        for (phi, value) in join.stack.iter().zip(&state.stack) {
            self.add_incoming_checked(*phi, from, *value)?;
        }
        for (index, (phi, value)) in join.locals.iter().zip(&state.locals).enumerate() {
            if self.demoted.contains_key(&(index as u16)) {
                continue;
            }
            self.add_incoming_checked(*phi, from, *value)?;
        }
        Ok(())
    }

    fn add_incoming_checked(&mut self, phi: ValueId, from: BlockId, value: ValueId) -> Result<()> {
        let phi_ty = self.builder.context().value(phi).ty;
        let value_ty = self.builder.context().value(value).ty;
        if phi_ty != value_ty {
            return Err(CompileError::TypeError {
                expected: vega_ir::type_to_string(self.builder.context(), phi_ty),
                actual: vega_ir::type_to_string(self.builder.context(), value_ty),
            });
        }
        self.builder.add_phi_incoming(phi, from, value);
        Ok(())
    }

    fn pop(&self, state: &mut MachineState, offset: usize) -> Result<ValueId> {
        state.stack.pop().ok_or(CompileError::InvalidStackState {
            offset,
            message: "pop on empty evaluation stack".to_string(),
        })
    }

    /// Simulate instructions from `leader` to the end of the block.
    fn simulate(&mut self, leader: u32, block: BlockId, mut state: MachineState) -> Result<()> {
        let bytecode = self.bytecode;
        let code = &bytecode.code;
        let mut pc = leader as usize;
        loop {
            if pc >= code.len() {
                return Err(CompileError::UnsupportedInstruction(
                    "control flow runs off the method end".to_string(),
                ));
            }
            match &code[pc] {
                OpCode::LoadArg(index) => {
                    let value = self.builder.method().params.get(*index as usize).copied();
                    let value = value.ok_or(CompileError::InvalidStackState {
                        offset: pc,
                        message: format!("argument {} out of range", index),
                    })?;
                    state.stack.push(value);
                }
                OpCode::LoadLocal(index) => {
                    let value = match self.demoted.get(index) {
                        Some(slot) => {
                            let slot = *slot;
                            self.builder.load(slot)?
                        }
                        None => state.locals.get(*index as usize).copied().ok_or(
                            CompileError::InvalidStackState {
                                offset: pc,
                                message: format!("local {} out of range", index),
                            },
                        )?,
                    };
                    state.stack.push(value);
                }
                OpCode::StoreLocal(index) => {
                    let value = self.pop(&mut state, pc)?;
                    match self.demoted.get(index) {
                        Some(slot) => {
                            let slot = *slot;
                            self.builder.store(slot, value)?;
                        }
                        None => {
                            let index = *index as usize;
                            if index >= state.locals.len() {
                                return Err(CompileError::InvalidStackState {
                                    offset: pc,
                                    message: format!("local {} out of range", index),
                                });
                            }
                            state.locals[index] = value;
                        }
                    }
                }
                OpCode::LocalAddress(index) => {
                    let slot = *self
                        .demoted
                        .get(index)
                        .expect("address-taken local was demoted");
                    state.stack.push(slot);
                }
                OpCode::Const(literal) => {
                    let value = self.builder.primitive(literal_to_primitive(*literal));
                    state.stack.push(value);
                }
                OpCode::Dup => {
                    let top = state.stack.last().copied().ok_or(
                        CompileError::InvalidStackState {
                            offset: pc,
                            message: "dup on empty evaluation stack".to_string(),
                        },
                    )?;
                    state.stack.push(top);
                }
                OpCode::Pop => {
                    self.pop(&mut state, pc)?;
                }
                OpCode::Binary { op, unsigned } => {
                    let rhs = self.pop(&mut state, pc)?;
                    let lhs = self.pop(&mut state, pc)?;
                    let value = self
                        .builder
                        .binary(bin_op(*op), arith_flags(*unsigned), lhs, rhs)?;
                    state.stack.push(value);
                }
                OpCode::Unary(op) => {
                    let operand = self.pop(&mut state, pc)?;
                    let value = self
                        .builder
                        .unary(un_op(*op), ArithFlags::empty(), operand)?;
                    state.stack.push(value);
                }
                OpCode::Compare { op, unsigned } => {
                    let rhs = self.pop(&mut state, pc)?;
                    let lhs = self.pop(&mut state, pc)?;
                    let value = self
                        .builder
                        .compare(cmp_op(*op), arith_flags(*unsigned), lhs, rhs)?;
                    state.stack.push(value);
                }
                OpCode::Convert { to, unsigned } => {
                    let operand = self.pop(&mut state, pc)?;
                    let target = scalar_to_ir(self.builder.context(), *to);
                    let value = self
                        .builder
                        .convert(target, arith_flags(*unsigned), operand)?;
                    state.stack.push(value);
                }
                OpCode::LoadElement => {
                    let index = self.pop(&mut state, pc)?;
                    let view = self.pop(&mut state, pc)?;
                    let address = self.builder.load_element_address(view, index)?;
                    let value = self.builder.load(address)?;
                    state.stack.push(value);
                }
                OpCode::StoreElement => {
                    let value = self.pop(&mut state, pc)?;
                    let index = self.pop(&mut state, pc)?;
                    let view = self.pop(&mut state, pc)?;
                    let address = self.builder.load_element_address(view, index)?;
                    self.builder.store(address, value)?;
                }
                OpCode::ViewLength => {
                    let view = self.pop(&mut state, pc)?;
                    let value = self.builder.get_field(view, 1)?;
                    state.stack.push(value);
                }
                OpCode::LoadField(index) => {
                    let object = self.pop(&mut state, pc)?;
                    let value = self.builder.get_field(object, *index as usize)?;
                    state.stack.push(value);
                }
                OpCode::StoreField(index) => {
                    let value = self.pop(&mut state, pc)?;
                    let object = self.pop(&mut state, pc)?;
                    let updated = self.builder.set_field(object, *index as usize, value)?;
                    state.stack.push(updated);
                }
                OpCode::LoadIndirect => {
                    let address = self.pop(&mut state, pc)?;
                    let value = self.builder.load(address)?;
                    state.stack.push(value);
                }
                OpCode::StoreIndirect => {
                    let value = self.pop(&mut state, pc)?;
                    let address = self.pop(&mut state, pc)?;
                    self.builder.store(address, value)?;
                }
                OpCode::Call { token } => {
                    let token = *token;
                    self.lower_call(token, &mut state, pc)?;
                }

                OpCode::Branch(target) => {
                    let to = self.blocks[target];
                    self.flow(block, to, &state, pc)?;
                    self.builder.branch(to);
                    return Ok(());
                }
                OpCode::BranchIf(target) | OpCode::BranchIfNot(target) => {
                    let negated = matches!(code[pc], OpCode::BranchIfNot(_));
                    let condition = self.pop(&mut state, pc)?;
                    let taken = self.blocks[target];
                    let fallthrough = self.blocks[&(pc as u32 + 1)];
                    self.flow(block, taken, &state, pc)?;
                    self.flow(block, fallthrough, &state, pc)?;
                    let (on_true, on_false) = if negated {
                        (fallthrough, taken)
                    } else {
                        (taken, fallthrough)
                    };
                    self.builder.cond_branch(condition, on_true, on_false)?;
                    return Ok(());
                }
                OpCode::Switch { targets, default } => {
                    let selector = self.pop(&mut state, pc)?;
                    let mut target_blocks = Vec::with_capacity(targets.len());
                    for target in targets {
                        let to = self.blocks[target];
                        target_blocks.push(to);
                    }
                    let default_block = self.blocks[default];
                    for to in &target_blocks {
                        self.flow(block, *to, &state, pc)?;
                    }
                    self.flow(block, default_block, &state, pc)?;
                    self.builder.switch(selector, target_blocks, default_block)?;
                    return Ok(());
                }
                OpCode::Return => {
                    let value = if bytecode.return_type == BytecodeType::Void {
                        None
                    } else {
                        Some(self.pop(&mut state, pc)?)
                    };
                    self.builder.ret(value);
                    return Ok(());
                }
            }

            // Fallthrough into the next leader closes the block.
            let next = pc as u32 + 1;
            if self.blocks.contains_key(&next) {
                let to = self.blocks[&next];
                self.flow(block, to, &state, pc)?;
                self.builder.branch(to);
                return Ok(());
            }
            pc += 1;
        }
    }

    fn lower_call(&mut self, token: u64, state: &mut MachineState, pc: usize) -> Result<()> {
        let callee = self
            .resolver
            .resolve(token)
            .ok_or_else(|| CompileError::UnsupportedCallTarget(format!("token {}", token)))?
            .clone();
        if let Some(intrinsic) = intrinsics::resolve(&callee.handle.name) {
            return self.lower_intrinsic(intrinsic, state, pc);
        }
        if callee.flags.external {
            return Err(CompileError::UnsupportedCallTarget(format!(
                "external method {}",
                callee.handle
            )));
        }
        let target = self
            .builder
            .context()
            .find_method(&callee.handle)
            .ok_or_else(|| CompileError::UnsupportedCallTarget(callee.handle.to_string()))?;
        let mut args = Vec::with_capacity(callee.param_types.len());
        for _ in 0..callee.param_types.len() {
            args.push(self.pop(state, pc)?);
        }
        args.reverse();
        let result = self.builder.call(target, &args)?;
        if callee.return_type != BytecodeType::Void {
            state.stack.push(result);
        }
        Ok(())
    }

    fn lower_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        state: &mut MachineState,
        pc: usize,
    ) -> Result<()> {
        match intrinsic {
            Intrinsic::Query(query) => {
                let value = self.builder.query(query);
                state.stack.push(value);
            }
            Intrinsic::Barrier => {
                self.builder.barrier();
            }
            Intrinsic::MemoryBarrier(scope) => {
                self.builder.memory_barrier(scope);
            }
            Intrinsic::Shuffle(mode) => {
                let origin = self.pop(state, pc)?;
                let value = self.pop(state, pc)?;
                let shuffled = self
                    .builder
                    .warp_shuffle(mode, FULL_WARP_WIDTH, value, origin)?;
                state.stack.push(shuffled);
            }
            Intrinsic::Atomic(kind) => {
                let value = self.pop(state, pc)?;
                let index = self.pop(state, pc)?;
                let view = self.pop(state, pc)?;
                let address = self.builder.load_element_address(view, index)?;
                let old = self
                    .builder
                    .atomic_rmw(kind, ArithFlags::empty(), address, value)?;
                state.stack.push(old);
            }
            Intrinsic::AtomicCas => {
                let value = self.pop(state, pc)?;
                let compare = self.pop(state, pc)?;
                let index = self.pop(state, pc)?;
                let view = self.pop(state, pc)?;
                let address = self.builder.load_element_address(view, index)?;
                let old = self.builder.atomic_cas(address, compare, value)?;
                state.stack.push(old);
            }
            Intrinsic::MathUnary(op) => {
                let operand = self.pop(state, pc)?;
                let value = self.builder.unary(op, ArithFlags::empty(), operand)?;
                state.stack.push(value);
            }
            Intrinsic::MathBinary(op) => {
                let rhs = self.pop(state, pc)?;
                let lhs = self.pop(state, pc)?;
                let value = self.builder.binary(op, ArithFlags::empty(), lhs, rhs)?;
                state.stack.push(value);
            }
        }
        Ok(())
    }
}

fn literal_to_primitive(literal: Literal) -> PrimitiveValue {
    match literal {
        Literal::Bool(v) => PrimitiveValue::Int1(v),
        Literal::I8(v) => PrimitiveValue::Int8(v),
        Literal::I16(v) => PrimitiveValue::Int16(v),
        Literal::I32(v) => PrimitiveValue::Int32(v),
        Literal::I64(v) => PrimitiveValue::Int64(v),
        Literal::F32(v) => PrimitiveValue::Float32(v),
        Literal::F64(v) => PrimitiveValue::Float64(v),
    }
}

fn arith_flags(unsigned: bool) -> ArithFlags {
    if unsigned {
        ArithFlags::UNSIGNED
    } else {
        ArithFlags::empty()
    }
}

fn bin_op(op: BinOp) -> BinaryArithKind {
    match op {
        BinOp::Add => BinaryArithKind::Add,
        BinOp::Sub => BinaryArithKind::Sub,
        BinOp::Mul => BinaryArithKind::Mul,
        BinOp::Div => BinaryArithKind::Div,
        BinOp::Rem => BinaryArithKind::Rem,
        BinOp::And => BinaryArithKind::And,
        BinOp::Or => BinaryArithKind::Or,
        BinOp::Xor => BinaryArithKind::Xor,
        BinOp::Shl => BinaryArithKind::Shl,
        BinOp::Shr => BinaryArithKind::Shr,
        BinOp::Min => BinaryArithKind::Min,
        BinOp::Max => BinaryArithKind::Max,
    }
}

fn un_op(op: UnOp) -> UnaryArithKind {
    match op {
        UnOp::Neg => UnaryArithKind::Neg,
        UnOp::Not => UnaryArithKind::Not,
        UnOp::Abs => UnaryArithKind::Abs,
        UnOp::Sqrt => UnaryArithKind::Sqrt,
    }
}

fn cmp_op(op: CmpOp) -> CompareKind {
    match op {
        CmpOp::Eq => CompareKind::Equal,
        CmpOp::Ne => CompareKind::NotEqual,
        CmpOp::Lt => CompareKind::LessThan,
        CmpOp::Le => CompareKind::LessEqual,
        CmpOp::Gt => CompareKind::GreaterThan,
        CmpOp::Ge => CompareKind::GreaterEqual,
    }
}
