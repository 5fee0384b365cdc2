//! PTX code generation
//!
//! Walks fully simplified IR in reverse post-order, binds values to
//! registers and prints PTX ISA 6.0 text. Kernels become `.visible .entry
//! ILGPUKernel<id>`; transitively called methods are emitted as `.func`
//! definitions with parameter regions.

mod isa;
mod registers;

pub use registers::{PredicateScope, Register, RegisterAllocator, RegisterKind};

use std::fmt::Write;

use log::debug;

use vega_common::{CompileError, Result};
use vega_ir::analysis::{Liveness, Scope};
use vega_ir::{
    AddressSpace, ArithFlags, BinaryArithKind, BlockId, IrContext, KernelSpecialization, MethodId,
    PrimitiveType, PrimitiveValue, TargetAbi, TernaryArithKind, TypeId, TypeKind, UnaryArithKind,
    ValueId, ValueKind,
};

use crate::{called_methods, function_symbol, EmittedKernel};
use registers::{register_kinds, Binding};

/// PTX backend over one target ABI.
pub struct PtxBackend {
    abi: TargetAbi,
    specialization: KernelSpecialization,
}

impl PtxBackend {
    pub fn new(abi: TargetAbi, specialization: KernelSpecialization) -> Self {
        Self {
            abi,
            specialization,
        }
    }

    /// Emit a kernel module: the entry method plus every method it calls.
    pub fn emit_kernel(&self, context: &IrContext, entry: MethodId) -> Result<EmittedKernel> {
        let symbol = format!("ILGPUKernel{}", context.method(entry).handle().token);
        debug!("emitting PTX for {}", context.method(entry).name());

        let callees = called_methods(context, entry);
        let mut module = String::new();
        let _ = writeln!(module, ".version 6.0");
        let _ = writeln!(module, ".target sm_50");
        let _ = writeln!(module, ".address_size 64");

        let mut globals = Vec::new();
        let mut functions = Vec::new();

        // Declarations first so mutual recursion resolves.
        let mut declarations = Vec::new();
        for callee in &callees {
            let emitter = FunctionEmitter::new(self, context, *callee, false)?;
            declarations.push(emitter.prototype());
        }
        for callee in &callees {
            let mut emitter = FunctionEmitter::new(self, context, *callee, false)?;
            functions.push(emitter.emit(&mut globals)?);
        }
        let mut entry_emitter = FunctionEmitter::new(self, context, entry, true)?;
        functions.push(entry_emitter.emit(&mut globals)?);

        for global in globals {
            let _ = writeln!(module);
            module.push_str(&global);
        }
        for declaration in declarations {
            let _ = writeln!(module);
            module.push_str(&declaration);
        }
        for function in functions {
            let _ = writeln!(module);
            module.push_str(&function);
        }
        Ok(EmittedKernel {
            symbol,
            text: module,
        })
    }
}

struct FunctionEmitter<'c, 'b> {
    backend: &'b PtxBackend,
    context: &'c IrContext,
    method: MethodId,
    is_entry: bool,
    symbol: String,
    scope: Scope,
    liveness: Liveness,
    allocator: RegisterAllocator,
    body: String,
    locals: Vec<String>,
    fast_math: bool,
    depot_count: usize,
}

impl<'c, 'b> FunctionEmitter<'c, 'b> {
    fn new(
        backend: &'b PtxBackend,
        context: &'c IrContext,
        method: MethodId,
        is_entry: bool,
    ) -> Result<Self> {
        let scope = Scope::compute(context, method);
        if scope.is_empty() {
            return Err(CompileError::InvalidCodeGeneration(format!(
                "method {} has no body",
                context.method(method).name()
            )));
        }
        let liveness = Liveness::compute(context, &scope);
        let symbol = if is_entry {
            format!("ILGPUKernel{}", context.method(method).handle().token)
        } else {
            function_symbol(context.method(method))
        };
        Ok(Self {
            backend,
            context,
            method,
            is_entry,
            symbol,
            scope,
            liveness,
            allocator: RegisterAllocator::new(),
            body: String::new(),
            locals: Vec::new(),
            fast_math: backend.specialization.fast_math(),
            depot_count: 0,
        })
    }

    fn abi(&self) -> &TargetAbi {
        &self.backend.abi
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.body.push('\t');
        self.body.push_str(text.as_ref());
        self.body.push('\n');
    }

    fn label(&self, block: BlockId) -> String {
        let index = self.scope.rpo_index(block).unwrap_or(0);
        format!("$L_{}_{}", self.symbol, index)
    }

    fn prim_of(&self, value: ValueId) -> PrimitiveType {
        self.context
            .as_primitive(self.context.value(value).ty)
            .unwrap_or(PrimitiveType::Int64)
    }

    /// Flattened parameter slots of the signature.
    fn param_slots(&self) -> Vec<(usize, RegisterKind)> {
        let mut slots = Vec::new();
        for param in &self.context.method(self.method).params {
            let ty = self.context.value(*param).ty;
            let mut kinds = Vec::new();
            register_kinds(self.context, ty, &mut kinds);
            for kind in kinds {
                slots.push((slots.len(), kind));
            }
        }
        slots
    }

    fn param_type_name(kind: RegisterKind) -> &'static str {
        match kind {
            RegisterKind::Pred | RegisterKind::B32 => ".b32",
            RegisterKind::B16 => ".b16",
            RegisterKind::B64 => ".b64",
            RegisterKind::F32 => ".f32",
            RegisterKind::F64 => ".f64",
        }
    }

    fn signature(&self) -> String {
        let mut text = String::new();
        if self.is_entry {
            let _ = write!(text, ".visible .entry {}(", self.symbol);
        } else {
            let method = self.context.method(self.method);
            let return_type = method.declaration.return_type;
            if return_type == self.context.void_type() {
                let _ = write!(text, ".func {}(", self.symbol);
            } else {
                let mut kinds = Vec::new();
                register_kinds(self.context, return_type, &mut kinds);
                if kinds.len() == 1 {
                    let _ = write!(
                        text,
                        ".func (.param {} {}_retval0) {}(",
                        Self::param_type_name(kinds[0]),
                        self.symbol,
                        self.symbol
                    );
                } else {
                    let size = self.abi().size_of(self.context, return_type);
                    let align = self.abi().align_of(self.context, return_type);
                    let _ = write!(
                        text,
                        ".func (.param .align {} .b8 {}_retval0[{}]) {}(",
                        align, self.symbol, size, self.symbol
                    );
                }
            }
        }
        let slots = self.param_slots();
        for (index, (_, kind)) in slots.iter().enumerate() {
            if index > 0 {
                text.push_str(", ");
            }
            let _ = write!(
                text,
                "\n\t.param {} {}_param_{}",
                Self::param_type_name(*kind),
                self.symbol,
                index
            );
        }
        text.push_str("\n)");
        text
    }

    fn prototype(&self) -> String {
        format!("{};\n", self.signature())
    }

    fn emit(&mut self, globals: &mut Vec<String>) -> Result<String> {
        self.emit_prologue()?;
        self.emit_phi_bindings();
        let blocks: Vec<BlockId> = self.scope.rpo().to_vec();
        for (index, block) in blocks.iter().enumerate() {
            if index > 0 {
                let label = self.label(*block);
                self.body.push_str(&label);
                self.body.push_str(":\n");
            }
            let next = blocks.get(index + 1).copied();
            self.emit_block(*block, next, globals)?;
        }

        // Assemble: signature, directives, register/local declarations,
        // body.
        let mut text = String::new();
        text.push_str(&self.signature());
        text.push('\n');
        if self.is_entry {
            if let Some(pinned) = self.backend.specialization.pinned_group_size() {
                let _ = writeln!(text, ".reqntid {}, 1, 1", pinned);
            } else if let Some(max) = self.backend.specialization.max_group_size {
                let _ = writeln!(text, ".maxntid {}, 1, 1", max);
            }
        }
        text.push_str("{\n");
        for (kind, count) in self.allocator.declared_counts() {
            let _ = writeln!(
                text,
                "\t.reg {} {}<{}>;",
                kind.declaration(),
                kind.prefix(),
                count
            );
        }
        for local in &self.locals {
            text.push('\t');
            text.push_str(local);
            text.push('\n');
        }
        text.push_str(&self.body);
        text.push_str("}\n");
        Ok(text)
    }

    fn emit_prologue(&mut self) -> Result<()> {
        let params = self.context.method(self.method).params.clone();
        let mut slot = 0usize;
        for param in params {
            let ty = self.context.value(param).ty;
            let binding = self.allocator.bind(self.context, param, ty);
            let is_view = self.context.type_kind(ty).is_view();
            for (position, register) in binding.iter().enumerate() {
                let suffix = match register.kind {
                    RegisterKind::B16 => "u16",
                    RegisterKind::B32 | RegisterKind::Pred => "u32",
                    RegisterKind::B64 => "u64",
                    RegisterKind::F32 => "f32",
                    RegisterKind::F64 => "f64",
                };
                self.line(format!(
                    "ld.param.{} {}, [{}_param_{}];",
                    suffix, register, self.symbol, slot
                ));
                // View base pointers arrive generic; accesses are global.
                if self.is_entry && is_view && position == 0 {
                    self.line(format!("cvta.to.global.u64 {}, {};", register, register));
                }
                slot += 1;
            }
        }
        Ok(())
    }

    /// φ registers are live across edges; bind them all up front.
    fn emit_phi_bindings(&mut self) {
        for block in self.scope.rpo() {
            for value in &self.context.block(*block).values {
                if self.context.value(*value).kind.is_phi() {
                    let ty = self.context.value(*value).ty;
                    self.allocator.bind(self.context, *value, ty);
                }
            }
        }
    }

    fn emit_block(
        &mut self,
        block: BlockId,
        next: Option<BlockId>,
        globals: &mut Vec<String>,
    ) -> Result<()> {
        for value in self.context.block(block).values.clone() {
            let node = self.context.value(value);
            if node.kind.is_phi() {
                continue;
            }
            if node.kind.is_terminator() {
                self.emit_phi_copies(block)?;
                self.emit_terminator(value, next)?;
            } else {
                self.emit_value(value, globals)?;
            }
            self.release_dead(value);
        }
        Ok(())
    }

    /// Free operand registers whose live range ends at `value`.
    fn release_dead(&mut self, value: ValueId) {
        let Some(position) = self.liveness.position(value) else {
            return;
        };
        let operands: Vec<ValueId> = self.context.value(value).operands.to_vec();
        for operand in operands {
            if self.liveness.dead_after(operand, position) {
                self.allocator.release(operand);
            }
        }
        // A value nobody uses frees its own registers immediately.
        if self.liveness.last_use(value).is_none() {
            self.allocator.release(value);
        }
    }

    /// Copies into φ registers of every successor, before the terminator.
    fn emit_phi_copies(&mut self, block: BlockId) -> Result<()> {
        for successor in self.context.successors(block) {
            for value in self.context.block(successor).values.clone() {
                let node = self.context.value(value);
                let ValueKind::Phi { incoming } = &node.kind else {
                    continue;
                };
                for (operand, pred) in node.operands.iter().zip(incoming) {
                    if *pred != block {
                        continue;
                    }
                    let sources = self.operand_binding(*operand)?;
                    let targets = self.allocator.binding(value).cloned().ok_or_else(|| {
                        CompileError::InvalidCodeGeneration("phi is not bound".to_string())
                    })?;
                    for (target, source) in targets.iter().zip(sources.iter()) {
                        if target != source {
                            self.line(format!("{} {}, {};", mov_opcode(target.kind), target, source));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn operand_binding(&mut self, value: ValueId) -> Result<Binding> {
        self.allocator
            .binding(value)
            .cloned()
            .ok_or_else(|| {
                CompileError::InvalidCodeGeneration(format!(
                    "operand {} has no register binding",
                    value
                ))
            })
    }

    fn scalar_reg(&mut self, value: ValueId) -> Result<Register> {
        Ok(self.operand_binding(value)?[0])
    }

    fn emit_terminator(&mut self, value: ValueId, next: Option<BlockId>) -> Result<()> {
        let node = self.context.value(value).clone();
        match &node.kind {
            ValueKind::Branch { target } => {
                if next != Some(*target) {
                    let label = self.label(*target);
                    self.line(format!("bra {};", label));
                }
            }
            ValueKind::ConditionalBranch {
                true_target,
                false_target,
            } => {
                let pred = self.scalar_reg(node.operands[0])?;
                let true_label = self.label(*true_target);
                self.line(format!("@{} bra {};", pred, true_label));
                if next != Some(*false_target) {
                    let false_label = self.label(*false_target);
                    self.line(format!("bra {};", false_label));
                }
            }
            ValueKind::Switch { targets, default } => {
                let selector = self.scalar_reg(node.operands[0])?;
                let pred = self.allocator.temp(RegisterKind::Pred);
                for (case, target) in targets.iter().enumerate() {
                    let label = self.label(*target);
                    self.line(format!("setp.eq.s32 {}, {}, {};", pred, selector, case));
                    self.line(format!("@{} bra {};", pred, label));
                }
                self.allocator.release_temp(pred);
                if next != Some(*default) {
                    let label = self.label(*default);
                    self.line(format!("bra {};", label));
                }
            }
            ValueKind::Return => {
                if !self.is_entry && !node.operands.is_empty() {
                    let returned = node.operands[0];
                    let ty = self.context.value(returned).ty;
                    let binding = self.operand_binding(returned)?;
                    if binding.len() == 1 {
                        let suffix = Self::param_type_name(binding[0].kind)
                            .trim_start_matches('.')
                            .to_string();
                        let source = self.materialized(binding[0])?;
                        self.line(format!(
                            "st.param.{} [{}_retval0], {};",
                            suffix, self.symbol, source
                        ));
                    } else {
                        self.store_tuple_to_param(ty, &binding, "_retval0")?;
                    }
                }
                self.line("ret;");
            }
            _ => unreachable!("not a terminator"),
        }
        Ok(())
    }

    /// Predicates cannot be stored directly; route through selp.
    fn materialized(&mut self, register: Register) -> Result<Register> {
        if register.kind != RegisterKind::Pred {
            return Ok(register);
        }
        let scope = PredicateScope::enter(&mut self.allocator);
        self.line(scope.materialize(register));
        let temp = scope.register();
        // The scratch register stays live until the caller has consumed
        // it within the same statement sequence; it is reclaimed lazily.
        Ok(temp)
    }

    /// Store a multi-register value into a byte-array param at ABI offsets.
    fn store_tuple_to_param(&mut self, ty: TypeId, binding: &Binding, param: &str) -> Result<()> {
        let offsets = flattened_offsets(self.context, self.abi(), ty);
        for (register, offset) in binding.iter().zip(offsets) {
            let suffix = Self::param_type_name(register.kind)
                .trim_start_matches('.')
                .to_string();
            let source = self.materialized(*register)?;
            self.line(format!(
                "st.param.{} [{}{}+{}], {};",
                suffix, self.symbol, param, offset, source
            ));
        }
        Ok(())
    }

    fn emit_value(&mut self, value: ValueId, globals: &mut Vec<String>) -> Result<()> {
        let node = self.context.value(value).clone();
        match &node.kind {
            ValueKind::Constant(literal) => self.emit_constant(value, *literal),
            ValueKind::Null | ValueKind::Poison => self.emit_zero(value),
            ValueKind::StringConstant(text) => self.emit_string(value, text, globals),
            ValueKind::SizeOf(ty) => {
                let size = self.abi().size_of(self.context, *ty);
                let ty_i32 = self.context.primitive_type(PrimitiveType::Int32);
                let binding = self.allocator.bind(self.context, value, ty_i32);
                self.line(format!("mov.s32 {}, {};", binding[0], size));
                Ok(())
            }
            ValueKind::Parameter { .. } => Ok(()),
            ValueKind::UnaryArith { op, .. } => self.emit_unary(value, *op, &node),
            ValueKind::BinaryArith { op, flags } => self.emit_binary(value, *op, *flags, &node),
            ValueKind::TernaryArith { op, flags } => self.emit_ternary(value, *op, *flags, &node),
            ValueKind::Compare { kind, flags } => {
                let prim = self.prim_of(node.operands[0]);
                let lhs = self.scalar_reg(node.operands[0])?;
                let rhs = self.scalar_reg(node.operands[1])?;
                let binding = self.allocator.bind(self.context, value, node.ty);
                if prim == PrimitiveType::Int1 {
                    let opcode = match kind {
                        vega_ir::CompareKind::Equal => "xor.pred",
                        vega_ir::CompareKind::NotEqual => "xor.pred",
                        _ => {
                            return Err(CompileError::NotSupported(
                                "ordered comparison of predicates".to_string(),
                            ))
                        }
                    };
                    self.line(format!("{} {}, {}, {};", opcode, binding[0], lhs, rhs));
                    if matches!(kind, vega_ir::CompareKind::Equal) {
                        self.line(format!("not.pred {}, {};", binding[0], binding[0]));
                    }
                } else {
                    let opcode = isa::compare_opcode(*kind, prim, *flags);
                    self.line(format!("{} {}, {}, {};", opcode, binding[0], lhs, rhs));
                }
                Ok(())
            }
            ValueKind::Convert { flags } => self.emit_convert(value, *flags, &node),
            ValueKind::PointerCast => {
                let source = self.scalar_reg(node.operands[0])?;
                let binding = self.allocator.bind(self.context, value, node.ty);
                self.line(format!("mov.u64 {}, {};", binding[0], source));
                Ok(())
            }
            ValueKind::BitCast => {
                let source = self.scalar_reg(node.operands[0])?;
                let prim = self
                    .context
                    .as_primitive(node.ty)
                    .expect("bit casts are primitive");
                let binding = self.allocator.bind(self.context, value, node.ty);
                self.line(format!(
                    "mov.{} {}, {};",
                    isa::bit_suffix(prim),
                    binding[0],
                    source
                ));
                Ok(())
            }
            ValueKind::Load => self.emit_load(value, &node),
            ValueKind::Store => self.emit_store(&node),
            ValueKind::Alloca { .. } => self.emit_alloca(value, &node),
            ValueKind::MemoryBarrier { scope } => {
                self.line(isa::membar_opcode(*scope));
                Ok(())
            }
            ValueKind::Barrier => {
                self.line("bar.sync 0;");
                Ok(())
            }
            ValueKind::GetField { index } => self.emit_get_field(value, *index, &node),
            ValueKind::SetField { index } => self.emit_set_field(value, *index, &node),
            ValueKind::LoadFieldAddress { index } => {
                self.emit_load_field_address(value, *index, &node)
            }
            ValueKind::LoadElementAddress => self.emit_load_element_address(value, &node),
            ValueKind::AtomicRmw { op, flags } => {
                let element = self.prim_of(value);
                let space = self.pointer_space(node.operands[0]);
                let opcode = isa::atomic_opcode(*op, element, space, *flags)?;
                let address = self.scalar_reg(node.operands[0])?;
                let operand = self.scalar_reg(node.operands[1])?;
                let binding = self.allocator.bind(self.context, value, node.ty);
                self.line(format!(
                    "{} {}, [{}], {};",
                    opcode, binding[0], address, operand
                ));
                Ok(())
            }
            ValueKind::AtomicCas => {
                let element = self.prim_of(value);
                let space = self.pointer_space(node.operands[0]);
                let address = self.scalar_reg(node.operands[0])?;
                let compare = self.scalar_reg(node.operands[1])?;
                let new_value = self.scalar_reg(node.operands[2])?;
                let binding = self.allocator.bind(self.context, value, node.ty);
                self.line(format!(
                    "atom{}.cas.{} {}, [{}], {}, {};",
                    isa::space_qualifier(space),
                    isa::bit_suffix(element),
                    binding[0],
                    address,
                    compare,
                    new_value
                ));
                Ok(())
            }
            ValueKind::Query(query) => {
                let binding = self.allocator.bind(self.context, value, node.ty);
                self.line(format!(
                    "mov.u32 {}, {};",
                    binding[0],
                    isa::query_register(*query)
                ));
                Ok(())
            }
            ValueKind::WarpShuffle { mode, width } => {
                let clamp = isa::shuffle_clamp(*mode, *width, self.abi().warp_size);
                let source = self.scalar_reg(node.operands[0])?;
                let origin = self.scalar_reg(node.operands[1])?;
                let binding = self.allocator.bind(self.context, value, node.ty);
                // Shuffles move raw 32-bit lanes; floats bounce through
                // b32 scratch registers.
                if source.kind == RegisterKind::F32 {
                    let in_temp = self.allocator.temp(RegisterKind::B32);
                    let out_temp = self.allocator.temp(RegisterKind::B32);
                    self.line(format!("mov.b32 {}, {};", in_temp, source));
                    self.line(format!(
                        "shfl.sync.{}.b32 {}, {}, {}, {}, 0xffffffff;",
                        mode.mnemonic(),
                        out_temp,
                        in_temp,
                        origin,
                        clamp
                    ));
                    self.line(format!("mov.b32 {}, {};", binding[0], out_temp));
                    self.allocator.release_temp(in_temp);
                    self.allocator.release_temp(out_temp);
                } else {
                    self.line(format!(
                        "shfl.sync.{}.b32 {}, {}, {}, {}, 0xffffffff;",
                        mode.mnemonic(),
                        binding[0],
                        source,
                        origin,
                        clamp
                    ));
                }
                Ok(())
            }
            ValueKind::Call { target } => self.emit_call(value, *target, &node),
            ValueKind::Phi { .. }
            | ValueKind::Branch { .. }
            | ValueKind::ConditionalBranch { .. }
            | ValueKind::Switch { .. }
            | ValueKind::Return => unreachable!("handled by the block walker"),
        }
    }

    fn pointer_space(&self, address: ValueId) -> AddressSpace {
        match self.context.type_kind(self.context.value(address).ty) {
            TypeKind::Pointer { space, .. } => *space,
            _ => AddressSpace::Generic,
        }
    }

    fn emit_constant(&mut self, value: ValueId, literal: PrimitiveValue) -> Result<()> {
        let ty = self.context.value(value).ty;
        let binding = self.allocator.bind(self.context, value, ty);
        let register = binding[0];
        let line = match literal {
            PrimitiveValue::Int1(v) => format!("mov.pred {}, {};", register, v as u8),
            PrimitiveValue::Int8(v) => format!("mov.s16 {}, {};", register, v),
            PrimitiveValue::Int16(v) => format!("mov.s16 {}, {};", register, v),
            PrimitiveValue::Int32(v) => format!("mov.s32 {}, {};", register, v),
            PrimitiveValue::Int64(v) => format!("mov.s64 {}, {};", register, v),
            PrimitiveValue::Float32(v) => {
                format!("mov.f32 {}, {};", register, isa::f32_literal(v))
            }
            PrimitiveValue::Float64(v) => {
                format!("mov.f64 {}, {};", register, isa::f64_literal(v))
            }
        };
        self.line(line);
        Ok(())
    }

    /// Null and poison lower to zeros of every child register; null views
    /// become a (0, 0) pointer/length pair.
    fn emit_zero(&mut self, value: ValueId) -> Result<()> {
        let ty = self.context.value(value).ty;
        let binding = self.allocator.bind(self.context, value, ty);
        for register in binding.iter() {
            let line = match register.kind {
                RegisterKind::Pred => format!("mov.pred {}, 0;", register),
                RegisterKind::B16 => format!("mov.s16 {}, 0;", register),
                RegisterKind::B32 => format!("mov.s32 {}, 0;", register),
                RegisterKind::B64 => format!("mov.s64 {}, 0;", register),
                RegisterKind::F32 => format!("mov.f32 {}, {};", register, isa::f32_literal(0.0)),
                RegisterKind::F64 => format!("mov.f64 {}, {};", register, isa::f64_literal(0.0)),
            };
            self.line(line);
        }
        Ok(())
    }

    fn emit_string(
        &mut self,
        value: ValueId,
        text: &str,
        globals: &mut Vec<String>,
    ) -> Result<()> {
        let id = globals.len();
        let mut bytes: Vec<u8> = text.as_bytes().to_vec();
        bytes.push(0);
        let rendered: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
        globals.push(format!(
            ".global .align 1 .b8 __strconst{}[{}] = {{{}}};\n",
            id,
            bytes.len(),
            rendered.join(", ")
        ));
        let ty = self.context.value(value).ty;
        let binding = self.allocator.bind(self.context, value, ty);
        self.line(format!("mov.u64 {}, __strconst{};", binding[0], id));
        Ok(())
    }

    fn emit_unary(&mut self, value: ValueId, op: UnaryArithKind, node: &vega_ir::Value) -> Result<()> {
        let prim = self.prim_of(value);
        let source = self.scalar_reg(node.operands[0])?;
        let binding = self.allocator.bind(self.context, value, node.ty);
        let target = binding[0];
        match op {
            // exp and log have no direct opcode; scale around ex2/lg2.
            UnaryArithKind::Exp | UnaryArithKind::Log | UnaryArithKind::Tanh
                if prim == PrimitiveType::Float64 =>
            {
                return Err(CompileError::NotSupported(format!(
                    "{} on f64 for the PTX backend",
                    op.mnemonic()
                )))
            }
            UnaryArithKind::Exp => {
                let temp = self.allocator.temp(RegisterKind::F32);
                self.line(format!(
                    "mul.f32 {}, {}, {};",
                    temp,
                    source,
                    isa::f32_literal(std::f32::consts::LOG2_E)
                ));
                self.line(format!("ex2.approx.f32 {}, {};", target, temp));
                self.allocator.release_temp(temp);
            }
            UnaryArithKind::Log => {
                let temp = self.allocator.temp(RegisterKind::F32);
                self.line(format!("lg2.approx.f32 {}, {};", temp, source));
                self.line(format!(
                    "mul.f32 {}, {}, {};",
                    target,
                    temp,
                    isa::f32_literal(std::f32::consts::LN_2)
                ));
                self.allocator.release_temp(temp);
            }
            UnaryArithKind::Tanh => {
                self.line(format!("tanh.approx.f32 {}, {};", target, source));
            }
            UnaryArithKind::Not if prim == PrimitiveType::Int1 => {
                self.line(format!("not.pred {}, {};", target, source));
            }
            _ => {
                let opcode = isa::unary_opcode(op, prim, self.fast_math)?;
                self.line(format!("{} {}, {};", opcode, target, source));
            }
        }
        Ok(())
    }

    fn emit_binary(
        &mut self,
        value: ValueId,
        op: BinaryArithKind,
        flags: ArithFlags,
        node: &vega_ir::Value,
    ) -> Result<()> {
        let prim = self.prim_of(value);
        let lhs = self.scalar_reg(node.operands[0])?;
        let rhs = self.scalar_reg(node.operands[1])?;
        let binding = self.allocator.bind(self.context, value, node.ty);
        let target = binding[0];
        let fast = self.fast_math || flags.contains(ArithFlags::FAST_MATH);

        match op {
            BinaryArithKind::And | BinaryArithKind::Or | BinaryArithKind::Xor => {
                let suffix = if prim == PrimitiveType::Int1 {
                    "pred"
                } else {
                    isa::bit_suffix(prim)
                };
                let name = isa::binary_opcode(op, prim, fast)?;
                self.line(format!("{}.{} {}, {}, {};", name, suffix, target, lhs, rhs));
            }
            BinaryArithKind::Shl => {
                let amount = self.shift_amount(rhs)?;
                self.line(format!(
                    "shl.{} {}, {}, {};",
                    isa::bit_suffix(prim),
                    target,
                    lhs,
                    amount
                ));
            }
            BinaryArithKind::Shr => {
                let amount = self.shift_amount(rhs)?;
                self.line(format!(
                    "shr.{} {}, {}, {};",
                    isa::arith_suffix(prim, flags),
                    target,
                    lhs,
                    amount
                ));
            }
            BinaryArithKind::Pow => {
                if prim != PrimitiveType::Float32 {
                    return Err(CompileError::NotSupported(
                        "pow outside f32 for the PTX backend".to_string(),
                    ));
                }
                // a^b = ex2(b * lg2(a))
                let temp = self.allocator.temp(RegisterKind::F32);
                self.line(format!("lg2.approx.f32 {}, {};", temp, lhs));
                self.line(format!("mul.f32 {}, {}, {};", temp, temp, rhs));
                self.line(format!("ex2.approx.f32 {}, {};", target, temp));
                self.allocator.release_temp(temp);
            }
            BinaryArithKind::CopySign => {
                // PTX takes the sign from the first operand.
                let suffix = isa::arith_suffix(prim, flags);
                self.line(format!("copysign.{} {}, {}, {};", suffix, target, rhs, lhs));
            }
            BinaryArithKind::Atan2 => {
                return Err(CompileError::NotSupported(
                    "atan2 for the PTX backend".to_string(),
                ))
            }
            BinaryArithKind::Rem if prim.is_float() => {
                // fmod(a, b) = a - trunc(a / b) * b
                let kind = if prim == PrimitiveType::Float32 {
                    RegisterKind::F32
                } else {
                    RegisterKind::F64
                };
                let suffix = isa::arith_suffix(prim, flags);
                let quotient = self.allocator.temp(kind);
                self.line(format!(
                    "div.rn.{} {}, {}, {};",
                    suffix, quotient, lhs, rhs
                ));
                self.line(format!(
                    "cvt.rzi.{}.{} {}, {};",
                    suffix, suffix, quotient, quotient
                ));
                self.line(format!(
                    "mul.{} {}, {}, {};",
                    suffix, quotient, quotient, rhs
                ));
                self.line(format!("sub.{} {}, {}, {};", suffix, target, lhs, quotient));
                self.allocator.release_temp(quotient);
            }
            _ => {
                let name = isa::binary_opcode(op, prim, fast)?;
                let suffix = isa::arith_suffix(prim, flags);
                self.line(format!("{}.{} {}, {}, {};", name, suffix, target, lhs, rhs));
            }
        }
        Ok(())
    }

    /// Shift amounts are 32-bit; widen or narrow as needed.
    fn shift_amount(&mut self, amount: Register) -> Result<Register> {
        if amount.kind == RegisterKind::B32 {
            return Ok(amount);
        }
        let temp = self.allocator.temp(RegisterKind::B32);
        match amount.kind {
            RegisterKind::B64 => self.line(format!("cvt.u32.u64 {}, {};", temp, amount)),
            RegisterKind::B16 => self.line(format!("cvt.u32.u16 {}, {};", temp, amount)),
            _ => {
                return Err(CompileError::InvalidCodeGeneration(
                    "shift amount is not an integer register".to_string(),
                ))
            }
        }
        Ok(temp)
    }

    fn emit_ternary(
        &mut self,
        value: ValueId,
        op: TernaryArithKind,
        _flags: ArithFlags,
        node: &vega_ir::Value,
    ) -> Result<()> {
        let prim = self.prim_of(value);
        let a = self.scalar_reg(node.operands[0])?;
        let b = self.scalar_reg(node.operands[1])?;
        let c = self.scalar_reg(node.operands[2])?;
        let binding = self.allocator.bind(self.context, value, node.ty);
        match op {
            TernaryArithKind::MultiplyAdd => {
                let line = match prim {
                    PrimitiveType::Float32 => {
                        format!("fma.rn.f32 {}, {}, {}, {};", binding[0], a, b, c)
                    }
                    PrimitiveType::Float64 => {
                        format!("fma.rn.f64 {}, {}, {}, {};", binding[0], a, b, c)
                    }
                    _ => format!(
                        "mad.lo.{} {}, {}, {}, {};",
                        isa::arith_suffix(prim, ArithFlags::empty()),
                        binding[0],
                        a,
                        b,
                        c
                    ),
                };
                self.line(line);
            }
        }
        Ok(())
    }

    fn emit_convert(
        &mut self,
        value: ValueId,
        flags: ArithFlags,
        node: &vega_ir::Value,
    ) -> Result<()> {
        let source_prim = self.prim_of(node.operands[0]);
        let target_prim = self
            .context
            .as_primitive(node.ty)
            .expect("convert target is primitive");
        let source = self.scalar_reg(node.operands[0])?;
        let binding = self.allocator.bind(self.context, value, node.ty);
        let target = binding[0];

        if source_prim == PrimitiveType::Int1 {
            // Predicate to integer/float.
            self.line(format!("selp.{} {}, 1, 0, {};", isa::bit_suffix(target_prim), target, source));
            return Ok(());
        }
        if target_prim == PrimitiveType::Int1 {
            let suffix = isa::arith_suffix(source_prim, flags);
            self.line(format!("setp.ne.{} {}, {}, 0;", suffix, target, source));
            return Ok(());
        }

        let src = cvt_suffix(source_prim, flags);
        let dst = cvt_suffix(target_prim, flags);
        let rounding = if source_prim.is_float() && !target_prim.is_float() {
            ".rzi"
        } else if !source_prim.is_float() && target_prim.is_float() {
            ".rn"
        } else if source_prim == PrimitiveType::Float64 && target_prim == PrimitiveType::Float32 {
            ".rn"
        } else {
            ""
        };
        self.line(format!("cvt{}.{}.{} {}, {};", rounding, dst, src, target, source));
        Ok(())
    }

    fn emit_load(&mut self, value: ValueId, node: &vega_ir::Value) -> Result<()> {
        let address = self.scalar_reg(node.operands[0])?;
        let space = self.pointer_space(node.operands[0]);
        let ty = node.ty;
        let binding = self.allocator.bind(self.context, value, ty);
        self.load_at(ty, address, 0, &binding, space)
    }

    /// Recursive load of a (possibly aggregate) value from `base+offset`.
    fn load_at(
        &mut self,
        ty: TypeId,
        base: Register,
        offset: u32,
        registers: &[Register],
        space: AddressSpace,
    ) -> Result<()> {
        match self.context.type_kind(ty).clone() {
            TypeKind::Primitive(prim) => {
                let qualifier = isa::space_qualifier(space);
                if prim == PrimitiveType::Int1 {
                    let temp = self.allocator.temp(RegisterKind::B16);
                    self.line(format!("ld{}.u8 {}, [{}+{}];", qualifier, temp, base, offset));
                    self.line(format!("setp.ne.b16 {}, {}, 0;", registers[0], temp));
                    self.allocator.release_temp(temp);
                } else {
                    let suffix = isa::memory_suffix(prim, ArithFlags::empty());
                    self.line(format!(
                        "ld{}.{} {}, [{}+{}];",
                        qualifier, suffix, registers[0], base, offset
                    ));
                }
                Ok(())
            }
            TypeKind::Pointer { .. } => {
                let qualifier = isa::space_qualifier(space);
                self.line(format!(
                    "ld{}.u64 {}, [{}+{}];",
                    qualifier, registers[0], base, offset
                ));
                Ok(())
            }
            TypeKind::View { .. } => {
                let qualifier = isa::space_qualifier(space);
                self.line(format!(
                    "ld{}.u64 {}, [{}+{}];",
                    qualifier, registers[0], base, offset
                ));
                self.line(format!(
                    "ld{}.u32 {}, [{}+{}];",
                    qualifier,
                    registers[1],
                    base,
                    offset + self.abi().pointer_size
                ));
                Ok(())
            }
            TypeKind::Structure { fields } => {
                let offsets = self.abi().field_offsets(self.context, ty);
                let mut cursor = 0usize;
                for (field, field_offset) in fields.iter().zip(offsets) {
                    let mut kinds = Vec::new();
                    register_kinds(self.context, *field, &mut kinds);
                    let count = kinds.len();
                    self.load_at(
                        *field,
                        base,
                        offset + field_offset,
                        &registers[cursor..cursor + count],
                        space,
                    )?;
                    cursor += count;
                }
                Ok(())
            }
            TypeKind::Array { .. } => Err(CompileError::NotSupported(
                "direct loads of array values".to_string(),
            )),
        }
    }

    fn emit_store(&mut self, node: &vega_ir::Value) -> Result<()> {
        let address = self.scalar_reg(node.operands[0])?;
        let space = self.pointer_space(node.operands[0]);
        let stored = node.operands[1];
        let ty = self.context.value(stored).ty;
        let binding = self.operand_binding(stored)?;
        self.store_at(ty, address, 0, &binding, space)
    }

    fn store_at(
        &mut self,
        ty: TypeId,
        base: Register,
        offset: u32,
        registers: &[Register],
        space: AddressSpace,
    ) -> Result<()> {
        match self.context.type_kind(ty).clone() {
            TypeKind::Primitive(prim) => {
                let qualifier = isa::space_qualifier(space);
                if prim == PrimitiveType::Int1 {
                    let scope = PredicateScope::enter(&mut self.allocator);
                    self.line(scope.materialize(registers[0]));
                    self.line(format!(
                        "st{}.u8 [{}+{}], {};",
                        qualifier,
                        base,
                        offset,
                        scope.register()
                    ));
                    scope.exit(&mut self.allocator);
                } else {
                    let suffix = isa::memory_suffix(prim, ArithFlags::empty());
                    self.line(format!(
                        "st{}.{} [{}+{}], {};",
                        qualifier, suffix, base, offset, registers[0]
                    ));
                }
                Ok(())
            }
            TypeKind::Pointer { .. } => {
                let qualifier = isa::space_qualifier(space);
                self.line(format!(
                    "st{}.u64 [{}+{}], {};",
                    qualifier, base, offset, registers[0]
                ));
                Ok(())
            }
            TypeKind::View { .. } => {
                let qualifier = isa::space_qualifier(space);
                self.line(format!(
                    "st{}.u64 [{}+{}], {};",
                    qualifier, base, offset, registers[0]
                ));
                self.line(format!(
                    "st{}.u32 [{}+{}], {};",
                    qualifier,
                    base,
                    offset + self.abi().pointer_size,
                    registers[1]
                ));
                Ok(())
            }
            TypeKind::Structure { fields } => {
                let offsets = self.abi().field_offsets(self.context, ty);
                let mut cursor = 0usize;
                for (field, field_offset) in fields.iter().zip(offsets) {
                    let mut kinds = Vec::new();
                    register_kinds(self.context, *field, &mut kinds);
                    let count = kinds.len();
                    self.store_at(
                        *field,
                        base,
                        offset + field_offset,
                        &registers[cursor..cursor + count],
                        space,
                    )?;
                    cursor += count;
                }
                Ok(())
            }
            TypeKind::Array { .. } => Err(CompileError::NotSupported(
                "direct stores of array values".to_string(),
            )),
        }
    }

    fn emit_alloca(&mut self, value: ValueId, node: &vega_ir::Value) -> Result<()> {
        let pointee = match self.context.type_kind(node.ty) {
            TypeKind::Pointer { element, .. } => *element,
            _ => unreachable!("alloca result is a pointer"),
        };
        let size = self.abi().size_of(self.context, pointee).max(1);
        let align = self.abi().align_of(self.context, pointee).max(1);
        let name = format!("__depot{}_{}", self.depot_count, self.symbol);
        self.depot_count += 1;
        self.locals
            .push(format!(".local .align {} .b8 {}[{}];", align, name, size));
        let binding = self.allocator.bind(self.context, value, node.ty);
        self.line(format!("mov.u64 {}, {};", binding[0], name));
        Ok(())
    }

    fn emit_get_field(&mut self, value: ValueId, index: usize, node: &vega_ir::Value) -> Result<()> {
        let source = node.operands[0];
        let source_ty = self.context.value(source).ty;
        let source_binding = self.operand_binding(source)?;
        let range = field_register_range(self.context, source_ty, index);
        let binding = self.allocator.bind(self.context, value, node.ty);
        for (target, source_register) in binding
            .iter()
            .zip(source_binding[range.0..range.0 + range.1].iter())
        {
            self.line(format!(
                "{} {}, {};",
                mov_opcode(target.kind),
                target,
                source_register
            ));
        }
        Ok(())
    }

    fn emit_set_field(&mut self, value: ValueId, index: usize, node: &vega_ir::Value) -> Result<()> {
        let source = node.operands[0];
        let replacement = node.operands[1];
        let source_ty = self.context.value(source).ty;
        let source_binding = self.operand_binding(source)?;
        let replacement_binding = self.operand_binding(replacement)?;
        let binding = self.allocator.bind(self.context, value, node.ty);
        // Copy the whole structure, then overwrite the field registers.
        for (target, source_register) in binding.iter().zip(source_binding.iter()) {
            self.line(format!(
                "{} {}, {};",
                mov_opcode(target.kind),
                target,
                source_register
            ));
        }
        let range = field_register_range(self.context, source_ty, index);
        for (target, source_register) in binding[range.0..range.0 + range.1]
            .iter()
            .zip(replacement_binding.iter())
        {
            self.line(format!(
                "{} {}, {};",
                mov_opcode(target.kind),
                target,
                source_register
            ));
        }
        Ok(())
    }

    fn emit_load_field_address(
        &mut self,
        value: ValueId,
        index: usize,
        node: &vega_ir::Value,
    ) -> Result<()> {
        let source = node.operands[0];
        let pointee = match self.context.type_kind(self.context.value(source).ty) {
            TypeKind::Pointer { element, .. } => *element,
            _ => unreachable!("field address source is a pointer"),
        };
        let offset = self.abi().field_offset(self.context, pointee, index);
        let source_binding = self.operand_binding(source)?;
        if offset == 0 {
            // Zero offsets alias the source register instead of adding.
            self.allocator.bind_alias(value, source_binding);
            return Ok(());
        }
        let binding = self.allocator.bind(self.context, value, node.ty);
        self.line(format!(
            "add.s64 {}, {}, {};",
            binding[0], source_binding[0], offset
        ));
        Ok(())
    }

    fn emit_load_element_address(&mut self, value: ValueId, node: &vega_ir::Value) -> Result<()> {
        let source = node.operands[0];
        let index = node.operands[1];
        let element = match self.context.type_kind(self.context.value(source).ty) {
            TypeKind::Pointer { element, .. } | TypeKind::View { element, .. } => *element,
            _ => unreachable!("element address source is a view or pointer"),
        };
        let element_size = self.abi().size_of(self.context, element).max(1);
        let base = self.operand_binding(source)?[0];
        let index_register = self.scalar_reg(index)?;
        let binding = self.allocator.bind(self.context, value, node.ty);
        match index_register.kind {
            RegisterKind::B32 => {
                let temp = self.allocator.temp(RegisterKind::B64);
                self.line(format!(
                    "mul.wide.s32 {}, {}, {};",
                    temp, index_register, element_size
                ));
                self.line(format!("add.s64 {}, {}, {};", binding[0], base, temp));
                self.allocator.release_temp(temp);
            }
            RegisterKind::B64 => {
                let temp = self.allocator.temp(RegisterKind::B64);
                self.line(format!(
                    "mul.lo.s64 {}, {}, {};",
                    temp, index_register, element_size
                ));
                self.line(format!("add.s64 {}, {}, {};", binding[0], base, temp));
                self.allocator.release_temp(temp);
            }
            _ => {
                return Err(CompileError::InvalidCodeGeneration(
                    "element index is not an integer register".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn emit_call(&mut self, value: ValueId, target: MethodId, node: &vega_ir::Value) -> Result<()> {
        let callee = self.context.method(target);
        let callee_symbol = function_symbol(callee);
        let return_type = callee.declaration.return_type;
        let is_void = return_type == self.context.void_type();

        self.line("{");
        // Argument parameter regions with stores.
        let mut param_names = Vec::new();
        for (arg_index, arg) in node.operands.iter().enumerate() {
            let binding = self.operand_binding(*arg)?;
            for (slot, register) in binding.iter().enumerate() {
                let name = format!("param{}_{}", arg_index, slot);
                let type_name = Self::param_type_name(register.kind);
                let suffix = type_name.trim_start_matches('.').to_string();
                self.line(format!(".param {} {};", type_name, name));
                let source = self.materialized(*register)?;
                self.line(format!("st.param.{} [{}], {};", suffix, name, source));
                param_names.push(name);
            }
        }

        if is_void {
            self.line(format!(
                "call.uni {}, ({});",
                callee_symbol,
                param_names.join(", ")
            ));
        } else {
            let mut kinds = Vec::new();
            register_kinds(self.context, return_type, &mut kinds);
            if kinds.len() == 1 {
                let type_name = Self::param_type_name(kinds[0]);
                let suffix = type_name.trim_start_matches('.').to_string();
                self.line(format!(".param {} retval0;", type_name));
                self.line(format!(
                    "call.uni (retval0), {}, ({});",
                    callee_symbol,
                    param_names.join(", ")
                ));
                let binding = self.allocator.bind(self.context, value, node.ty);
                self.line(format!("ld.param.{} {}, [retval0];", suffix, binding[0]));
            } else {
                let size = self.abi().size_of(self.context, return_type);
                let align = self.abi().align_of(self.context, return_type);
                self.line(format!(".param .align {} .b8 retval0[{}];", align, size));
                self.line(format!(
                    "call.uni (retval0), {}, ({});",
                    callee_symbol,
                    param_names.join(", ")
                ));
                let binding = self.allocator.bind(self.context, value, node.ty);
                let offsets = flattened_offsets(self.context, self.abi(), return_type);
                for (register, offset) in binding.iter().zip(offsets) {
                    let suffix = Self::param_type_name(register.kind)
                        .trim_start_matches('.')
                        .to_string();
                    self.line(format!(
                        "ld.param.{} {}, [retval0+{}];",
                        suffix, register, offset
                    ));
                }
            }
        }
        self.line("}");
        Ok(())
    }
}

/// Mov opcode per register class.
fn mov_opcode(kind: RegisterKind) -> &'static str {
    match kind {
        RegisterKind::Pred => "mov.pred",
        RegisterKind::B16 => "mov.b16",
        RegisterKind::B32 => "mov.b32",
        RegisterKind::B64 => "mov.b64",
        RegisterKind::F32 => "mov.f32",
        RegisterKind::F64 => "mov.f64",
    }
}

/// Conversion suffix of a primitive for `cvt`.
fn cvt_suffix(prim: PrimitiveType, flags: ArithFlags) -> &'static str {
    isa::arith_suffix(prim, flags)
}

/// Register index range `(start, len)` of a structure/view field within
/// the flattened binding.
fn field_register_range(context: &IrContext, ty: TypeId, index: usize) -> (usize, usize) {
    match context.type_kind(ty) {
        TypeKind::View { .. } => {
            if index == 0 {
                (0, 1)
            } else {
                (1, 1)
            }
        }
        TypeKind::Structure { fields } => {
            let mut start = 0usize;
            for field in fields.iter().take(index) {
                let mut kinds = Vec::new();
                register_kinds(context, *field, &mut kinds);
                start += kinds.len();
            }
            let mut kinds = Vec::new();
            register_kinds(context, fields[index], &mut kinds);
            (start, kinds.len())
        }
        _ => (0, 1),
    }
}

/// ABI byte offsets of every flattened register slot of a type.
fn flattened_offsets(context: &IrContext, abi: &TargetAbi, ty: TypeId) -> Vec<u32> {
    fn walk(context: &IrContext, abi: &TargetAbi, ty: TypeId, base: u32, out: &mut Vec<u32>) {
        match context.type_kind(ty) {
            TypeKind::Primitive(_) | TypeKind::Pointer { .. } => out.push(base),
            TypeKind::View { .. } => {
                out.push(base);
                out.push(base + abi.pointer_size);
            }
            TypeKind::Structure { fields } => {
                let fields = fields.clone();
                let offsets = abi.field_offsets(context, ty);
                for (field, offset) in fields.iter().zip(offsets) {
                    walk(context, abi, *field, base + offset, out);
                }
            }
            TypeKind::Array { element, dimensions } => {
                let (element, dimensions) = (*element, *dimensions);
                let stride = abi.size_of(context, element);
                for i in 0..dimensions.max(1) {
                    walk(context, abi, element, base + i * stride, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(context, abi, ty, 0, &mut out);
    out
}
