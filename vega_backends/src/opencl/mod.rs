//! OpenCL C code generation
//!
//! Statements are printed into an indented source sink. Control flow is
//! rendered with labels and `goto`, which keeps SSA ordering without
//! reconstructing structured control flow. φ-nodes become pre-allocated
//! variables assigned at each predecessor's terminator, with their
//! declarations hoisted to the nearest common dominator of the incoming
//! blocks. The kernel entry is always named `ILGPUKernel`.

mod types;

pub use types::TypeGenerator;

use std::collections::HashMap;

use log::debug;
use smallvec::SmallVec;

use vega_common::{CompileError, Result};
use vega_ir::analysis::{Dominators, Scope};
use vega_ir::{
    ArithFlags, AtomicKind, BinaryArithKind, BlockId, CompareKind, IntrinsicQuery, IrContext,
    KernelSpecialization, MethodId, PrimitiveType, PrimitiveValue, ShuffleMode, TargetAbi,
    TernaryArithKind, TypeId, TypeKind, UnaryArithKind, ValueId, ValueKind,
};

use crate::source::SourceBuilder;
use crate::{called_methods, function_symbol, EmittedKernel};

/// Extensions the module turned out to need.
#[derive(Default)]
struct Pragmas {
    fp64: bool,
    subgroups: bool,
    int64_atomics: bool,
}

/// OpenCL backend over one target ABI.
pub struct OpenClBackend {
    abi: TargetAbi,
    specialization: KernelSpecialization,
}

impl OpenClBackend {
    pub fn new(abi: TargetAbi, specialization: KernelSpecialization) -> Self {
        Self {
            abi,
            specialization,
        }
    }

    /// Emit a kernel module: typedefs, called functions, then the entry.
    pub fn emit_kernel(&self, context: &IrContext, entry: MethodId) -> Result<EmittedKernel> {
        debug!("emitting OpenCL C for {}", context.method(entry).name());
        let mut generator = TypeGenerator::new();
        let mut pragmas = Pragmas::default();
        let mut functions = Vec::new();

        for callee in called_methods(context, entry) {
            let mut emitter =
                ClEmitter::new(self, context, callee, false, &mut generator, &mut pragmas)?;
            functions.push(emitter.emit()?);
        }
        let mut entry_emitter =
            ClEmitter::new(self, context, entry, true, &mut generator, &mut pragmas)?;
        functions.push(entry_emitter.emit()?);

        let mut module = String::new();
        if pragmas.fp64 {
            module.push_str("#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n");
        }
        if pragmas.int64_atomics {
            module.push_str("#pragma OPENCL EXTENSION cl_khr_int64_base_atomics : enable\n");
        }
        if pragmas.subgroups {
            module.push_str("#pragma OPENCL EXTENSION cl_khr_subgroups : enable\n");
        }
        for typedef in generator.typedefs() {
            module.push_str(typedef);
            module.push('\n');
        }
        for function in functions {
            module.push('\n');
            module.push_str(&function);
        }
        Ok(EmittedKernel {
            symbol: "ILGPUKernel".to_string(),
            text: module,
        })
    }
}

/// Per-value variable names: one for scalars and structures, a
/// (pointer, length) pair for views.
type VarBinding = SmallVec<[String; 2]>;

struct ClEmitter<'c, 'b> {
    backend: &'b OpenClBackend,
    context: &'c IrContext,
    method: MethodId,
    is_entry: bool,
    scope: Scope,
    doms: Dominators,
    generator: &'b mut TypeGenerator,
    pragmas: &'b mut Pragmas,
    vars: HashMap<ValueId, VarBinding>,
    counter: usize,
    source: SourceBuilder,
    /// φ declarations per hoist block.
    hoisted: HashMap<BlockId, Vec<String>>,
}

impl<'c, 'b> ClEmitter<'c, 'b> {
    fn new(
        backend: &'b OpenClBackend,
        context: &'c IrContext,
        method: MethodId,
        is_entry: bool,
        generator: &'b mut TypeGenerator,
        pragmas: &'b mut Pragmas,
    ) -> Result<Self> {
        let scope = Scope::compute(context, method);
        if scope.is_empty() {
            return Err(CompileError::InvalidCodeGeneration(format!(
                "method {} has no body",
                context.method(method).name()
            )));
        }
        let doms = Dominators::compute(context, &scope);
        Ok(Self {
            backend,
            context,
            method,
            is_entry,
            scope,
            doms,
            generator,
            pragmas,
            vars: HashMap::new(),
            counter: 0,
            source: SourceBuilder::new(),
            hoisted: HashMap::new(),
        })
    }

    fn fresh_var(&mut self) -> String {
        let name = format!("v{}", self.counter);
        self.counter += 1;
        name
    }

    fn prim_of(&mut self, value: ValueId) -> PrimitiveType {
        self.context
            .as_primitive(self.context.value(value).ty)
            .unwrap_or(PrimitiveType::Int64)
    }

    fn note_type(&mut self, ty: TypeId) {
        if self.context.as_primitive(ty) == Some(PrimitiveType::Float64) {
            self.pragmas.fp64 = true;
        }
    }

    fn label(&self, block: BlockId) -> String {
        format!("BB{}", self.scope.rpo_index(block).unwrap_or(0))
    }

    fn var(&self, value: ValueId) -> Result<&str> {
        self.vars
            .get(&value)
            .map(|binding| binding[0].as_str())
            .ok_or_else(|| {
                CompileError::InvalidCodeGeneration(format!("{} has no variable binding", value))
            })
    }

    fn binding(&self, value: ValueId) -> Result<&VarBinding> {
        self.vars.get(&value).ok_or_else(|| {
            CompileError::InvalidCodeGeneration(format!("{} has no variable binding", value))
        })
    }

    /// Bind a value to fresh variable names (2 slots for views).
    fn bind(&mut self, value: ValueId) -> VarBinding {
        let ty = self.context.value(value).ty;
        let slots = if self.context.type_kind(ty).is_view() {
            2
        } else {
            1
        };
        let binding: VarBinding = (0..slots).map(|_| self.fresh_var()).collect();
        self.vars.insert(value, binding.clone());
        binding
    }

    /// Declaration type names for a binding of `ty`.
    fn declaration_types(&mut self, ty: TypeId) -> Result<VarBinding> {
        self.note_type(ty);
        match self.context.type_kind(ty).clone() {
            TypeKind::View { element, space } => {
                let element_name = self.generator.name(self.context, element)?;
                let qualifier = TypeGenerator::space_qualifier(space);
                Ok(SmallVec::from_vec(vec![
                    format!("{}{}*", qualifier, element_name),
                    "int".to_string(),
                ]))
            }
            _ => {
                let name = self.generator.name(self.context, ty)?;
                Ok(SmallVec::from_vec(vec![name]))
            }
        }
    }

    /// `type name = expr;` for a single-slot value.
    fn declare(&mut self, value: ValueId, expr: impl AsRef<str>) -> Result<()> {
        let ty = self.context.value(value).ty;
        let types = self.declaration_types(ty)?;
        let binding = self.bind(value);
        self.source
            .line(format!("{} {} = {};", types[0], binding[0], expr.as_ref()));
        Ok(())
    }

    fn signature(&mut self) -> Result<String> {
        let method = self.context.method(self.method);
        let params = method.params.clone();
        let mut rendered = Vec::new();
        for param in params {
            let ty = self.context.value(param).ty;
            let types = self.declaration_types(ty)?;
            let binding = self.bind(param);
            for (type_name, var) in types.iter().zip(binding.iter()) {
                rendered.push(format!("{} {}", type_name, var));
            }
        }
        let header = if self.is_entry {
            // A pinned group size renders as a kernel attribute.
            let attribute = match self.backend.specialization.pinned_group_size() {
                Some(pinned) => {
                    format!("__attribute__((reqd_work_group_size({}, 1, 1))) ", pinned)
                }
                None => String::new(),
            };
            format!(
                "{}__kernel void ILGPUKernel({})",
                attribute,
                rendered.join(", ")
            )
        } else {
            let return_type = method.declaration.return_type;
            if self.context.type_kind(return_type).is_view() {
                return Err(CompileError::NotSupported(
                    "view returns from device functions".to_string(),
                ));
            }
            let name = if return_type == self.context.void_type() {
                "void".to_string()
            } else {
                self.note_type(return_type);
                self.generator.name(self.context, return_type)?
            };
            format!(
                "{} {}({})",
                name,
                function_symbol(self.context.method(self.method)),
                rendered.join(", ")
            )
        };
        Ok(header)
    }

    /// Pre-bind φ variables and record their hoisted declarations.
    fn prepare_phis(&mut self) -> Result<()> {
        for block in self.scope.rpo().to_vec() {
            for value in self.context.block(block).values.clone() {
                let node = self.context.value(value);
                let ValueKind::Phi { incoming } = &node.kind else {
                    continue;
                };
                let ty = node.ty;
                // Hoist to the nearest common dominator of the incoming
                // blocks so every assignment site sees the declaration.
                let mut hoist = incoming.first().copied().unwrap_or(block);
                for pred in incoming.iter().skip(1) {
                    hoist = self.doms.nearest_common_dominator(hoist, *pred);
                }
                let types = self.declaration_types(ty)?;
                let binding = self.bind(value);
                let declarations: Vec<String> = types
                    .iter()
                    .zip(binding.iter())
                    .map(|(type_name, var)| format!("{} {};", type_name, var))
                    .collect();
                self.hoisted.entry(hoist).or_default().extend(declarations);
            }
        }
        Ok(())
    }

    fn emit(&mut self) -> Result<String> {
        let signature = self.signature()?;
        self.prepare_phis()?;
        self.source.open(&signature);
        let blocks: Vec<BlockId> = self.scope.rpo().to_vec();
        for (index, block) in blocks.iter().enumerate() {
            if index > 0 {
                let label = self.label(*block);
                self.source.raw_line(format!("{}:;", label));
            }
            for declaration in self.hoisted.remove(block).unwrap_or_default() {
                self.source.line(declaration);
            }
            for value in self.context.block(*block).values.clone() {
                let node = self.context.value(value);
                if node.kind.is_phi() {
                    continue;
                }
                if node.kind.is_terminator() {
                    self.emit_phi_copies(*block)?;
                    self.emit_terminator(value)?;
                } else {
                    self.emit_value(value)?;
                }
            }
        }
        self.source.close();
        Ok(std::mem::take(&mut self.source).finish())
    }

    /// Assignments into successor φ variables for edges leaving `block`.
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
                    let sources = self.binding(*operand)?.clone();
                    let targets = self.binding(value)?.clone();
                    for (target, source) in targets.iter().zip(sources.iter()) {
                        self.source.line(format!("{} = {};", target, source));
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_terminator(&mut self, value: ValueId) -> Result<()> {
        let node = self.context.value(value).clone();
        match &node.kind {
            ValueKind::Branch { target } => {
                let label = self.label(*target);
                self.source.line(format!("goto {};", label));
            }
            ValueKind::ConditionalBranch {
                true_target,
                false_target,
            } => {
                let condition = self.var(node.operands[0])?.to_string();
                let true_label = self.label(*true_target);
                let false_label = self.label(*false_target);
                self.source
                    .line(format!("if ({}) {{ goto {}; }}", condition, true_label));
                self.source.line(format!("goto {};", false_label));
            }
            ValueKind::Switch { targets, default } => {
                let selector = self.var(node.operands[0])?.to_string();
                self.source.open(&format!("switch ({})", selector));
                for (case, target) in targets.iter().enumerate() {
                    let label = self.label(*target);
                    self.source.line(format!("case {}: goto {};", case, label));
                }
                let label = self.label(*default);
                self.source.line(format!("default: goto {};", label));
                self.source.close();
            }
            ValueKind::Return => {
                if node.operands.is_empty() {
                    self.source.line("return;");
                } else {
                    let returned = self.var(node.operands[0])?.to_string();
                    self.source.line(format!("return {};", returned));
                }
            }
            _ => unreachable!("not a terminator"),
        }
        Ok(())
    }

    fn emit_value(&mut self, value: ValueId) -> Result<()> {
        let node = self.context.value(value).clone();
        match &node.kind {
            ValueKind::Constant(literal) => {
                let expr = literal_expr(*literal);
                self.declare(value, expr)
            }
            ValueKind::Null | ValueKind::Poison => self.emit_zero(value),
            ValueKind::StringConstant(text) => {
                let ty = self.context.value(value).ty;
                let types = self.declaration_types(ty)?;
                let binding = self.bind(value);
                self.source.line(format!(
                    "{} {} = \"{}\";",
                    types[0],
                    binding[0],
                    text.escape_default()
                ));
                Ok(())
            }
            ValueKind::SizeOf(ty) => {
                let size = self.backend.abi.size_of(self.context, *ty);
                self.declare(value, size.to_string())
            }
            ValueKind::Parameter { .. } => Ok(()),
            ValueKind::UnaryArith { op, .. } => {
                let operand = self.var(node.operands[0])?.to_string();
                let prim = self.prim_of(value);
                let expr = unary_expr(*op, prim, &operand)?;
                self.declare(value, expr)
            }
            ValueKind::BinaryArith { op, flags } => {
                let lhs = self.var(node.operands[0])?.to_string();
                let rhs = self.var(node.operands[1])?.to_string();
                let prim = self.prim_of(value);
                let expr = binary_expr(*op, *flags, prim, &lhs, &rhs)?;
                self.declare(value, expr)
            }
            ValueKind::TernaryArith { op, .. } => {
                let a = self.var(node.operands[0])?.to_string();
                let b = self.var(node.operands[1])?.to_string();
                let c = self.var(node.operands[2])?.to_string();
                let prim = self.prim_of(value);
                let expr = match op {
                    TernaryArithKind::MultiplyAdd => {
                        if prim.is_float() {
                            format!("fma({}, {}, {})", a, b, c)
                        } else {
                            format!("{} * {} + {}", a, b, c)
                        }
                    }
                };
                self.declare(value, expr)
            }
            ValueKind::Compare { kind, flags } => {
                let lhs = self.var(node.operands[0])?.to_string();
                let rhs = self.var(node.operands[1])?.to_string();
                let prim = self.prim_of(node.operands[0]);
                let expr = compare_expr(*kind, *flags, prim, &lhs, &rhs);
                self.declare(value, expr)
            }
            ValueKind::Convert { flags } => {
                let operand = self.var(node.operands[0])?.to_string();
                let target = self
                    .context
                    .as_primitive(node.ty)
                    .expect("convert target is primitive");
                let source = self.prim_of(node.operands[0]);
                let expr = if flags.contains(ArithFlags::UNSIGNED) && source.is_int() {
                    format!(
                        "({})(({}){})",
                        TypeGenerator::scalar_name(target),
                        TypeGenerator::unsigned_scalar_name(source),
                        operand
                    )
                } else {
                    format!("({}){}", TypeGenerator::scalar_name(target), operand)
                };
                self.declare(value, expr)
            }
            ValueKind::PointerCast => {
                let operand = self.var(node.operands[0])?.to_string();
                let ty = node.ty;
                let types = self.declaration_types(ty)?;
                let expr = format!("({}){}", types[0], operand);
                self.declare(value, expr)
            }
            ValueKind::BitCast => {
                let operand = self.var(node.operands[0])?.to_string();
                let target = self
                    .context
                    .as_primitive(node.ty)
                    .expect("bit cast target is primitive");
                let expr = format!("as_{}({})", TypeGenerator::scalar_name(target), operand);
                self.declare(value, expr)
            }
            ValueKind::Load => {
                let address = self.var(node.operands[0])?.to_string();
                self.declare(value, format!("*{}", address))
            }
            ValueKind::Store => {
                let address = self.var(node.operands[0])?.to_string();
                let stored = self.var(node.operands[1])?.to_string();
                self.source.line(format!("*{} = {};", address, stored));
                Ok(())
            }
            ValueKind::Alloca { .. } => {
                let pointee = match self.context.type_kind(node.ty) {
                    TypeKind::Pointer { element, .. } => *element,
                    _ => unreachable!("alloca result is a pointer"),
                };
                let slot_type = self.generator.name(self.context, pointee)?;
                let slot = self.fresh_var();
                self.source.line(format!("{} {};", slot_type, slot));
                let ty = node.ty;
                let types = self.declaration_types(ty)?;
                let binding = self.bind(value);
                self.source.line(format!(
                    "{} {} = &{};",
                    types[0], binding[0], slot
                ));
                Ok(())
            }
            ValueKind::MemoryBarrier { .. } => {
                self.source.line("mem_fence(CLK_GLOBAL_MEM_FENCE);");
                Ok(())
            }
            ValueKind::Barrier => {
                self.source
                    .line("barrier(CLK_LOCAL_MEM_FENCE | CLK_GLOBAL_MEM_FENCE);");
                Ok(())
            }
            ValueKind::GetField { index } => {
                let source_value = node.operands[0];
                let source_ty = self.context.value(source_value).ty;
                if self.context.type_kind(source_ty).is_view() {
                    let slot = self.binding(source_value)?[*index].clone();
                    return self.declare(value, slot);
                }
                let source = self.var(source_value)?.to_string();
                self.declare(value, format!("{}._f{}", source, index))
            }
            ValueKind::SetField { index } => {
                let source = self.var(node.operands[0])?.to_string();
                let replacement = self.var(node.operands[1])?.to_string();
                let ty = node.ty;
                let types = self.declaration_types(ty)?;
                let binding = self.bind(value);
                self.source
                    .line(format!("{} {} = {};", types[0], binding[0], source));
                self.source
                    .line(format!("{}._f{} = {};", binding[0], index, replacement));
                Ok(())
            }
            ValueKind::LoadFieldAddress { index } => {
                let source = self.var(node.operands[0])?.to_string();
                self.declare(value, format!("&{}->_f{}", source, index))
            }
            ValueKind::LoadElementAddress => {
                let source_value = node.operands[0];
                let index = self.var(node.operands[1])?.to_string();
                let source_ty = self.context.value(source_value).ty;
                let base = if self.context.type_kind(source_ty).is_view() {
                    self.binding(source_value)?[0].clone()
                } else {
                    self.var(source_value)?.to_string()
                };
                self.declare(value, format!("{} + {}", base, index))
            }
            ValueKind::AtomicRmw { op, .. } => {
                let prim = self.prim_of(value);
                if !prim.is_int() || prim == PrimitiveType::Int1 {
                    return Err(CompileError::NotSupported(format!(
                        "atomic {} on {:?} for the OpenCL backend",
                        op.mnemonic(),
                        prim
                    )));
                }
                if prim == PrimitiveType::Int64 {
                    self.pragmas.int64_atomics = true;
                }
                let address = self.var(node.operands[0])?.to_string();
                let operand = self.var(node.operands[1])?.to_string();
                let name = match op {
                    AtomicKind::Exchange => "atomic_xchg",
                    AtomicKind::Add => "atomic_add",
                    AtomicKind::And => "atomic_and",
                    AtomicKind::Or => "atomic_or",
                    AtomicKind::Xor => "atomic_xor",
                    AtomicKind::Min => "atomic_min",
                    AtomicKind::Max => "atomic_max",
                };
                self.declare(value, format!("{}({}, {})", name, address, operand))
            }
            ValueKind::AtomicCas => {
                let prim = self.prim_of(value);
                if !prim.is_int() || prim == PrimitiveType::Int1 {
                    return Err(CompileError::NotSupported(
                        "compare-and-swap on non-integer types for the OpenCL backend"
                            .to_string(),
                    ));
                }
                if prim == PrimitiveType::Int64 {
                    self.pragmas.int64_atomics = true;
                }
                let address = self.var(node.operands[0])?.to_string();
                let compare = self.var(node.operands[1])?.to_string();
                let new_value = self.var(node.operands[2])?.to_string();
                self.declare(
                    value,
                    format!("atomic_cmpxchg({}, {}, {})", address, compare, new_value),
                )
            }
            ValueKind::Query(query) => {
                let expr = match query {
                    IntrinsicQuery::GridIndex(dim) => {
                        format!("(int)get_group_id({})", dim_index(*dim))
                    }
                    IntrinsicQuery::GridDim(dim) => {
                        format!("(int)get_num_groups({})", dim_index(*dim))
                    }
                    IntrinsicQuery::GroupIndex(dim) => {
                        format!("(int)get_local_id({})", dim_index(*dim))
                    }
                    IntrinsicQuery::GroupDim(dim) => {
                        format!("(int)get_local_size({})", dim_index(*dim))
                    }
                    IntrinsicQuery::LaneId => {
                        format!(
                            "(int)(get_local_id(0) & {})",
                            self.backend.abi.warp_size - 1
                        )
                    }
                };
                self.declare(value, expr)
            }
            ValueKind::WarpShuffle { mode, .. } => {
                self.pragmas.subgroups = true;
                let source = self.var(node.operands[0])?.to_string();
                let origin = self.var(node.operands[1])?.to_string();
                let name = match mode {
                    ShuffleMode::Idx => "sub_group_shuffle",
                    ShuffleMode::Up => "sub_group_shuffle_up",
                    ShuffleMode::Down => "sub_group_shuffle_down",
                    ShuffleMode::Xor => "sub_group_shuffle_xor",
                };
                self.declare(value, format!("{}({}, {})", name, source, origin))
            }
            ValueKind::Call { target } => {
                let callee = self.context.method(*target);
                let symbol = function_symbol(callee);
                let mut args = Vec::new();
                for arg in &node.operands {
                    for slot in self.binding(*arg)?.clone() {
                        args.push(slot);
                    }
                }
                let expr = format!("{}({})", symbol, args.join(", "));
                if node.ty == self.context.void_type() {
                    self.source.line(format!("{};", expr));
                    Ok(())
                } else {
                    self.declare(value, expr)
                }
            }
            ValueKind::Phi { .. }
            | ValueKind::Branch { .. }
            | ValueKind::ConditionalBranch { .. }
            | ValueKind::Switch { .. }
            | ValueKind::Return => unreachable!("handled by the block walker"),
        }
    }

    /// Null and poison render as zeros; null views become (0, 0).
    fn emit_zero(&mut self, value: ValueId) -> Result<()> {
        let ty = self.context.value(value).ty;
        match self.context.type_kind(ty).clone() {
            TypeKind::View { .. } => {
                let types = self.declaration_types(ty)?;
                let binding = self.bind(value);
                self.source
                    .line(format!("{} {} = 0;", types[0], binding[0]));
                self.source
                    .line(format!("{} {} = 0;", types[1], binding[1]));
                Ok(())
            }
            TypeKind::Structure { .. } => {
                let types = self.declaration_types(ty)?;
                let binding = self.bind(value);
                self.source
                    .line(format!("{} {} = {{0}};", types[0], binding[0]));
                Ok(())
            }
            TypeKind::Primitive(prim) => {
                let expr = match prim {
                    PrimitiveType::Int1 => "false".to_string(),
                    PrimitiveType::Float32 => "0.0f".to_string(),
                    PrimitiveType::Float64 => "0.0".to_string(),
                    _ => "0".to_string(),
                };
                self.declare(value, expr)
            }
            _ => self.declare(value, "0"),
        }
    }
}

fn dim_index(dim: vega_ir::Dim) -> u32 {
    match dim {
        vega_ir::Dim::X => 0,
        vega_ir::Dim::Y => 1,
        vega_ir::Dim::Z => 2,
    }
}

fn literal_expr(literal: PrimitiveValue) -> String {
    match literal {
        PrimitiveValue::Int1(v) => v.to_string(),
        PrimitiveValue::Int8(v) => v.to_string(),
        PrimitiveValue::Int16(v) => v.to_string(),
        PrimitiveValue::Int32(v) => v.to_string(),
        PrimitiveValue::Int64(v) => format!("{}L", v),
        PrimitiveValue::Float32(v) => {
            if v.is_nan() {
                "NAN".to_string()
            } else if v.is_infinite() {
                if v > 0.0 {
                    "INFINITY".to_string()
                } else {
                    "-INFINITY".to_string()
                }
            } else {
                format!("{:?}f", v)
            }
        }
        PrimitiveValue::Float64(v) => {
            if v.is_nan() {
                "NAN".to_string()
            } else if v.is_infinite() {
                if v > 0.0 {
                    "INFINITY".to_string()
                } else {
                    "-INFINITY".to_string()
                }
            } else {
                format!("{:?}", v)
            }
        }
    }
}

fn unary_expr(op: UnaryArithKind, prim: PrimitiveType, operand: &str) -> Result<String> {
    let expr = match op {
        UnaryArithKind::Neg => format!("-{}", operand),
        UnaryArithKind::Not => {
            if prim == PrimitiveType::Int1 {
                format!("!{}", operand)
            } else {
                format!("~{}", operand)
            }
        }
        UnaryArithKind::Abs => {
            if prim.is_float() {
                format!("fabs({})", operand)
            } else {
                format!("abs({})", operand)
            }
        }
        UnaryArithKind::Sqrt => format!("sqrt({})", operand),
        UnaryArithKind::Rsqrt => format!("rsqrt({})", operand),
        UnaryArithKind::Sin => format!("sin({})", operand),
        UnaryArithKind::Cos => format!("cos({})", operand),
        UnaryArithKind::Tanh => format!("tanh({})", operand),
        UnaryArithKind::Exp => format!("exp({})", operand),
        UnaryArithKind::Exp2 => format!("exp2({})", operand),
        UnaryArithKind::Log => format!("log({})", operand),
        UnaryArithKind::Log2 => format!("log2({})", operand),
        UnaryArithKind::Floor => format!("floor({})", operand),
        UnaryArithKind::Ceiling => format!("ceil({})", operand),
    };
    Ok(expr)
}

fn binary_expr(
    op: BinaryArithKind,
    flags: ArithFlags,
    prim: PrimitiveType,
    lhs: &str,
    rhs: &str,
) -> Result<String> {
    let unsigned = flags.contains(ArithFlags::UNSIGNED) && prim.is_int();
    let signed_name = TypeGenerator::scalar_name(prim);
    let unsigned_name = TypeGenerator::unsigned_scalar_name(prim);
    let wrap_unsigned = |expr: String| format!("({})({})", signed_name, expr);
    let operand = |name: &str| {
        if unsigned {
            format!("({}){}", unsigned_name, name)
        } else {
            name.to_string()
        }
    };

    let expr = match op {
        BinaryArithKind::Add => format!("{} + {}", lhs, rhs),
        BinaryArithKind::Sub => format!("{} - {}", lhs, rhs),
        BinaryArithKind::Mul => format!("{} * {}", lhs, rhs),
        BinaryArithKind::Div => {
            if unsigned {
                wrap_unsigned(format!("{} / {}", operand(lhs), operand(rhs)))
            } else {
                format!("{} / {}", lhs, rhs)
            }
        }
        BinaryArithKind::Rem => {
            if prim.is_float() {
                format!("fmod({}, {})", lhs, rhs)
            } else if unsigned {
                wrap_unsigned(format!("{} % {}", operand(lhs), operand(rhs)))
            } else {
                format!("{} % {}", lhs, rhs)
            }
        }
        BinaryArithKind::And => format!("{} & {}", lhs, rhs),
        BinaryArithKind::Or => format!("{} | {}", lhs, rhs),
        BinaryArithKind::Xor => format!("{} ^ {}", lhs, rhs),
        BinaryArithKind::Shl => format!("{} << {}", lhs, rhs),
        BinaryArithKind::Shr => {
            if unsigned {
                wrap_unsigned(format!("{} >> {}", operand(lhs), rhs))
            } else {
                format!("{} >> {}", lhs, rhs)
            }
        }
        BinaryArithKind::Min => {
            if prim.is_float() {
                format!("fmin({}, {})", lhs, rhs)
            } else if unsigned {
                wrap_unsigned(format!("min({}, {})", operand(lhs), operand(rhs)))
            } else {
                format!("min({}, {})", lhs, rhs)
            }
        }
        BinaryArithKind::Max => {
            if prim.is_float() {
                format!("fmax({}, {})", lhs, rhs)
            } else if unsigned {
                wrap_unsigned(format!("max({}, {})", operand(lhs), operand(rhs)))
            } else {
                format!("max({}, {})", lhs, rhs)
            }
        }
        BinaryArithKind::Pow => format!("pow({}, {})", lhs, rhs),
        BinaryArithKind::Atan2 => format!("atan2({}, {})", lhs, rhs),
        BinaryArithKind::CopySign => format!("copysign({}, {})", lhs, rhs),
    };
    Ok(expr)
}

fn compare_expr(
    kind: CompareKind,
    flags: ArithFlags,
    prim: PrimitiveType,
    lhs: &str,
    rhs: &str,
) -> String {
    let relation = match kind {
        CompareKind::Equal => "==",
        CompareKind::NotEqual => "!=",
        CompareKind::LessThan => "<",
        CompareKind::LessEqual => "<=",
        CompareKind::GreaterThan => ">",
        CompareKind::GreaterEqual => ">=",
    };
    let unsigned = flags.contains(ArithFlags::UNSIGNED) && prim.is_int();
    let base = if unsigned {
        let unsigned_name = TypeGenerator::unsigned_scalar_name(prim);
        format!(
            "({}){} {} ({}){}",
            unsigned_name, lhs, relation, unsigned_name, rhs
        )
    } else {
        format!("{} {} {}", lhs, relation, rhs)
    };
    if prim.is_float() && flags.contains(ArithFlags::UNORDERED) {
        format!("(isnan({}) || isnan({}) || ({}))", lhs, rhs, base)
    } else {
        base
    }
}
