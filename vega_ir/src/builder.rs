//! Exclusive per-method IR builder
//!
//! All mutation of a method's IR flows through a [`MethodBuilder`]. The
//! builder maintains operand/use symmetry, rejects type mismatches, panics
//! on terminator misplacement, and folds operations over constant operands
//! at creation time.

use log::trace;
use smallvec::{smallvec, SmallVec};

use vega_common::{CompileError, Result};

use crate::block::BlockId;
use crate::context::IrContext;
use crate::dump::type_to_string;
use crate::fold::{self, Folded};
use crate::method::{Method, MethodId};
use crate::types::{AddressSpace, PrimitiveType, TypeId, TypeKind};
use crate::value::{
    ArithFlags, AtomicKind, BarrierScope, BinaryArithKind, CompareKind, IntrinsicQuery,
    PrimitiveValue, ShuffleMode, TernaryArithKind, UnaryArithKind, ValueId, ValueKind,
};

/// Builder for one method; exclusive for its lifetime.
pub struct MethodBuilder<'ctx> {
    context: &'ctx mut IrContext,
    method: MethodId,
    current: Option<BlockId>,
}

impl<'ctx> MethodBuilder<'ctx> {
    pub(crate) fn new(context: &'ctx mut IrContext, method: MethodId) -> Self {
        let current = context.method(method).entry;
        Self {
            context,
            method,
            current,
        }
    }

    pub fn context(&self) -> &IrContext {
        self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut IrContext {
        self.context
    }

    pub fn method_id(&self) -> MethodId {
        self.method
    }

    pub fn method(&self) -> &Method {
        self.context.method(self.method)
    }

    // ---- blocks ---------------------------------------------------------

    /// Append a new block to the method. The first block becomes the entry.
    pub fn create_block(&mut self) -> BlockId {
        let id = self.context.alloc_block();
        let method = self.context.method_mut(self.method);
        method.blocks.push(id);
        if method.entry.is_none() {
            method.entry = Some(id);
        }
        if self.current.is_none() {
            self.current = Some(id);
        }
        id
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn insert_point(&self) -> Option<BlockId> {
        self.current
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.method().params[index]
    }

    // ---- raw insertion --------------------------------------------------

    fn insert(&mut self, ty: TypeId, kind: ValueKind, operands: SmallVec<[ValueId; 3]>) -> ValueId {
        let block = self.current.expect("builder has no insertion block");
        assert!(
            self.context.terminator(block).is_none(),
            "cannot insert a value after the terminator of {}",
            block
        );
        let id = self.context.alloc_value(ty, Some(block), kind, operands);
        let block = self.context.block_mut(block);
        block.values.push(id);
        block.mark_dirty();
        id
    }

    fn insert_terminator(
        &mut self,
        kind: ValueKind,
        operands: SmallVec<[ValueId; 3]>,
    ) -> ValueId {
        assert!(kind.is_terminator(), "not a terminator kind");
        let block = self.current.expect("builder has no insertion block");
        assert!(
            self.context.terminator(block).is_none(),
            "block {} already has a terminator",
            block
        );
        let void = self.context.void_type();
        let id = self.context.alloc_value(void, Some(block), kind, operands);
        let block = self.context.block_mut(block);
        block.values.push(id);
        block.mark_dirty();
        id
    }

    // ---- constants ------------------------------------------------------

    pub fn primitive(&mut self, value: PrimitiveValue) -> ValueId {
        let ty = self.context.primitive_type(value.primitive_type());
        self.insert(ty, ValueKind::Constant(value), SmallVec::new())
    }

    pub fn int32(&mut self, value: i32) -> ValueId {
        self.primitive(PrimitiveValue::Int32(value))
    }

    pub fn int64(&mut self, value: i64) -> ValueId {
        self.primitive(PrimitiveValue::Int64(value))
    }

    pub fn bool_const(&mut self, value: bool) -> ValueId {
        self.primitive(PrimitiveValue::Int1(value))
    }

    pub fn null(&mut self, ty: TypeId) -> ValueId {
        self.insert(ty, ValueKind::Null, SmallVec::new())
    }

    pub fn poison(&mut self, ty: TypeId) -> ValueId {
        self.insert(ty, ValueKind::Poison, SmallVec::new())
    }

    pub fn string_constant(&mut self, text: impl Into<String>) -> ValueId {
        let i8_ty = self.context.primitive_type(PrimitiveType::Int8);
        let ty = self.context.pointer_type(i8_ty, AddressSpace::Constant);
        self.insert(ty, ValueKind::StringConstant(text.into()), SmallVec::new())
    }

    /// ABI size of a type; folded to a constant before emission.
    pub fn size_of(&mut self, ty: TypeId) -> ValueId {
        let i32_ty = self.context.primitive_type(PrimitiveType::Int32);
        self.insert(i32_ty, ValueKind::SizeOf(ty), SmallVec::new())
    }

    // ---- arithmetic -----------------------------------------------------

    fn expect_primitive(&self, value: ValueId) -> Result<PrimitiveType> {
        let ty = self.context.value(value).ty;
        self.context.as_primitive(ty).ok_or_else(|| {
            self.type_error("primitive type", ty)
        })
    }

    fn type_error(&self, expected: impl Into<String>, actual: TypeId) -> CompileError {
        CompileError::TypeError {
            expected: expected.into(),
            actual: type_to_string(self.context, actual),
        }
    }

    fn is_poison(&self, value: ValueId) -> bool {
        matches!(self.context.value(value).kind, ValueKind::Poison)
    }

    fn folded(&mut self, outcome: Folded, ty: TypeId) -> ValueId {
        match outcome {
            Folded::Value(value) => self.primitive(value),
            Folded::Poison => self.poison(ty),
        }
    }

    pub fn unary(
        &mut self,
        op: UnaryArithKind,
        flags: ArithFlags,
        operand: ValueId,
    ) -> Result<ValueId> {
        self.expect_primitive(operand)?;
        let ty = self.context.value(operand).ty;
        if self.is_poison(operand) {
            return Ok(self.poison(ty));
        }
        if let Some(constant) = self.context.value(operand).as_constant() {
            if let Some(outcome) = fold::fold_unary(op, constant) {
                trace!("folded {} over {}", op.mnemonic(), constant);
                return Ok(self.folded(outcome, ty));
            }
        }
        Ok(self.insert(ty, ValueKind::UnaryArith { op, flags }, smallvec![operand]))
    }

    pub fn binary(
        &mut self,
        op: BinaryArithKind,
        flags: ArithFlags,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<ValueId> {
        self.expect_primitive(lhs)?;
        let lhs_ty = self.context.value(lhs).ty;
        let rhs_ty = self.context.value(rhs).ty;
        if lhs_ty != rhs_ty {
            return Err(self.type_error(type_to_string(self.context, lhs_ty), rhs_ty));
        }
        if self.is_poison(lhs) || self.is_poison(rhs) {
            return Ok(self.poison(lhs_ty));
        }
        let constants = (
            self.context.value(lhs).as_constant(),
            self.context.value(rhs).as_constant(),
        );
        if let (Some(a), Some(b)) = constants {
            if let Some(outcome) = fold::fold_binary(op, flags, a, b) {
                trace!("folded {} over {}, {}", op.mnemonic(), a, b);
                return Ok(self.folded(outcome, lhs_ty));
            }
        }
        Ok(self.insert(
            lhs_ty,
            ValueKind::BinaryArith { op, flags },
            smallvec![lhs, rhs],
        ))
    }

    pub fn ternary(
        &mut self,
        op: TernaryArithKind,
        flags: ArithFlags,
        a: ValueId,
        b: ValueId,
        c: ValueId,
    ) -> Result<ValueId> {
        self.expect_primitive(a)?;
        let ty = self.context.value(a).ty;
        for operand in [b, c] {
            let other = self.context.value(operand).ty;
            if other != ty {
                return Err(self.type_error(type_to_string(self.context, ty), other));
            }
        }
        if self.is_poison(a) || self.is_poison(b) || self.is_poison(c) {
            return Ok(self.poison(ty));
        }
        let constants = (
            self.context.value(a).as_constant(),
            self.context.value(b).as_constant(),
            self.context.value(c).as_constant(),
        );
        if let (Some(a), Some(b), Some(c)) = constants {
            if let Some(outcome) = fold::fold_ternary(op, a, b, c) {
                return Ok(self.folded(outcome, ty));
            }
        }
        Ok(self.insert(ty, ValueKind::TernaryArith { op, flags }, smallvec![a, b, c]))
    }

    pub fn compare(
        &mut self,
        kind: CompareKind,
        flags: ArithFlags,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<ValueId> {
        self.expect_primitive(lhs)?;
        let lhs_ty = self.context.value(lhs).ty;
        let rhs_ty = self.context.value(rhs).ty;
        if lhs_ty != rhs_ty {
            return Err(self.type_error(type_to_string(self.context, lhs_ty), rhs_ty));
        }
        let i1 = self.context.primitive_type(PrimitiveType::Int1);
        if self.is_poison(lhs) || self.is_poison(rhs) {
            return Ok(self.poison(i1));
        }
        let constants = (
            self.context.value(lhs).as_constant(),
            self.context.value(rhs).as_constant(),
        );
        if let (Some(a), Some(b)) = constants {
            if let Some(result) = fold::fold_compare(kind, flags, a, b) {
                return Ok(self.primitive(PrimitiveValue::Int1(result)));
            }
        }
        Ok(self.insert(i1, ValueKind::Compare { kind, flags }, smallvec![lhs, rhs]))
    }

    pub fn convert(&mut self, target: TypeId, flags: ArithFlags, value: ValueId) -> Result<ValueId> {
        let target_prim = self
            .context
            .as_primitive(target)
            .ok_or_else(|| self.type_error("primitive type", target))?;
        self.expect_primitive(value)?;
        if self.context.value(value).ty == target {
            return Ok(value);
        }
        if self.is_poison(value) {
            return Ok(self.poison(target));
        }
        if let Some(constant) = self.context.value(value).as_constant() {
            if let Some(folded) = fold::fold_convert(target_prim, flags, constant) {
                return Ok(self.primitive(folded));
            }
        }
        Ok(self.insert(target, ValueKind::Convert { flags }, smallvec![value]))
    }

    pub fn pointer_cast(&mut self, target: TypeId, value: ValueId) -> Result<ValueId> {
        if !self.context.type_kind(target).is_pointer() {
            return Err(self.type_error("pointer type", target));
        }
        let source = self.context.value(value).ty;
        if !self.context.type_kind(source).is_pointer() {
            return Err(self.type_error("pointer type", source));
        }
        if source == target {
            return Ok(value);
        }
        Ok(self.insert(target, ValueKind::PointerCast, smallvec![value]))
    }

    /// Bit-preserving reinterpretation between same-width primitives.
    pub fn bit_cast(&mut self, target: TypeId, value: ValueId) -> Result<ValueId> {
        let target_prim = self
            .context
            .as_primitive(target)
            .ok_or_else(|| self.type_error("primitive type", target))?;
        let source_prim = self.expect_primitive(value)?;
        if target_prim.bits() != source_prim.bits() {
            return Err(self.type_error(
                format!("{}-bit primitive", source_prim.bits()),
                target,
            ));
        }
        if source_prim == target_prim {
            return Ok(value);
        }
        Ok(self.insert(target, ValueKind::BitCast, smallvec![value]))
    }

    // ---- memory ---------------------------------------------------------

    fn pointee(&self, address: ValueId) -> Result<TypeId> {
        let ty = self.context.value(address).ty;
        match self.context.type_kind(ty) {
            TypeKind::Pointer { element, .. } => Ok(*element),
            _ => Err(self.type_error("pointer type", ty)),
        }
    }

    pub fn load(&mut self, address: ValueId) -> Result<ValueId> {
        let element = self.pointee(address)?;
        Ok(self.insert(element, ValueKind::Load, smallvec![address]))
    }

    pub fn store(&mut self, address: ValueId, value: ValueId) -> Result<ValueId> {
        let element = self.pointee(address)?;
        let value_ty = self.context.value(value).ty;
        if value_ty != element {
            return Err(self.type_error(type_to_string(self.context, element), value_ty));
        }
        let void = self.context.void_type();
        Ok(self.insert(void, ValueKind::Store, smallvec![address, value]))
    }

    pub fn alloca(&mut self, pointee: TypeId, space: AddressSpace) -> ValueId {
        let ty = self.context.pointer_type(pointee, space);
        self.insert(ty, ValueKind::Alloca { space }, SmallVec::new())
    }

    pub fn memory_barrier(&mut self, scope: BarrierScope) -> ValueId {
        let void = self.context.void_type();
        self.insert(void, ValueKind::MemoryBarrier { scope }, SmallVec::new())
    }

    // ---- structures and views -------------------------------------------

    fn field_type(&mut self, object_ty: TypeId, index: usize) -> Result<TypeId> {
        match self.context.type_kind(object_ty) {
            TypeKind::Structure { fields } => fields
                .get(index)
                .copied()
                .ok_or_else(|| self.type_error(format!("structure with field {}", index), object_ty)),
            // Views decompose into (pointer, length).
            TypeKind::View { element, space } => match index {
                0 => {
                    let (element, space) = (*element, *space);
                    Ok(self.context.pointer_type(element, space))
                }
                1 => Ok(self.context.primitive_type(PrimitiveType::Int32)),
                _ => Err(self.type_error("view field 0 or 1", object_ty)),
            },
            _ => Err(self.type_error("structure or view type", object_ty)),
        }
    }

    pub fn get_field(&mut self, object: ValueId, index: usize) -> Result<ValueId> {
        let object_ty = self.context.value(object).ty;
        let field_ty = self.field_type(object_ty, index)?;
        Ok(self.insert(field_ty, ValueKind::GetField { index }, smallvec![object]))
    }

    pub fn set_field(&mut self, object: ValueId, index: usize, value: ValueId) -> Result<ValueId> {
        let object_ty = self.context.value(object).ty;
        let field_ty = self.field_type(object_ty, index)?;
        let value_ty = self.context.value(value).ty;
        if field_ty != value_ty {
            return Err(self.type_error(type_to_string(self.context, field_ty), value_ty));
        }
        Ok(self.insert(
            object_ty,
            ValueKind::SetField { index },
            smallvec![object, value],
        ))
    }

    pub fn load_field_address(&mut self, address: ValueId, index: usize) -> Result<ValueId> {
        let address_ty = self.context.value(address).ty;
        let (element, space) = match self.context.type_kind(address_ty) {
            TypeKind::Pointer { element, space } => (*element, *space),
            _ => return Err(self.type_error("pointer to structure", address_ty)),
        };
        let field_ty = self.field_type(element, index)?;
        let result = self.context.pointer_type(field_ty, space);
        Ok(self.insert(
            result,
            ValueKind::LoadFieldAddress { index },
            smallvec![address],
        ))
    }

    /// Address of element `index` of a view or pointer.
    pub fn load_element_address(&mut self, source: ValueId, index: ValueId) -> Result<ValueId> {
        let source_ty = self.context.value(source).ty;
        let (element, space) = match self.context.type_kind(source_ty) {
            TypeKind::View { element, space } | TypeKind::Pointer { element, space } => {
                (*element, *space)
            }
            _ => return Err(self.type_error("view or pointer type", source_ty)),
        };
        let index_prim = self.expect_primitive(index)?;
        if !index_prim.is_int() {
            let index_ty = self.context.value(index).ty;
            return Err(self.type_error("integer index", index_ty));
        }
        let result = self.context.pointer_type(element, space);
        Ok(self.insert(
            result,
            ValueKind::LoadElementAddress,
            smallvec![source, index],
        ))
    }

    // ---- atomics --------------------------------------------------------

    pub fn atomic_rmw(
        &mut self,
        op: AtomicKind,
        flags: ArithFlags,
        address: ValueId,
        value: ValueId,
    ) -> Result<ValueId> {
        let element = self.pointee(address)?;
        let value_ty = self.context.value(value).ty;
        if value_ty != element {
            return Err(self.type_error(type_to_string(self.context, element), value_ty));
        }
        Ok(self.insert(
            element,
            ValueKind::AtomicRmw { op, flags },
            smallvec![address, value],
        ))
    }

    pub fn atomic_cas(
        &mut self,
        address: ValueId,
        compare: ValueId,
        value: ValueId,
    ) -> Result<ValueId> {
        let element = self.pointee(address)?;
        for operand in [compare, value] {
            let ty = self.context.value(operand).ty;
            if ty != element {
                return Err(self.type_error(type_to_string(self.context, element), ty));
            }
        }
        Ok(self.insert(
            element,
            ValueKind::AtomicCas,
            smallvec![address, compare, value],
        ))
    }

    // ---- calls and intrinsics -------------------------------------------

    pub fn call(&mut self, target: MethodId, args: &[ValueId]) -> Result<ValueId> {
        let declaration = &self.context.method(target).declaration;
        let return_type = declaration.return_type;
        let param_types = declaration.param_types.clone();
        if args.len() != param_types.len() {
            return Err(CompileError::TypeError {
                expected: format!("{} arguments", param_types.len()),
                actual: format!("{} arguments", args.len()),
            });
        }
        for (arg, expected) in args.iter().zip(&param_types) {
            let ty = self.context.value(*arg).ty;
            if ty != *expected {
                return Err(self.type_error(type_to_string(self.context, *expected), ty));
            }
        }
        Ok(self.insert(
            return_type,
            ValueKind::Call { target },
            args.iter().copied().collect(),
        ))
    }

    pub fn query(&mut self, query: IntrinsicQuery) -> ValueId {
        let i32_ty = self.context.primitive_type(PrimitiveType::Int32);
        self.insert(i32_ty, ValueKind::Query(query), SmallVec::new())
    }

    pub fn warp_shuffle(
        &mut self,
        mode: ShuffleMode,
        width: u32,
        value: ValueId,
        origin: ValueId,
    ) -> Result<ValueId> {
        let prim = self.expect_primitive(value)?;
        if prim.bits() != 32 {
            let ty = self.context.value(value).ty;
            return Err(self.type_error("32-bit primitive", ty));
        }
        let ty = self.context.value(value).ty;
        Ok(self.insert(
            ty,
            ValueKind::WarpShuffle { mode, width },
            smallvec![value, origin],
        ))
    }

    pub fn barrier(&mut self) -> ValueId {
        let void = self.context.void_type();
        self.insert(void, ValueKind::Barrier, SmallVec::new())
    }

    // ---- φ-nodes --------------------------------------------------------

    /// Create an empty φ-node at the head of `block` (after existing φs).
    pub fn create_phi(&mut self, block: BlockId, ty: TypeId) -> ValueId {
        let id = self.context.alloc_value(
            ty,
            Some(block),
            ValueKind::Phi {
                incoming: Vec::new(),
            },
            SmallVec::new(),
        );
        let position = {
            let block_data = self.context.block(block);
            block_data
                .values
                .iter()
                .position(|v| !self.context.value(*v).kind.is_phi())
                .unwrap_or(block_data.values.len())
        };
        let block_data = self.context.block_mut(block);
        block_data.values.insert(position, id);
        block_data.mark_dirty();
        id
    }

    /// Register `value` as the incoming value of `phi` for predecessor
    /// `pred`.
    pub fn add_phi_incoming(&mut self, phi: ValueId, pred: BlockId, value: ValueId) {
        self.context.value_mut(value).uses.insert(phi);
        let node = self.context.value_mut(phi);
        node.operands.push(value);
        match &mut node.kind {
            ValueKind::Phi { incoming } => incoming.push(pred),
            _ => panic!("add_phi_incoming on a non-phi value"),
        }
    }

    // ---- terminators ----------------------------------------------------

    pub fn branch(&mut self, target: BlockId) -> ValueId {
        self.insert_terminator(ValueKind::Branch { target }, SmallVec::new())
    }

    pub fn cond_branch(
        &mut self,
        condition: ValueId,
        true_target: BlockId,
        false_target: BlockId,
    ) -> Result<ValueId> {
        let i1 = self.context.primitive_type(PrimitiveType::Int1);
        let ty = self.context.value(condition).ty;
        if ty != i1 {
            return Err(self.type_error("i1", ty));
        }
        Ok(self.insert_terminator(
            ValueKind::ConditionalBranch {
                true_target,
                false_target,
            },
            smallvec![condition],
        ))
    }

    pub fn switch(
        &mut self,
        selector: ValueId,
        targets: Vec<BlockId>,
        default: BlockId,
    ) -> Result<ValueId> {
        let prim = self.expect_primitive(selector)?;
        if !prim.is_int() {
            let ty = self.context.value(selector).ty;
            return Err(self.type_error("integer selector", ty));
        }
        Ok(self.insert_terminator(ValueKind::Switch { targets, default }, smallvec![selector]))
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> ValueId {
        let operands = match value {
            Some(v) => smallvec![v],
            None => SmallVec::new(),
        };
        self.insert_terminator(ValueKind::Return, operands)
    }

    // ---- rewriting ------------------------------------------------------

    /// Redirect all uses of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let users: Vec<ValueId> = self.context.value(old).uses.iter().copied().collect();
        for user in users {
            let node = self.context.value_mut(user);
            for operand in node.operands.iter_mut() {
                if *operand == old {
                    *operand = new;
                }
            }
            if let Some(block) = node.block {
                self.context.block_mut(block).mark_dirty();
            }
            self.context.value_mut(new).uses.insert(user);
        }
        self.context.value_mut(old).uses.clear();
    }

    /// Remove a value with no remaining uses from its block.
    pub fn remove_value(&mut self, value: ValueId) {
        debug_assert!(
            self.context.value(value).uses.is_empty(),
            "removing a value that still has uses"
        );
        let operands: Vec<ValueId> = self.context.value(value).operands.to_vec();
        for operand in operands {
            if self.context.is_live(operand) {
                self.context.value_mut(operand).uses.remove(&value);
            }
        }
        if let Some(block) = self.context.value(value).block {
            let block = self.context.block_mut(block);
            block.values.retain(|v| *v != value);
            block.mark_dirty();
        }
        self.context.remove_value_slot(value);
    }

    /// Rewrite a terminator edge `from -> to`.
    pub fn retarget(&mut self, terminator: ValueId, from: BlockId, to: BlockId) {
        let node = self.context.value_mut(terminator);
        match &mut node.kind {
            ValueKind::Branch { target } => {
                if *target == from {
                    *target = to;
                }
            }
            ValueKind::ConditionalBranch {
                true_target,
                false_target,
            } => {
                if *true_target == from {
                    *true_target = to;
                }
                if *false_target == from {
                    *false_target = to;
                }
            }
            ValueKind::Switch { targets, default } => {
                for target in targets.iter_mut() {
                    if *target == from {
                        *target = to;
                    }
                }
                if *default == from {
                    *default = to;
                }
            }
            _ => panic!("retarget on a non-terminator value"),
        }
        if let Some(block) = node.block {
            self.context.block_mut(block).mark_dirty();
        }
    }

    /// Drop every φ edge flowing in from `pred`.
    pub fn remove_phi_incoming(&mut self, phi: ValueId, pred: BlockId) {
        let removed: Vec<ValueId> = {
            let node = self.context.value_mut(phi);
            let ValueKind::Phi { incoming } = &mut node.kind else {
                panic!("remove_phi_incoming on a non-phi value");
            };
            let mut removed = Vec::new();
            let mut index = 0;
            while index < incoming.len() {
                if incoming[index] == pred {
                    incoming.remove(index);
                    removed.push(node.operands.remove(index));
                } else {
                    index += 1;
                }
            }
            removed
        };
        for operand in removed {
            let still_used = self
                .context
                .value(phi)
                .operands
                .iter()
                .any(|o| *o == operand);
            if !still_used && self.context.is_live(operand) {
                self.context.value_mut(operand).uses.remove(&phi);
            }
        }
        if let Some(block) = self.context.value(phi).block {
            self.context.block_mut(block).mark_dirty();
        }
    }

    /// Rewrite φ incoming-block labels after an edge change.
    pub fn replace_phi_incoming_block(&mut self, phi: ValueId, from: BlockId, to: BlockId) {
        let node = self.context.value_mut(phi);
        if let ValueKind::Phi { incoming } = &mut node.kind {
            for block in incoming.iter_mut() {
                if *block == from {
                    *block = to;
                }
            }
        }
    }

    /// Remove an unreachable block and all of its values.
    pub fn remove_block(&mut self, block: BlockId) {
        let values: Vec<ValueId> = self.context.block(block).values.clone();
        // Drop use edges of the block's values first so removal never sees
        // dangling uses among them.
        for value in &values {
            if self.context.is_live(*value) {
                self.context.value_mut(*value).uses.clear();
            }
        }
        for value in values {
            if self.context.is_live(value) {
                self.remove_value(value);
            }
        }
        let method = self.context.method_mut(self.method);
        method.blocks.retain(|b| *b != block);
    }
}

impl Drop for MethodBuilder<'_> {
    fn drop(&mut self) {
        // Flush pending simplifications: compact dirty blocks, then mark
        // the method dirty for the pass driver.
        self.context.collect_method(self.method);
        let method = self.context.method_mut(self.method);
        method.mark_dirty();
        method.release_builder();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodDeclaration;
    use vega_common::MethodHandle;

    fn test_context() -> (IrContext, MethodId) {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![i32_ty, i32_ty]);
        let method = context.create_method(decl).unwrap();
        (context, method)
    }

    #[test]
    fn test_use_edges_are_symmetric() {
        let (mut context, method) = test_context();
        let mut builder = context.create_builder(method).unwrap();
        builder.create_block();
        let lhs = builder.param(0);
        let rhs = builder.param(1);
        let sum = builder
            .binary(BinaryArithKind::Add, ArithFlags::empty(), lhs, rhs)
            .unwrap();
        builder.ret(Some(sum));

        let context = builder.context();
        assert!(context.value(lhs).uses.contains(&sum));
        assert!(context.value(rhs).uses.contains(&sum));
        assert_eq!(context.value(sum).operands.as_slice(), &[lhs, rhs]);
    }

    #[test]
    fn test_all_constant_operands_fold() {
        let (mut context, method) = test_context();
        let mut builder = context.create_builder(method).unwrap();
        builder.create_block();
        let five = builder.int32(5);
        let three = builder.int32(3);
        let sum = builder
            .binary(BinaryArithKind::Add, ArithFlags::empty(), five, three)
            .unwrap();
        let two = builder.int32(2);
        let product = builder
            .binary(BinaryArithKind::Mul, ArithFlags::empty(), sum, two)
            .unwrap();
        assert_eq!(
            builder.context().value(product).as_constant(),
            Some(PrimitiveValue::Int32(16))
        );
    }

    #[test]
    fn test_division_by_constant_zero_is_poison() {
        let (mut context, method) = test_context();
        let mut builder = context.create_builder(method).unwrap();
        builder.create_block();
        let lhs = builder.int32(5);
        let zero = builder.int32(0);
        let div = builder
            .binary(BinaryArithKind::Div, ArithFlags::empty(), lhs, zero)
            .unwrap();
        assert!(matches!(
            builder.context().value(div).kind,
            ValueKind::Poison
        ));
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let (mut context, method) = test_context();
        let mut builder = context.create_builder(method).unwrap();
        builder.create_block();
        let lhs = builder.int32(1);
        let rhs = builder.int64(2);
        let err = builder
            .binary(BinaryArithKind::Add, ArithFlags::empty(), lhs, rhs)
            .unwrap_err();
        assert!(matches!(err, CompileError::TypeError { .. }));
    }

    #[test]
    #[should_panic(expected = "already has a terminator")]
    fn test_second_terminator_panics() {
        let (mut context, method) = test_context();
        let mut builder = context.create_builder(method).unwrap();
        builder.create_block();
        builder.ret(None);
        builder.ret(None);
    }

    #[test]
    fn test_phi_insertion_at_block_head() {
        let (mut context, method) = test_context();
        let mut builder = context.create_builder(method).unwrap();
        let entry = builder.create_block();
        let join = builder.create_block();
        builder.set_insert_point(entry);
        let value = builder.int32(1);
        builder.branch(join);
        builder.set_insert_point(join);
        let marker = builder.int32(2);
        let i32_ty = builder.context().primitive_type(PrimitiveType::Int32);
        let phi = builder.create_phi(join, i32_ty);
        builder.add_phi_incoming(phi, entry, value);

        let block = builder.context().block(join);
        assert_eq!(block.values[0], phi);
        assert_eq!(block.values[1], marker);
    }

    #[test]
    fn test_replace_all_uses() {
        let (mut context, method) = test_context();
        let mut builder = context.create_builder(method).unwrap();
        builder.create_block();
        let a = builder.param(0);
        let b = builder.param(1);
        let sum = builder
            .binary(BinaryArithKind::Add, ArithFlags::empty(), a, b)
            .unwrap();
        let doubled = builder
            .binary(BinaryArithKind::Add, ArithFlags::empty(), sum, sum)
            .unwrap();
        builder.replace_all_uses(sum, a);

        let context = builder.context();
        assert_eq!(context.value(doubled).operands.as_slice(), &[a, a]);
        assert!(context.value(sum).uses.is_empty());
        assert!(context.value(a).uses.contains(&doubled));
    }
}
