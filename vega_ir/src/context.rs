//! IR context: interning, id assignment and ownership of all IR
//!
//! The context owns every type, method, block and value. Types and methods
//! are interned (structurally and by handle respectively); values live in an
//! id-indexed arena so operand edges are plain ids and cyclic use graphs
//! need no reference counting.

use std::collections::HashMap;

use indexmap::IndexMap;
use smallvec::SmallVec;

use vega_common::{CompileError, MethodHandle, Result};

use crate::block::{Block, BlockId};
use crate::builder::MethodBuilder;
use crate::method::{Method, MethodDeclaration, MethodId};
use crate::types::{AddressSpace, PrimitiveType, TypeId, TypeKind};
use crate::value::{Value, ValueId, ValueKind};

/// Owner of all IR for one compilation.
///
/// Not safe for concurrent mutation; distinct contexts may be used from
/// distinct threads.
pub struct IrContext {
    types: Vec<TypeKind>,
    type_cache: HashMap<TypeKind, TypeId>,
    /// Value arena; a `None` slot is a value removed by GC.
    values: Vec<Option<Value>>,
    blocks: Vec<Block>,
    methods: Vec<Method>,
    registry: IndexMap<MethodHandle, MethodId>,
}

impl IrContext {
    pub fn new() -> Self {
        let mut context = Self {
            types: Vec::new(),
            type_cache: HashMap::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            methods: Vec::new(),
            registry: IndexMap::new(),
        };
        // Primitives are always interned so lookups never need mutation.
        for prim in [
            PrimitiveType::Void,
            PrimitiveType::Int1,
            PrimitiveType::Int8,
            PrimitiveType::Int16,
            PrimitiveType::Int32,
            PrimitiveType::Int64,
            PrimitiveType::Float32,
            PrimitiveType::Float64,
        ] {
            context.intern_type(TypeKind::Primitive(prim));
        }
        context
    }

    // ---- types ----------------------------------------------------------

    /// Intern a type shape, returning the canonical id for it.
    pub fn intern_type(&mut self, kind: TypeKind) -> TypeId {
        if let Some(id) = self.type_cache.get(&kind) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(kind.clone());
        self.type_cache.insert(kind, id);
        id
    }

    pub fn type_kind(&self, ty: TypeId) -> &TypeKind {
        &self.types[ty.index()]
    }

    /// Canonical id of a primitive type. Always present.
    pub fn primitive_type(&self, prim: PrimitiveType) -> TypeId {
        self.type_cache[&TypeKind::Primitive(prim)]
    }

    pub fn void_type(&self) -> TypeId {
        self.primitive_type(PrimitiveType::Void)
    }

    pub fn pointer_type(&mut self, element: TypeId, space: AddressSpace) -> TypeId {
        self.intern_type(TypeKind::Pointer { element, space })
    }

    pub fn view_type(&mut self, element: TypeId, space: AddressSpace) -> TypeId {
        self.intern_type(TypeKind::View { element, space })
    }

    pub fn structure_type(&mut self, fields: Vec<TypeId>) -> TypeId {
        self.intern_type(TypeKind::Structure { fields })
    }

    /// The primitive kind of a type, if it is primitive.
    pub fn as_primitive(&self, ty: TypeId) -> Option<PrimitiveType> {
        self.type_kind(ty).as_primitive()
    }

    // ---- methods --------------------------------------------------------

    /// Register a method by handle.
    ///
    /// Parameter values are created eagerly so that builders and callers can
    /// reference them before the body exists.
    pub fn create_method(&mut self, declaration: MethodDeclaration) -> Result<MethodId> {
        if self.registry.contains_key(&declaration.handle) {
            return Err(CompileError::DuplicateMethod(
                declaration.handle.to_string(),
            ));
        }
        let id = MethodId(self.methods.len() as u32);
        let handle = declaration.handle.clone();
        let param_types = declaration.param_types.clone();
        let mut method = Method::new(id, declaration);
        for (index, ty) in param_types.into_iter().enumerate() {
            let param = self.alloc_value(ty, None, ValueKind::Parameter { index }, SmallVec::new());
            method.params.push(param);
        }
        self.methods.push(method);
        self.registry.insert(handle, id);
        Ok(id)
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut Method {
        &mut self.methods[id.index()]
    }

    pub fn find_method(&self, handle: &MethodHandle) -> Option<MethodId> {
        self.registry.get(handle).copied()
    }

    /// All registered methods in registration order.
    pub fn methods(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.registry.values().copied()
    }

    /// Acquire the exclusive builder for a method.
    pub fn create_builder(&mut self, method: MethodId) -> Result<MethodBuilder<'_>> {
        if !self.methods[method.index()].try_acquire_builder() {
            return Err(CompileError::BuilderInUse(
                self.methods[method.index()].handle().to_string(),
            ));
        }
        Ok(MethodBuilder::new(self, method))
    }

    // ---- values and blocks ----------------------------------------------

    pub(crate) fn alloc_value(
        &mut self,
        ty: TypeId,
        block: Option<BlockId>,
        kind: ValueKind,
        operands: SmallVec<[ValueId; 3]>,
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        for operand in &operands {
            if let Some(value) = self.values[operand.index()].as_mut() {
                value.uses.insert(id);
            }
        }
        self.values.push(Some(Value {
            id,
            ty,
            block,
            kind,
            operands,
            uses: Default::default(),
        }));
        id
    }

    pub(crate) fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id));
        id
    }

    pub fn value(&self, id: ValueId) -> &Value {
        self.values[id.index()]
            .as_ref()
            .expect("value was garbage collected")
    }

    pub(crate) fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values[id.index()]
            .as_mut()
            .expect("value was garbage collected")
    }

    pub fn is_live(&self, id: ValueId) -> bool {
        self.values[id.index()].is_some()
    }

    pub(crate) fn remove_value_slot(&mut self, id: ValueId) {
        self.values[id.index()] = None;
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    /// The terminator of a block, if the block is sealed.
    pub fn terminator(&self, block: BlockId) -> Option<ValueId> {
        let last = self.block(block).last_value()?;
        self.value(last).kind.is_terminator().then_some(last)
    }

    /// Successor blocks derived from the terminator.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match self.terminator(block) {
            Some(term) => self.value(term).kind.successors(),
            None => Vec::new(),
        }
    }

    /// Compact dirty blocks of a method, dropping garbage-collected value
    /// slots from their sequences.
    pub fn collect_method(&mut self, method: MethodId) {
        let blocks: Vec<BlockId> = self.methods[method.index()].blocks.clone();
        for block_id in blocks {
            if !self.blocks[block_id.index()].dirty {
                continue;
            }
            let live: Vec<ValueId> = self.blocks[block_id.index()]
                .values
                .iter()
                .copied()
                .filter(|id| self.values[id.index()].is_some())
                .collect();
            let block = &mut self.blocks[block_id.index()];
            block.values = live;
            block.dirty = false;
        }
    }
}

impl Default for IrContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vega_common::MethodHandle;

    #[test]
    fn test_type_interning_is_canonical() {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let a = context.pointer_type(i32_ty, AddressSpace::Global);
        let b = context.pointer_type(i32_ty, AddressSpace::Global);
        let c = context.pointer_type(i32_ty, AddressSpace::Shared);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let mut context = IrContext::new();
        let void = context.void_type();
        let decl = MethodDeclaration::new(MethodHandle::new(7, "k"), void, vec![]);
        context.create_method(decl.clone()).unwrap();
        let err = context.create_method(decl).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateMethod(_)));
    }

    #[test]
    fn test_parameters_created_with_method() {
        let mut context = IrContext::new();
        let void = context.void_type();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), void, vec![i32_ty, i32_ty]);
        let id = context.create_method(decl).unwrap();
        let method = context.method(id);
        assert_eq!(method.params.len(), 2);
        let p0 = context.value(method.params[0]);
        assert_eq!(p0.ty, i32_ty);
        assert!(matches!(p0.kind, ValueKind::Parameter { index: 0 }));
    }

    #[test]
    fn test_builder_exclusivity() {
        let mut context = IrContext::new();
        let void = context.void_type();
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), void, vec![]);
        let id = context.create_method(decl).unwrap();
        {
            let builder = context.create_builder(id).unwrap();
            drop(builder);
        }
        // Lock released on drop; a new builder can be acquired.
        let builder = context.create_builder(id).unwrap();
        drop(builder);
    }

    #[test]
    fn test_value_ids_strictly_increase() {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let a = context.alloc_value(
            i32_ty,
            None,
            ValueKind::Parameter { index: 0 },
            SmallVec::new(),
        );
        let b = context.alloc_value(
            i32_ty,
            None,
            ValueKind::Parameter { index: 1 },
            SmallVec::new(),
        );
        assert!(a < b);
    }
}
