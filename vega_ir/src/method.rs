//! Methods: declarations, flags and per-method IR state

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;

use vega_common::{MethodHandle, SourceRef};

use crate::block::BlockId;
use crate::types::TypeId;
use crate::value::ValueId;

/// Identity of a method within one IR context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl MethodId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Declaration-time method properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        const NO_INLINING = 1 << 0;
        const AGGRESSIVE_INLINING = 1 << 1;
        const EXTERNAL_DECLARATION = 1 << 2;
        const EXTERNAL = 1 << 3;
    }
}

bitflags! {
    /// Mutable per-method transformation state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransformFlags: u32 {
        /// IR changed since the last pipeline run.
        const DIRTY = 1 << 0;
        /// The pipeline reached a fixed point; passes skip the method.
        const TRANSFORMED = 1 << 1;
    }
}

/// Immutable description of a method.
#[derive(Debug, Clone)]
pub struct MethodDeclaration {
    pub handle: MethodHandle,
    pub return_type: TypeId,
    pub param_types: Vec<TypeId>,
    pub source: SourceRef,
    pub flags: MethodFlags,
}

impl MethodDeclaration {
    pub fn new(handle: MethodHandle, return_type: TypeId, param_types: Vec<TypeId>) -> Self {
        Self {
            handle,
            return_type,
            param_types,
            source: SourceRef::unknown(),
            flags: MethodFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.source = source;
        self
    }
}

/// A method under construction or transformation.
pub struct Method {
    pub id: MethodId,
    pub declaration: MethodDeclaration,
    /// Parameter values in declaration order.
    pub params: Vec<ValueId>,
    pub entry: Option<BlockId>,
    /// All blocks of the method in creation order.
    pub blocks: Vec<BlockId>,
    pub transform_flags: TransformFlags,
    /// Exclusive builder lock; see `IrContext::create_builder`.
    pub(crate) builder_active: AtomicBool,
}

impl Method {
    pub fn new(id: MethodId, declaration: MethodDeclaration) -> Self {
        Self {
            id,
            declaration,
            params: Vec::new(),
            entry: None,
            blocks: Vec::new(),
            transform_flags: TransformFlags::empty(),
            builder_active: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> &MethodHandle {
        &self.declaration.handle
    }

    pub fn name(&self) -> &str {
        &self.declaration.handle.name
    }

    pub fn flags(&self) -> MethodFlags {
        self.declaration.flags
    }

    pub fn can_inline(&self) -> bool {
        !self.declaration.flags.intersects(
            MethodFlags::NO_INLINING | MethodFlags::EXTERNAL | MethodFlags::EXTERNAL_DECLARATION,
        )
    }

    pub fn mark_dirty(&mut self) {
        self.transform_flags |= TransformFlags::DIRTY;
        self.transform_flags -= TransformFlags::TRANSFORMED;
    }

    pub fn mark_transformed(&mut self) {
        self.transform_flags -= TransformFlags::DIRTY;
        self.transform_flags |= TransformFlags::TRANSFORMED;
    }

    pub fn is_transformed(&self) -> bool {
        self.transform_flags.contains(TransformFlags::TRANSFORMED)
    }

    /// Try to take the builder lock. Returns false if a builder is live.
    pub(crate) fn try_acquire_builder(&self) -> bool {
        self.builder_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_builder(&self) {
        self.builder_active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("handle", &self.declaration.handle)
            .field("blocks", &self.blocks.len())
            .field("flags", &self.declaration.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vega_common::MethodHandle;

    fn declaration() -> MethodDeclaration {
        MethodDeclaration::new(MethodHandle::new(1, "f"), TypeId(0), vec![])
    }

    #[test]
    fn test_builder_lock() {
        let method = Method::new(MethodId(0), declaration());
        assert!(method.try_acquire_builder());
        assert!(!method.try_acquire_builder());
        method.release_builder();
        assert!(method.try_acquire_builder());
    }

    #[test]
    fn test_inline_eligibility() {
        let inlinable = Method::new(MethodId(0), declaration());
        assert!(inlinable.can_inline());

        let frozen = Method::new(
            MethodId(1),
            declaration().with_flags(MethodFlags::NO_INLINING),
        );
        assert!(!frozen.can_inline());

        let external = Method::new(MethodId(2), declaration().with_flags(MethodFlags::EXTERNAL));
        assert!(!external.can_inline());
    }

    #[test]
    fn test_transform_flags() {
        let mut method = Method::new(MethodId(0), declaration());
        method.mark_transformed();
        assert!(method.is_transformed());
        method.mark_dirty();
        assert!(!method.is_transformed());
        assert!(method.transform_flags.contains(TransformFlags::DIRTY));
    }
}
