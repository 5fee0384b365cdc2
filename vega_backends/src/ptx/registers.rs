//! PTX register allocation
//!
//! Every non-structure value binds to one register; structures and views
//! bind to a tuple of child registers. Allocation is linear with a free
//! list per kind; registers are released once emission passes the value's
//! last use. Aliasing bindings (zero-offset field addresses) are handled
//! by reference counts so a shared register is never freed twice.

use std::collections::HashMap;
use std::fmt;

use smallvec::SmallVec;

use vega_ir::{IrContext, PrimitiveType, TypeId, TypeKind, ValueId};

/// Register classes of the PTX backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    /// Predicate registers (`%p`).
    Pred,
    /// 16-bit integer registers (`%rs`), also used for 8-bit values.
    B16,
    /// 32-bit integer registers (`%r`).
    B32,
    /// 64-bit integer and pointer registers (`%rd`).
    B64,
    /// 32-bit float registers (`%f`).
    F32,
    /// 64-bit float registers (`%fd`).
    F64,
}

impl RegisterKind {
    pub fn prefix(self) -> &'static str {
        match self {
            RegisterKind::Pred => "%p",
            RegisterKind::B16 => "%rs",
            RegisterKind::B32 => "%r",
            RegisterKind::B64 => "%rd",
            RegisterKind::F32 => "%f",
            RegisterKind::F64 => "%fd",
        }
    }

    pub fn declaration(self) -> &'static str {
        match self {
            RegisterKind::Pred => ".pred",
            RegisterKind::B16 => ".b16",
            RegisterKind::B32 => ".b32",
            RegisterKind::B64 => ".b64",
            RegisterKind::F32 => ".f32",
            RegisterKind::F64 => ".f64",
        }
    }

    /// Register class of a primitive type.
    pub fn of(prim: PrimitiveType) -> Self {
        match prim {
            PrimitiveType::Int1 => RegisterKind::Pred,
            PrimitiveType::Int8 | PrimitiveType::Int16 => RegisterKind::B16,
            PrimitiveType::Int32 => RegisterKind::B32,
            PrimitiveType::Int64 => RegisterKind::B64,
            PrimitiveType::Float32 => RegisterKind::F32,
            PrimitiveType::Float64 => RegisterKind::F64,
            PrimitiveType::Void => RegisterKind::B32,
        }
    }
}

/// One PTX register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub kind: RegisterKind,
    pub index: u32,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.index)
    }
}

/// The registers a value occupies: one for scalars and pointers, a
/// recursive flattening for views and structures.
pub type Binding = SmallVec<[Register; 2]>;

/// Flattened register classes of a type.
pub fn register_kinds(context: &IrContext, ty: TypeId, out: &mut Vec<RegisterKind>) {
    match context.type_kind(ty) {
        TypeKind::Primitive(prim) => out.push(RegisterKind::of(*prim)),
        TypeKind::Pointer { .. } => out.push(RegisterKind::B64),
        TypeKind::View { .. } => {
            out.push(RegisterKind::B64);
            out.push(RegisterKind::B32);
        }
        TypeKind::Array { element, dimensions } => {
            let (element, dimensions) = (*element, *dimensions);
            for _ in 0..dimensions.max(1) {
                register_kinds(context, element, out);
            }
        }
        TypeKind::Structure { fields } => {
            for field in fields.clone() {
                register_kinds(context, field, out);
            }
        }
    }
}

/// Linear register allocator with per-kind free lists.
pub struct RegisterAllocator {
    next: HashMap<RegisterKind, u32>,
    free: HashMap<RegisterKind, Vec<u32>>,
    high_water: HashMap<RegisterKind, u32>,
    bindings: HashMap<ValueId, Binding>,
    refcounts: HashMap<Register, usize>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        Self {
            next: HashMap::new(),
            free: HashMap::new(),
            high_water: HashMap::new(),
            bindings: HashMap::new(),
            refcounts: HashMap::new(),
        }
    }

    fn fresh(&mut self, kind: RegisterKind) -> Register {
        let index = match self.free.get_mut(&kind).and_then(Vec::pop) {
            Some(index) => index,
            None => {
                let counter = self.next.entry(kind).or_insert(1);
                let index = *counter;
                *counter += 1;
                let high = self.high_water.entry(kind).or_insert(0);
                if index > *high {
                    *high = index;
                }
                index
            }
        };
        Register { kind, index }
    }

    /// Allocate the register tuple for a value of `ty` and bind it.
    pub fn bind(&mut self, context: &IrContext, value: ValueId, ty: TypeId) -> Binding {
        let mut kinds = Vec::new();
        register_kinds(context, ty, &mut kinds);
        let binding: Binding = kinds.into_iter().map(|kind| self.fresh(kind)).collect();
        for register in &binding {
            *self.refcounts.entry(*register).or_insert(0) += 1;
        }
        self.bindings.insert(value, binding.clone());
        binding
    }

    /// Bind `value` to registers that already exist (zero-offset aliases).
    pub fn bind_alias(&mut self, value: ValueId, registers: Binding) {
        for register in &registers {
            *self.refcounts.entry(*register).or_insert(0) += 1;
        }
        self.bindings.insert(value, registers);
    }

    /// Allocate a scratch register outside any binding.
    pub fn temp(&mut self, kind: RegisterKind) -> Register {
        let register = self.fresh(kind);
        *self.refcounts.entry(register).or_insert(0) += 1;
        register
    }

    pub fn release_temp(&mut self, register: Register) {
        self.release_register(register);
    }

    pub fn binding(&self, value: ValueId) -> Option<&Binding> {
        self.bindings.get(&value)
    }

    /// The single register of a scalar value.
    pub fn scalar(&self, value: ValueId) -> Register {
        self.bindings[&value][0]
    }

    /// Release a value's registers back to the free list.
    pub fn release(&mut self, value: ValueId) {
        let Some(binding) = self.bindings.remove(&value) else {
            return;
        };
        for register in binding {
            self.release_register(register);
        }
    }

    fn release_register(&mut self, register: Register) {
        let count = self
            .refcounts
            .get_mut(&register)
            .expect("released register was allocated");
        *count -= 1;
        if *count == 0 {
            self.refcounts.remove(&register);
            self.free.entry(register.kind).or_default().push(register.index);
        }
    }

    /// High-water register counts per kind, for `.reg` declarations.
    pub fn declared_counts(&self) -> Vec<(RegisterKind, u32)> {
        let mut counts: Vec<(RegisterKind, u32)> = self
            .high_water
            .iter()
            .map(|(kind, high)| (*kind, *high + 1))
            .collect();
        counts.sort_by_key(|(kind, _)| kind.prefix());
        counts
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Materializes a predicate into an integer register and back.
///
/// Predicates live in `.pred` registers; storing one to memory or
/// converting it to an integer goes through a scratch `.b32` register via
/// `selp`.
pub struct PredicateScope {
    temp: Register,
}

impl PredicateScope {
    pub fn enter(allocator: &mut RegisterAllocator) -> Self {
        Self {
            temp: allocator.temp(RegisterKind::B32),
        }
    }

    pub fn register(&self) -> Register {
        self.temp
    }

    /// `selp` materializing `pred` into the scratch register.
    pub fn materialize(&self, pred: Register) -> String {
        format!("selp.u32 {}, 1, 0, {};", self.temp, pred)
    }

    pub fn exit(self, allocator: &mut RegisterAllocator) {
        allocator.release_temp(self.temp);
    }
}
