//! Kernel cache, specialization and compile orchestration
//!
//! This crate ties the compiler stages together per accelerator: it turns
//! a method handle plus a [`KernelSpecialization`] into target text via
//! the frontend, the pass pipeline and a backend, and memoizes compiled
//! and loaded kernels behind weak references.

pub mod accelerator;
pub mod backend;
pub mod cache;
pub mod specialization;

pub use accelerator::Accelerator;
pub use backend::{Backend, BackendKind, CompiledKernel, KernelLoader, LoadedKernel, LoadedKernelInfo};
pub use cache::{KernelCache, GC_THRESHOLD};
pub use vega_ir::{KernelSpecialization, SpecializationFlags};
