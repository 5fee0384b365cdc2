//! Backend descriptors and the loader contract

use std::sync::Arc;

use vega_backends::{EmittedKernel, OpenClBackend, PtxBackend};
use vega_common::{MethodHandle, Result};
use vega_ir::{IrContext, KernelSpecialization, MethodId, TargetAbi};

/// The code generation target of an accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Ptx,
    OpenCl,
}

/// Names the target and carries its ABI descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backend {
    pub kind: BackendKind,
    pub abi: TargetAbi,
}

impl Backend {
    pub fn ptx() -> Self {
        Self {
            kind: BackendKind::Ptx,
            abi: TargetAbi::ptx(),
        }
    }

    pub fn opencl() -> Self {
        Self {
            kind: BackendKind::OpenCl,
            abi: TargetAbi::opencl(),
        }
    }

    /// Run the target code generator over a finished method.
    pub fn emit(
        &self,
        context: &IrContext,
        method: MethodId,
        specialization: KernelSpecialization,
    ) -> Result<EmittedKernel> {
        match self.kind {
            BackendKind::Ptx => {
                PtxBackend::new(self.abi, specialization).emit_kernel(context, method)
            }
            BackendKind::OpenCl => {
                OpenClBackend::new(self.abi, specialization).emit_kernel(context, method)
            }
        }
    }
}

/// A compiled kernel: target text plus its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledKernel {
    pub handle: MethodHandle,
    pub specialization_bytes: Vec<u8>,
    pub symbol: String,
    pub text: String,
}

/// A kernel loaded onto a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedKernel {
    pub compiled: Arc<CompiledKernel>,
    /// Device handle of the loaded function.
    pub native: u64,
    pub group_size: u32,
    pub min_grid_size: u32,
}

/// What the device driver reports after loading a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedKernelInfo {
    pub native: u64,
    pub group_size: u32,
    pub min_grid_size: u32,
}

/// External collaborator that hands compiled text to the device driver.
///
/// Loading is synchronous and opaque to the compiler core; failures come
/// back as `CompilationFailed`.
pub trait KernelLoader {
    fn load(&self, kernel: &CompiledKernel, implicit_group_size: u32) -> Result<LoadedKernelInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_descriptors() {
        let ptx = Backend::ptx();
        assert_eq!(ptx.kind, BackendKind::Ptx);
        assert_eq!(ptx.abi.pointer_size, 8);
        let opencl = Backend::opencl();
        assert_eq!(opencl.kind, BackendKind::OpenCl);
        assert_eq!(opencl.abi.warp_size, 32);
    }
}
