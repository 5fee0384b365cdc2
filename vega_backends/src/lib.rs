//! PTX and OpenCL code generation for the Vega kernel compiler
//!
//! Both backends walk fully simplified IR in reverse post-order and print
//! target text: PTX assembly for NVIDIA devices, OpenCL C for everything
//! else. Emission is deterministic: the same method and specialization
//! always produce byte-identical output.

pub mod opencl;
pub mod ptx;
pub mod source;

pub use opencl::OpenClBackend;
pub use ptx::PtxBackend;
pub use source::SourceBuilder;

use vega_ir::analysis::Scope;
use vega_ir::{IrContext, Method, MethodId, ValueKind};

/// The product of a backend run: the kernel symbol and the module text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedKernel {
    pub symbol: String,
    pub text: String,
}

/// Methods transitively called from `entry`, in deterministic post-order
/// (callees before callers).
pub(crate) fn called_methods(context: &IrContext, entry: MethodId) -> Vec<MethodId> {
    let mut order = Vec::new();
    let mut visited = vec![entry];
    let mut stack = vec![(entry, false)];
    while let Some((method, expanded)) = stack.pop() {
        if expanded {
            if method != entry {
                order.push(method);
            }
            continue;
        }
        stack.push((method, true));
        let scope = Scope::compute(context, method);
        for block in scope.rpo() {
            for value in &context.block(*block).values {
                if let ValueKind::Call { target } = context.value(*value).kind {
                    if !visited.contains(&target) {
                        visited.push(target);
                        stack.push((target, false));
                    }
                }
            }
        }
    }
    order
}

/// Symbol of a non-entry device function.
pub(crate) fn function_symbol(method: &Method) -> String {
    format!("fn{}_{}", method.handle().token, method.name())
}
