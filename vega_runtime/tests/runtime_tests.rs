//! Accelerator-level tests: caching, reuse and reload behavior.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use vega_common::{CompileError, MethodHandle, Result};
use vega_frontend::{
    BinOp, BytecodeMethod, BytecodeMethodFlags, BytecodeResolver, BytecodeType, OpCode, ScalarType,
};
use vega_runtime::{
    Accelerator, Backend, CompiledKernel, KernelLoader, KernelSpecialization, LoadedKernelInfo,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct MapResolver {
    methods: HashMap<u64, BytecodeMethod>,
}

impl MapResolver {
    fn add(&mut self, method: BytecodeMethod) {
        self.methods.insert(method.handle.token, method);
    }
}

impl BytecodeResolver for MapResolver {
    fn resolve(&self, token: u64) -> Option<&BytecodeMethod> {
        self.methods.get(&token)
    }
}

/// Loader stub that hands out increasing native handles.
#[derive(Default)]
struct CountingLoader {
    loads: AtomicU64,
    fail: bool,
}

impl KernelLoader for CountingLoader {
    fn load(&self, _kernel: &CompiledKernel, implicit_group_size: u32) -> Result<LoadedKernelInfo> {
        if self.fail {
            return Err(CompileError::CompilationFailed(
                "driver rejected module".to_string(),
            ));
        }
        let native = self.loads.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(LoadedKernelInfo {
            native,
            group_size: if implicit_group_size == 0 {
                128
            } else {
                implicit_group_size
            },
            min_grid_size: 1,
        })
    }
}

fn saxpy_like(token: u64) -> BytecodeMethod {
    BytecodeMethod {
        handle: MethodHandle::new(token, format!("Kernel{}", token)),
        param_types: vec![
            BytecodeType::Scalar(ScalarType::I32),
            BytecodeType::View(ScalarType::I32),
        ],
        return_type: BytecodeType::Void,
        local_types: vec![],
        code: vec![
            OpCode::LoadArg(1),
            OpCode::LoadArg(0),
            OpCode::LoadArg(0),
            OpCode::LoadArg(0),
            OpCode::Binary {
                op: BinOp::Mul,
                unsigned: false,
            },
            OpCode::StoreElement,
            OpCode::Return,
        ],
        flags: BytecodeMethodFlags::default(),
    }
}

fn accelerator(tokens: &[u64]) -> Accelerator<MapResolver, CountingLoader> {
    let mut resolver = MapResolver::default();
    for token in tokens {
        resolver.add(saxpy_like(*token));
    }
    Accelerator::new(Backend::ptx(), resolver, CountingLoader::default())
}

#[test]
fn test_cache_reuse_compiles_once() {
    init_logging();
    let accelerator = accelerator(&[1]);
    let spec = KernelSpecialization::default();
    let first = accelerator.compile_kernel(1, &spec).unwrap();
    let second = accelerator.compile_kernel(1, &spec).unwrap();
    assert_eq!(accelerator.compile_count(), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_distinct_specializations_compile_separately() {
    init_logging();
    let accelerator = accelerator(&[1]);
    let default = KernelSpecialization::default();
    let pinned = KernelSpecialization::default().with_group_size(64);
    let a = accelerator.compile_kernel(1, &default).unwrap();
    let b = accelerator.compile_kernel(1, &pinned).unwrap();
    assert_eq!(accelerator.compile_count(), 2);
    assert!(!Arc::ptr_eq(&a, &b));
    // The pinned build carries the group-size directive.
    assert!(b.text.contains(".reqntid 64, 1, 1"));
    assert!(!a.text.contains(".reqntid"));
}

#[test]
fn test_expired_entry_recompiles_equivalently() {
    init_logging();
    let accelerator = accelerator(&[1]);
    let spec = KernelSpecialization::default();
    let first_text = {
        let first = accelerator.compile_kernel(1, &spec).unwrap();
        first.text.clone()
    };
    // The weak reference expired with the drop above.
    let second = accelerator.compile_kernel(1, &spec).unwrap();
    assert_eq!(accelerator.compile_count(), 2);
    assert_eq!(second.text, first_text);
}

#[test]
fn test_disabled_cache_always_recompiles() {
    init_logging();
    let mut resolver = MapResolver::default();
    resolver.add(saxpy_like(1));
    let accelerator =
        Accelerator::with_caching(Backend::ptx(), resolver, CountingLoader::default(), false);
    let spec = KernelSpecialization::default();
    let _first = accelerator.compile_kernel(1, &spec).unwrap();
    let _second = accelerator.compile_kernel(1, &spec).unwrap();
    assert_eq!(accelerator.compile_count(), 2);
}

#[test]
fn test_loaded_tier_memoizes_by_group_size() {
    init_logging();
    let accelerator = accelerator(&[1]);
    let spec = KernelSpecialization::default();
    let a = accelerator.load_kernel(1, &spec, 0).unwrap();
    let b = accelerator.load_kernel(1, &spec, 0).unwrap();
    let c = accelerator.load_kernel(1, &spec, 64).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(a.group_size, 128);
    assert_eq!(c.group_size, 64);
}

#[test]
fn test_load_failure_is_not_memoized() {
    init_logging();
    let mut resolver = MapResolver::default();
    resolver.add(saxpy_like(1));
    let loader = CountingLoader {
        fail: true,
        ..Default::default()
    };
    let accelerator = Accelerator::new(Backend::ptx(), resolver, loader);
    let spec = KernelSpecialization::default();
    let err = accelerator.load_kernel(1, &spec, 0).unwrap_err();
    assert!(matches!(err, CompileError::CompilationFailed(_)));
    // The compiled tier kept its entry, the loaded tier stayed empty.
    assert_eq!(accelerator.cache().loaded_len(), 0);
}

#[test]
fn test_opencl_backend_end_to_end() {
    init_logging();
    let mut resolver = MapResolver::default();
    resolver.add(saxpy_like(1));
    let accelerator = Accelerator::new(Backend::opencl(), resolver, CountingLoader::default());
    let kernel = accelerator
        .compile_kernel(1, &KernelSpecialization::default())
        .unwrap();
    assert_eq!(kernel.symbol, "ILGPUKernel");
    assert!(kernel.text.contains("__kernel void ILGPUKernel("));
}
