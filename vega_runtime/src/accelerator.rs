//! Compile orchestration per accelerator
//!
//! An accelerator owns its kernel cache and the collaborator handles
//! (bytecode resolver, kernel loader). Each compilation runs in a fresh IR
//! context: on failure the whole context is discarded, so no partial state
//! survives, and the cache never sees failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use vega_common::{CompileError, Result};
use vega_frontend::{BytecodeResolver, Frontend};
use vega_ir::{IrContext, KernelSpecialization, PassPipeline};

use crate::backend::{Backend, CompiledKernel, KernelLoader, LoadedKernel};
use crate::cache::{CompiledKey, KernelCache};
use crate::specialization;

/// A device that compiles and loads kernels, with memoization.
pub struct Accelerator<R, L> {
    backend: Backend,
    resolver: R,
    loader: L,
    cache: KernelCache,
    compile_count: AtomicUsize,
}

impl<R: BytecodeResolver, L: KernelLoader> Accelerator<R, L> {
    pub fn new(backend: Backend, resolver: R, loader: L) -> Self {
        Self::with_caching(backend, resolver, loader, true)
    }

    pub fn with_caching(backend: Backend, resolver: R, loader: L, caching: bool) -> Self {
        Self {
            backend,
            resolver,
            loader,
            cache: KernelCache::new(caching),
            compile_count: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn cache(&self) -> &KernelCache {
        &self.cache
    }

    /// How many uncached compilations ran; test hook.
    pub fn compile_count(&self) -> usize {
        self.compile_count.load(Ordering::Relaxed)
    }

    /// Compile (or fetch) the kernel behind `token` under a specialization.
    pub fn compile_kernel(
        &self,
        token: u64,
        spec: &KernelSpecialization,
    ) -> Result<Arc<CompiledKernel>> {
        let handle = self
            .resolver
            .resolve(token)
            .ok_or_else(|| CompileError::UnsupportedCallTarget(format!("token {}", token)))?
            .handle
            .clone();
        let key: CompiledKey = (handle, *spec);
        if let Some(hit) = self.cache.lookup_compiled(&key) {
            debug!("cache hit for {}", key.0);
            return Ok(hit);
        }
        // Compilation runs outside the cache lock; on a racing miss the
        // last writer simply replaces the entry.
        let kernel = self.compile_uncached(token, spec)?;
        self.cache.insert_compiled(key, &kernel);
        Ok(kernel)
    }

    fn compile_uncached(
        &self,
        token: u64,
        spec: &KernelSpecialization,
    ) -> Result<Arc<CompiledKernel>> {
        let mut context = IrContext::new();
        let method = Frontend::new(&self.resolver).compile(&mut context, token)?;
        let pipeline = PassPipeline::standard(*spec);
        pipeline.run(&mut context, method)?;
        let emitted = self.backend.emit(&context, method, *spec)?;
        self.compile_count.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(CompiledKernel {
            handle: context.method(method).handle().clone(),
            specialization_bytes: specialization::to_bytes(spec),
            symbol: emitted.symbol,
            text: emitted.text,
        }))
    }

    /// Compile and load a kernel onto the device, memoizing the loaded
    /// tier by implicit group size.
    pub fn load_kernel(
        &self,
        token: u64,
        spec: &KernelSpecialization,
        implicit_group_size: u32,
    ) -> Result<Arc<LoadedKernel>> {
        let compiled = self.compile_kernel(token, spec)?;
        let key = (
            (compiled.handle.clone(), *spec),
            implicit_group_size,
        );
        if let Some(hit) = self.cache.lookup_loaded(&key) {
            return Ok(hit);
        }
        let info = self.loader.load(&compiled, implicit_group_size)?;
        let loaded = Arc::new(LoadedKernel {
            compiled,
            native: info.native,
            group_size: info.group_size,
            min_grid_size: info.min_grid_size,
        });
        self.cache.insert_loaded(key, &loaded);
        Ok(loaded)
    }
}
