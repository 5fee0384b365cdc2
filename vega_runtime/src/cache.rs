//! Two-tier weak-reference kernel cache
//!
//! Compiled and loaded kernels are memoized behind weak references so the
//! cache never extends their lifetime. Both maps sit behind one mutex with
//! short critical sections; expensive work (compilation, loading) runs
//! outside the lock, so two racing misses may both compute and the second
//! insert wins. Dead entries are compacted incrementally: after an
//! insertion that leaves a map at a multiple of the GC threshold, the map
//! is rebuilt with only live entries.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use log::trace;

use vega_common::MethodHandle;
use vega_ir::KernelSpecialization;

use crate::backend::{CompiledKernel, LoadedKernel};

/// Entries between compacting sweeps.
pub const GC_THRESHOLD: usize = 128;

pub type CompiledKey = (MethodHandle, KernelSpecialization);
pub type LoadedKey = (CompiledKey, u32);

struct LoadedEntry {
    kernel: Weak<LoadedKernel>,
    #[allow(dead_code)]
    group_size: u32,
    #[allow(dead_code)]
    min_grid_size: u32,
}

#[derive(Default)]
struct CacheMaps {
    compiled: HashMap<CompiledKey, Weak<CompiledKernel>>,
    loaded: HashMap<LoadedKey, LoadedEntry>,
}

/// The per-accelerator kernel cache; absent entirely when caching is
/// disabled.
pub struct KernelCache {
    maps: Option<Mutex<CacheMaps>>,
}

impl KernelCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            maps: enabled.then(|| Mutex::new(CacheMaps::default())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.maps.is_some()
    }

    /// Upgrade the compiled-tier weak reference, if the entry is live.
    pub fn lookup_compiled(&self, key: &CompiledKey) -> Option<Arc<CompiledKernel>> {
        let maps = self.maps.as_ref()?;
        let guard = maps.lock().expect("kernel cache poisoned");
        guard.compiled.get(key).and_then(Weak::upgrade)
    }

    /// Insert (or overwrite) a compiled kernel, then maybe sweep.
    pub fn insert_compiled(&self, key: CompiledKey, kernel: &Arc<CompiledKernel>) {
        let Some(maps) = self.maps.as_ref() else {
            return;
        };
        let mut guard = maps.lock().expect("kernel cache poisoned");
        guard.compiled.insert(key, Arc::downgrade(kernel));
        maybe_sweep(&mut guard.compiled, |entry| entry.strong_count() > 0);
    }

    pub fn lookup_loaded(&self, key: &LoadedKey) -> Option<Arc<LoadedKernel>> {
        let maps = self.maps.as_ref()?;
        let guard = maps.lock().expect("kernel cache poisoned");
        guard.loaded.get(key).and_then(|entry| entry.kernel.upgrade())
    }

    pub fn insert_loaded(&self, key: LoadedKey, kernel: &Arc<LoadedKernel>) {
        let Some(maps) = self.maps.as_ref() else {
            return;
        };
        let mut guard = maps.lock().expect("kernel cache poisoned");
        guard.loaded.insert(
            key,
            LoadedEntry {
                kernel: Arc::downgrade(kernel),
                group_size: kernel.group_size,
                min_grid_size: kernel.min_grid_size,
            },
        );
        maybe_sweep(&mut guard.loaded, |entry| entry.kernel.strong_count() > 0);
    }

    /// Entries in the compiled tier, live or dead; test hook.
    pub fn compiled_len(&self) -> usize {
        match self.maps.as_ref() {
            Some(maps) => maps.lock().expect("kernel cache poisoned").compiled.len(),
            None => 0,
        }
    }

    /// Compiled-tier entries whose referent is still alive.
    pub fn compiled_live_len(&self) -> usize {
        match self.maps.as_ref() {
            Some(maps) => maps
                .lock()
                .expect("kernel cache poisoned")
                .compiled
                .values()
                .filter(|entry| entry.strong_count() > 0)
                .count(),
            None => 0,
        }
    }

    pub fn loaded_len(&self) -> usize {
        match self.maps.as_ref() {
            Some(maps) => maps.lock().expect("kernel cache poisoned").loaded.len(),
            None => 0,
        }
    }
}

/// Compacting sweep: rebuild the map with live entries only, when its size
/// just reached a multiple of the threshold.
fn maybe_sweep<K: Eq + Hash + Clone, V>(map: &mut HashMap<K, V>, live: impl Fn(&V) -> bool) {
    let len = map.len();
    if len < GC_THRESHOLD || len % GC_THRESHOLD != 0 {
        return;
    }
    let mut fresh = HashMap::with_capacity(len);
    for (key, value) in map.drain() {
        if live(&value) {
            fresh.insert(key, value);
        }
    }
    trace!("cache sweep compacted {} -> {} entries", len, fresh.len());
    *map = fresh;
}
