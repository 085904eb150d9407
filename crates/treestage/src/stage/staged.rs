//! Split-once/call-many driver around a compiling transform.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use anyhow::{ensure, Result};
use lru::LruCache;

use crate::graph::{split, update, GraphDef, LeafValues, Object};
use crate::profiling;
use crate::stage::cache;
use crate::stage::compiler::{PortableCompiler, StagedOutput};

/// Default number of cached executables retained per staged function before
/// LRU eviction kicks in.
pub const DEFAULT_EXECUTABLE_CACHE_CAPACITY: usize = 64;

/// Cache effectiveness counters for one [`StagedFn`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Runs served from this function's own cache.
    pub hits: u64,
    /// Runs served from the process-wide cache.
    pub shared_hits: u64,
    /// Runs that had to compile.
    pub misses: u64,
}

/// A transform staged behind a definition-keyed executable cache.
///
/// `run` is the hot path: it validates the values against the definition,
/// reuses the executable compiled for that definition's fingerprint when one
/// exists, and compiles otherwise. The intended calling pattern is to split
/// a graph once, run any number of times on the values, and merge or update
/// afterwards; `run_graph` bundles that for single-shot callers and pays a
/// full split on every call.
pub struct StagedFn<C: PortableCompiler> {
    compiler: Arc<C>,
    executables: Mutex<LruCache<u64, Arc<C::Executable>>>,
    hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
}

impl<C: PortableCompiler> StagedFn<C> {
    pub fn new(compiler: Arc<C>) -> Self {
        let capacity =
            crate::env::staged_cache_capacity().unwrap_or(DEFAULT_EXECUTABLE_CACHE_CAPACITY);
        Self::with_capacity(compiler, capacity)
    }

    pub fn with_capacity(compiler: Arc<C>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to non-zero");
        StagedFn {
            compiler,
            executables: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            shared_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(AtomicOrdering::Relaxed),
            shared_hits: self.shared_hits.load(AtomicOrdering::Relaxed),
            misses: self.misses.load(AtomicOrdering::Relaxed),
        }
    }

    /// Runs the transform on a definition/values pair, compiling at most
    /// once per definition fingerprint.
    pub fn run(&self, def: &GraphDef, values: &LeafValues) -> Result<StagedOutput> {
        def.check_values(values)?;
        let executable = self.executable_for(def)?;
        let output = self.compiler.execute(&executable, values)?;
        match &output.def {
            Some(new_def) => new_def.check_values(&output.values)?,
            None => def.check_values(&output.values)?,
        }
        Ok(output)
    }

    /// One-shot convenience: splits the graph, runs the transform, and
    /// writes the result back onto the live objects in place. Refuses
    /// structure-changing transforms, whose output cannot be applied to the
    /// input graph; merge those explicitly.
    pub fn run_graph(&self, graph: &Object) -> Result<()> {
        let (def, values) = split(graph)?;
        let output = self.run(&def, &values)?;
        ensure!(
            output.def.is_none(),
            "compiled transform changed the graph structure; merge its output explicitly"
        );
        update(graph, &output.values)?;
        Ok(())
    }

    fn executable_for(&self, def: &GraphDef) -> Result<Arc<C::Executable>> {
        let key = def.fingerprint();
        {
            let mut executables = self.executables.lock().expect("staged cache poisoned");
            if let Some(executable) = executables.get(&key) {
                self.hits.fetch_add(1, AtomicOrdering::Relaxed);
                profiling::cache_event("staged_cache_hit");
                return Ok(Arc::clone(executable));
            }
        }

        let name = self.compiler.compiler_name();
        if let Some(executable) = cache::get_shared::<C::Executable>(name, key) {
            self.shared_hits.fetch_add(1, AtomicOrdering::Relaxed);
            profiling::cache_event("staged_shared_hit");
            self.remember(key, &executable);
            return Ok(executable);
        }

        // Compile outside the cache lock; concurrent misses on the same
        // fingerprint may compile twice and the last insert wins.
        self.misses.fetch_add(1, AtomicOrdering::Relaxed);
        profiling::cache_event("staged_cache_miss");
        let executable = Arc::new(self.compiler.compile(def)?);
        self.remember(key, &executable);
        cache::insert_shared(name, key, Arc::clone(&executable));
        Ok(executable)
    }

    fn remember(&self, key: u64, executable: &Arc<C::Executable>) {
        let mut executables = self.executables.lock().expect("staged cache poisoned");
        if let Some((evicted, _)) = executables.push(key, Arc::clone(executable)) {
            if evicted != key {
                profiling::cache_event("staged_cache_evict");
            }
        }
    }
}
