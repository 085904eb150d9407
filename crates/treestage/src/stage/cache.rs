//! Process-wide executable cache shared across staged functions.
//!
//! Avoids recompiling when a fresh [`StagedFn`](super::StagedFn) is built
//! for a compiler/definition pair some earlier instance already compiled,
//! which matters for workloads that construct staged functions repeatedly.

use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use once_cell::sync::Lazy;

use crate::profiling;

const SHARED_CACHE_CAPACITY: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash)]
struct SharedKey {
    compiler: String,
    fingerprint: u64,
}

static SHARED_EXECUTABLES: Lazy<Mutex<LruCache<SharedKey, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(SHARED_CACHE_CAPACITY).expect("shared cache capacity is non-zero"),
        ))
    });

pub(super) fn get_shared<E: Send + Sync + 'static>(
    compiler: &str,
    fingerprint: u64,
) -> Option<Arc<E>> {
    let key = SharedKey {
        compiler: compiler.to_string(),
        fingerprint,
    };
    let mut cache = SHARED_EXECUTABLES
        .lock()
        .expect("shared executable cache poisoned");
    cache
        .get(&key)
        .and_then(|entry| Arc::clone(entry).downcast::<E>().ok())
}

pub(super) fn insert_shared<E: Send + Sync + 'static>(
    compiler: &str,
    fingerprint: u64,
    executable: Arc<E>,
) {
    let key = SharedKey {
        compiler: compiler.to_string(),
        fingerprint,
    };
    let erased: Arc<dyn Any + Send + Sync> = executable;
    let mut cache = SHARED_EXECUTABLES
        .lock()
        .expect("shared executable cache poisoned");
    if let Some((evicted, _)) = cache.push(key.clone(), erased) {
        if evicted != key {
            profiling::cache_event("shared_executable_evict");
        }
    }
}
