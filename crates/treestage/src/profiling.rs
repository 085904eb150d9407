//! Cache-event counters for staging internals.
//!
//! Counting is compiled out unless the `profiler` feature is enabled, so the
//! hooks below are free in production builds.

#[cfg(feature = "profiler")]
use std::collections::HashMap;
#[cfg(feature = "profiler")]
use std::sync::{Mutex, OnceLock};

#[cfg(feature = "profiler")]
struct Counters {
    events: Mutex<HashMap<&'static str, u64>>,
}

#[cfg(feature = "profiler")]
impl Counters {
    fn instance() -> &'static Self {
        static INSTANCE: OnceLock<Counters> = OnceLock::new();
        INSTANCE.get_or_init(|| Counters {
            events: Mutex::new(HashMap::new()),
        })
    }
}

/// Records a named cache event. No-op unless the `profiler` feature is on.
pub fn cache_event(name: &'static str) {
    #[cfg(feature = "profiler")]
    {
        let mut events = Counters::instance()
            .events
            .lock()
            .expect("profiler counters poisoned");
        *events.entry(name).or_insert(0) += 1;
    }
    #[cfg(not(feature = "profiler"))]
    let _ = name;
}

/// Snapshot of all recorded cache events, sorted by name.
#[cfg(feature = "profiler")]
pub fn cache_counters() -> Vec<(&'static str, u64)> {
    let events = Counters::instance()
        .events
        .lock()
        .expect("profiler counters poisoned");
    let mut snapshot: Vec<(&'static str, u64)> =
        events.iter().map(|(name, count)| (*name, *count)).collect();
    snapshot.sort_by_key(|(name, _)| *name);
    snapshot
}

#[cfg(feature = "profiler")]
pub fn reset_cache_counters() {
    Counters::instance()
        .events
        .lock()
        .expect("profiler counters poisoned")
        .clear();
}
