//! Process-wide cache of inference results.
//!
//! Results are keyed by declaration and workspace epoch; a lookup under a
//! newer epoch misses and the caller recomputes. Computations in progress are
//! tracked per thread so a computation that re-enters itself fails instead
//! of waiting on itself.

use std::sync::Arc;
use std::thread::ThreadId;

use dashmap::{DashMap, DashSet};
use ferrite_hir::DefId;
use ferrite_syntax::Cancelled;
use thiserror::Error;
use tracing::{debug, trace};

use crate::result::InferenceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("inference of {def:?} depends on itself")]
pub struct CycleError {
    pub def: DefId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("{0:?} has no body")]
    NoBody(DefId),
}

#[derive(Debug, Default)]
pub struct InferenceCache {
    results: DashMap<(DefId, u64), Arc<InferenceResult>>,
    in_flight: DashSet<(DefId, u64, ThreadId)>,
}

impl InferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, def: DefId, epoch: u64) -> Option<Arc<InferenceResult>> {
        let hit = self.results.get(&(def, epoch)).map(|entry| Arc::clone(entry.value()));
        trace!(?def, epoch, hit = hit.is_some(), "inference cache lookup");
        hit
    }

    pub fn insert(&self, def: DefId, epoch: u64, result: Arc<InferenceResult>) {
        self.results.insert((def, epoch), result);
    }

    /// Mark `def` as being computed on this thread. The mark is removed when
    /// the guard drops, whether the computation finished or not.
    pub fn begin(&self, def: DefId, epoch: u64) -> Result<InFlightGuard<'_>, CycleError> {
        let key = (def, epoch, std::thread::current().id());
        if !self.in_flight.insert(key) {
            debug!(?def, epoch, "inference re-entered itself");
            return Err(CycleError { def });
        }
        Ok(InFlightGuard { cache: self, key })
    }

    pub fn is_in_flight(&self, def: DefId, epoch: u64) -> bool {
        self.in_flight
            .contains(&(def, epoch, std::thread::current().id()))
    }

    /// Drop results computed under epochs older than `epoch`
    pub fn evict_stale(&self, epoch: u64) -> usize {
        let before = self.results.len();
        self.results.retain(|(_, e), _| *e >= epoch);
        let evicted = before - self.results.len();
        if evicted > 0 {
            debug!(evicted, epoch, "stale inference results evicted");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&self) {
        self.results.clear();
    }
}

/// Removes its in-flight mark on drop
pub struct InFlightGuard<'a> {
    cache: &'a InferenceCache,
    key: (DefId, u64, ThreadId),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.cache.in_flight.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_db::{TestDb, def_named};
    use ferrite_ast::make;

    fn some_def() -> DefId {
        let db = TestDb::new()
            .krate("app", vec![make::func("f", Vec::new(), None, None).into()])
            .build();
        def_named(db.hir(), "f")
    }

    #[test]
    fn test_reentrant_begin_fails_until_guard_drops() {
        let cache = InferenceCache::new();
        let def = some_def();
        let guard = cache.begin(def, 1).unwrap();
        assert!(cache.is_in_flight(def, 1));
        assert_eq!(cache.begin(def, 1).err(), Some(CycleError { def }));
        // another epoch is a different computation
        assert!(cache.begin(def, 2).is_ok());
        drop(guard);
        assert!(!cache.is_in_flight(def, 1));
        assert!(cache.begin(def, 1).is_ok());
    }

    #[test]
    fn test_other_threads_are_not_cycles() {
        let cache = InferenceCache::new();
        let def = some_def();
        let _guard = cache.begin(def, 0).unwrap();
        std::thread::scope(|s| {
            s.spawn(|| assert!(cache.begin(def, 0).is_ok()));
        });
    }

    #[test]
    fn test_epochs_and_eviction() {
        let cache = InferenceCache::new();
        let def = some_def();
        cache.insert(def, 1, Arc::new(InferenceResult::default()));
        assert!(cache.get(def, 1).is_some());
        assert!(cache.get(def, 2).is_none());
        cache.insert(def, 2, Arc::new(InferenceResult::default()));
        assert_eq!(cache.evict_stale(2), 1);
        assert_eq!(cache.len(), 1);
    }
}
