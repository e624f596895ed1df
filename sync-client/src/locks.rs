//! Per-run locks.
//!
//! Save, delete, reconciliation and workers lock the run id they touch, so
//! operations on one run never interleave while different runs proceed in
//! parallel. The registry also remembers which local ids were replaced by
//! remote ids, so an operation that waited on a local id can follow the run
//! to its new id.

use dashmap::DashMap;
use std::sync::Arc;
use stride_sync_types::RunId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of async locks keyed by run id.
#[derive(Debug, Clone, Default)]
pub struct RunLocks {
    locks: Arc<DashMap<RunId, Arc<Mutex<()>>>>,
    renamed: Arc<DashMap<RunId, RunId>>,
}

impl RunLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &RunId) -> RunLockGuard {
        let mutex = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;

        RunLockGuard {
            id: id.clone(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Record that the run stored as `old` now lives under `new`.
    ///
    /// Call while holding the lock on `old`.
    pub fn record_rename(&self, old: &RunId, new: &RunId) {
        if old != new {
            self.renamed.insert(old.clone(), new.clone());
        }
    }

    /// The id the run once stored as `id` lives under now, if it moved.
    pub fn renamed(&self, id: &RunId) -> Option<RunId> {
        self.renamed.get(id).map(|entry| entry.value().clone())
    }
}

/// Exclusive access to one run id. Released on drop.
#[derive(Debug)]
pub struct RunLockGuard {
    id: RunId,
    locks: Arc<DashMap<RunId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Map entry plus nobody else: drop the entry
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_id_is_exclusive() {
        let locks = RunLocks::new();
        let id = RunId::from("r1");

        let guard = locks.lock(&id).await;
        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = RunLocks::new();
        let _a = locks.lock(&RunId::from("a")).await;
        let _b = locks.lock(&RunId::from("b")).await;
        assert_eq!(locks.locks.len(), 2);
    }

    #[tokio::test]
    async fn renames_are_shared_between_clones() {
        let locks = RunLocks::new();
        let clone = locks.clone();

        clone.record_rename(&RunId::from("local-1"), &RunId::from("remote-1"));
        clone.record_rename(&RunId::from("same"), &RunId::from("same"));

        assert_eq!(locks.renamed(&RunId::from("local-1")), Some(RunId::from("remote-1")));
        assert_eq!(locks.renamed(&RunId::from("same")), None);
        assert_eq!(locks.renamed(&RunId::from("remote-1")), None);
    }

    #[tokio::test]
    async fn entries_are_cleaned_up() {
        let locks = RunLocks::new();
        {
            let _guard = locks.lock(&RunId::from("r1")).await;
        }
        assert!(locks.locks.is_empty());
    }
}
