//! services/generator/src/orchestrator/active.rs
//!
//! The advisory "a job is running for this series" marker. Callers consult it
//! before queueing a background continuation; correctness still rests on the
//! deduplicator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct ActiveJobs {
    // Counted, because a continuation may start while a generation for the
    // same series is still winding down.
    inner: Arc<Mutex<HashMap<Uuid, usize>>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, usize>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks `series_id` active until the returned guard is dropped.
    pub fn mark(&self, series_id: Uuid) -> ActiveGuard {
        *self.lock().entry(series_id).or_insert(0) += 1;
        ActiveGuard {
            jobs: self.clone(),
            series_id,
        }
    }

    pub fn is_active(&self, series_id: Uuid) -> bool {
        self.lock().contains_key(&series_id)
    }

    fn release(&self, series_id: Uuid) {
        let mut jobs = self.lock();
        if let Some(count) = jobs.get_mut(&series_id) {
            *count -= 1;
            if *count == 0 {
                jobs.remove(&series_id);
            }
        }
    }
}

/// Clears the marker on drop, whether the job finished or failed.
pub struct ActiveGuard {
    jobs: ActiveJobs,
    series_id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.jobs.release(self.series_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_clears_when_guard_drops() {
        let jobs = ActiveJobs::new();
        let id = Uuid::new_v4();
        assert!(!jobs.is_active(id));
        {
            let _guard = jobs.mark(id);
            assert!(jobs.is_active(id));
            assert!(!jobs.is_active(Uuid::new_v4()));
        }
        assert!(!jobs.is_active(id));
    }

    #[test]
    fn test_overlapping_marks_are_counted() {
        let jobs = ActiveJobs::new();
        let id = Uuid::new_v4();
        let first = jobs.mark(id);
        let second = jobs.mark(id);
        drop(first);
        assert!(jobs.is_active(id));
        drop(second);
        assert!(!jobs.is_active(id));
    }
}
