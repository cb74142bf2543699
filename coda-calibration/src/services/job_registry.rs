//! Active job tracking
//!
//! Maps job ids to their cancellation tokens. An entry lives exactly as long
//! as the [`JobGuard`] returned by [`JobRegistry::register`], so a job that
//! finishes, fails or panics always leaves the registry.

use coda_common::events::JobId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    tokens: RwLock<HashMap<JobId, CancellationToken>>,
}

/// Registry of running jobs, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next job id (monotonic, starting at 1)
    pub fn next_id(&self) -> JobId {
        JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Allocate an id and register a fresh token for it
    pub fn register(&self) -> JobGuard {
        let id = self.next_id();
        let token = CancellationToken::new();
        self.inner
            .tokens
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, token.clone());
        tracing::debug!(job_id = %id, "Job registered");
        JobGuard {
            id,
            token,
            registry: self.clone(),
        }
    }

    /// Cancel a running job; false when the id is unknown
    pub fn cancel(&self, id: JobId) -> bool {
        let tokens = self.inner.tokens.read().unwrap_or_else(|e| e.into_inner());
        match tokens.get(&id) {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %id, "Job cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.inner
            .tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// Ids of registered jobs, ascending
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .inner
            .tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    /// Cancel every registered job
    pub fn cancel_all(&self) -> usize {
        let tokens = self.inner.tokens.read().unwrap_or_else(|e| e.into_inner());
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    fn remove(&self, id: JobId) {
        self.inner
            .tokens
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        tracing::debug!(job_id = %id, "Job deregistered");
    }
}

/// Registration handle; dropping it removes the job from the registry
#[derive(Debug)]
pub struct JobGuard {
    id: JobId,
    token: CancellationToken,
    registry: JobRegistry,
}

impl JobGuard {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let registry = JobRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert_eq!(a.id(), JobId(1));
        assert_eq!(b.id(), JobId(2));
        assert_eq!(registry.active_jobs(), vec![JobId(1), JobId(2)]);
    }

    #[test]
    fn test_cancel_known_and_unknown() {
        let registry = JobRegistry::new();
        let guard = registry.register();

        assert!(!registry.cancel(JobId(99)));
        assert!(!guard.token().is_cancelled());

        assert!(registry.cancel(guard.id()));
        assert!(guard.token().is_cancelled());
    }

    #[test]
    fn test_drop_removes_entry() {
        let registry = JobRegistry::new();
        let id = {
            let guard = registry.register();
            assert!(registry.contains(guard.id()));
            guard.id()
        };
        assert!(!registry.contains(id));
        assert!(!registry.cancel(id));
    }

    #[test]
    fn test_cancel_all() {
        let registry = JobRegistry::new();
        let a = registry.register();
        let b = registry.register();
        assert_eq!(registry.cancel_all(), 2);
        assert!(a.token().is_cancelled() && b.token().is_cancelled());
    }
}
