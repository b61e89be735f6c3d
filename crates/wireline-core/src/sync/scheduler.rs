//! Task scheduling with live-task tracking.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::task::{AbortHandle, JoinHandle};

use crate::lock;

struct Job {
    name: String,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct SchedulerInner {
    next_id: AtomicU64,
    jobs: Mutex<HashMap<u64, Job>>,
}

/// Thin wrapper over the runtime's spawner that keeps a set of live tasks.
///
/// Each job removes itself from the set when it finishes (or is aborted), so
/// [`Self::len`] reflects live work only. Clones share the same set.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` as a named job and track it until completion.
    pub fn start_job<F>(&self, future: F, name: impl Into<String>) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();

        lock(&self.inner.jobs).insert(id, Job { name: name.clone(), abort: None });

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            // Deregisters on completion AND on abort (the future is dropped
            // either way).
            let _guard = JobGuard { inner, id, name };
            future.await
        });

        // The job may already have finished; only record the abort handle if
        // the entry is still live.
        if let Some(job) = lock(&self.inner.jobs).get_mut(&id) {
            job.abort = Some(handle.abort_handle());
        }

        handle
    }

    /// Number of live jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.jobs).len()
    }

    /// True when no jobs are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every live job.
    pub fn shutdown(&self) {
        let jobs = std::mem::take(&mut *lock(&self.inner.jobs));
        for (_, job) in jobs {
            if let Some(abort) = job.abort {
                tracing::debug!(job = %job.name, "aborting job");
                abort.abort();
            }
        }
    }
}

struct JobGuard {
    inner: Arc<SchedulerInner>,
    id: u64,
    name: String,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if lock(&self.inner.jobs).remove(&self.id).is_some() {
            tracing::trace!(job = %self.name, "job finished");
        }
    }
}
