//! Job dispatchers for tests

use async_trait::async_trait;
use speval_orch::dispatch::{DispatchError, JobDispatcher};
use speval_orch::models::{JobArgs, JobHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Records every enqueued job instead of running it
#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<JobArgs>>,
    reject: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every job from now on
    pub fn reject_all(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    pub fn jobs(&self) -> Vec<JobArgs> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.jobs.lock().unwrap().clear();
    }

    pub fn summary_jobs(&self) -> usize {
        self.jobs()
            .iter()
            .filter(|j| matches!(j, JobArgs::FinalSummary { .. }))
            .count()
    }

    pub fn component_jobs(&self) -> usize {
        self.jobs().iter().filter(|j| j.component_id().is_some()).count()
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn enqueue(&self, job: JobArgs) -> Result<JobHandle, DispatchError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected("test dispatcher rejects jobs".to_string()));
        }
        let handle = JobHandle::for_job(&job);
        self.jobs.lock().unwrap().push(job);
        Ok(handle)
    }
}
