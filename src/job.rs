//! Background job execution, one job at a time.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// Runs at most one job at a time on the tokio runtime.
#[derive(Clone)]
pub struct JobRunner {
    slot: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Start `job`, or fail with [`Error::JobAlreadyRunning`] if one is active.
    pub fn submit<F, T>(&self, name: impl Into<String>, job: F) -> Result<JobHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::JobAlreadyRunning)?;

        let id = Uuid::new_v4();
        let name = name.into();
        let started_at = Utc::now();
        info!("Starting job '{}' ({})", name, id);

        let job_name = name.clone();
        let task = tokio::spawn(async move {
            let output = job.await;
            let elapsed = Utc::now() - started_at;
            info!(
                "Job '{}' ({}) finished in {}ms",
                job_name,
                id,
                elapsed.num_milliseconds()
            );
            drop(permit);
            output
        });

        Ok(JobHandle {
            id,
            name,
            started_at,
            task,
        })
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    pub id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    task: JoinHandle<T>,
}

impl<T> JobHandle<T> {
    /// Wait for the job to finish and return its output.
    pub async fn wait(self) -> Result<T> {
        let id = self.id;
        self.task
            .await
            .map_err(|e| Error::Invariant(format!("Job {} did not complete: {}", id, e)))
    }
}
