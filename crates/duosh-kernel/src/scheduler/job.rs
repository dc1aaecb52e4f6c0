//! Background job management for duosh.
//!
//! Provides the `JobManager` for tracking pipelines started with `&`. Each
//! job runs on its own task and keeps its captured output until someone
//! waits on it.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::interpreter::{ErrorCause, ExecResult, Exception};

/// Unique identifier for a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        })
    }
}

/// Information about a job for listing.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: JobId,
    /// Source text of the pipeline.
    pub command: String,
    pub status: JobStatus,
}

struct Job {
    command: String,
    handle: JoinHandle<()>,
    result: watch::Receiver<Option<ExecResult>>,
}

impl Job {
    fn status(&self) -> JobStatus {
        match &*self.result.borrow() {
            Some(r) if r.ok() => JobStatus::Done,
            Some(_) => JobStatus::Failed,
            // Finished without publishing: the task panicked.
            None if self.handle.is_finished() => JobStatus::Failed,
            None => JobStatus::Running,
        }
    }
}

/// Manager for background jobs.
pub struct JobManager {
    next_id: AtomicU64,
    jobs: Mutex<BTreeMap<JobId, Job>>,
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, BTreeMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn a new background job. The job is listed as soon as this
    /// returns.
    pub fn spawn<F>(&self, command: impl Into<String>, future: F) -> JobId
    where
        F: Future<Output = ExecResult> + Send + 'static,
    {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let result = future.await;
            tx.send_replace(Some(result));
        });
        self.jobs().insert(
            id,
            Job {
                command: command.into(),
                handle,
                result: rx,
            },
        );
        id
    }

    /// Wait for a specific job to complete. `None` for unknown ids.
    pub async fn wait(&self, id: JobId) -> Option<ExecResult> {
        let mut rx = self.jobs().get(&id)?.result.clone();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(r) => r.clone().unwrap_or_default(),
            Err(_) => ExecResult {
                exception: Some(Exception::new(ErrorCause::Io(format!(
                    "job {id} ended without a result"
                )))),
                ..ExecResult::default()
            },
        };
        Some(result)
    }

    /// Wait for every job known at the time of the call, in id order.
    pub async fn wait_all(&self) -> Vec<(JobId, ExecResult)> {
        let ids: Vec<JobId> = self.jobs().keys().copied().collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(result) = self.wait(id).await {
                results.push((id, result));
            }
        }
        results
    }

    /// List all jobs with their status.
    pub fn list(&self) -> Vec<JobInfo> {
        self.jobs()
            .iter()
            .map(|(id, job)| JobInfo {
                id: *id,
                command: job.command.clone(),
                status: job.status(),
            })
            .collect()
    }

    pub fn get(&self, id: JobId) -> Option<JobInfo> {
        self.jobs().get(&id).map(|job| JobInfo {
            id,
            command: job.command.clone(),
            status: job.status(),
        })
    }

    pub fn running_count(&self) -> usize {
        self.jobs()
            .values()
            .filter(|j| j.status() == JobStatus::Running)
            .count()
    }

    /// Stop tracking a job. The job itself keeps running if it has not
    /// finished.
    pub fn remove(&self, id: JobId) -> bool {
        self.jobs().remove(&id).is_some()
    }

    /// Forget finished jobs.
    pub fn cleanup(&self) {
        self.jobs().retain(|_, job| job.status() == JobStatus::Running);
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn spawned_job_is_listed_immediately() {
        let manager = JobManager::new();
        manager.spawn("sleep", async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ExecResult::default()
        });

        let jobs = manager.list();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].command, "sleep");
        assert_eq!(jobs[0].status, JobStatus::Running);
    }

    #[tokio::test]
    async fn wait_returns_captured_output() {
        let manager = JobManager::new();
        let id = manager.spawn("echo", async { ExecResult::success("done\n") });

        let result = manager.wait(id).await.expect("job exists");
        assert!(result.ok());
        assert_eq!(result.out, "done\n");
        assert_eq!(manager.get(id).map(|j| j.status), Some(JobStatus::Done));
    }

    #[tokio::test]
    async fn waiting_twice_yields_the_same_result() {
        let manager = JobManager::new();
        let id = manager.spawn("x", async { ExecResult::success("once") });
        let a = manager.wait(id).await.expect("first");
        let b = manager.wait(id).await.expect("second");
        assert_eq!(a.out, b.out);
    }

    #[tokio::test]
    async fn failed_job_reports_failed_status() {
        let manager = JobManager::new();
        let id = manager.spawn("fail", async {
            ExecResult {
                exception: Some(Exception::fail("bad")),
                ..ExecResult::default()
            }
        });
        let result = manager.wait(id).await.expect("job exists");
        assert!(!result.ok());
        assert_eq!(manager.get(id).map(|j| j.status), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn wait_all_in_id_order() {
        let manager = JobManager::new();
        let slow = manager.spawn("slow", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ExecResult::success("slow")
        });
        let fast = manager.spawn("fast", async { ExecResult::success("fast") });

        let results = manager.wait_all().await;
        let ids: Vec<JobId> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![slow, fast]);
    }

    #[tokio::test]
    async fn cleanup_drops_finished_jobs() {
        let manager = JobManager::new();
        let id = manager.spawn("quick", async { ExecResult::default() });
        manager.wait(id).await;
        manager.cleanup();
        assert!(manager.list().is_empty());
    }

    #[tokio::test]
    async fn removed_job_is_forgotten() {
        let manager = JobManager::new();
        let id = manager.spawn("x", async { ExecResult::default() });
        assert!(manager.remove(id));
        assert!(!manager.remove(id));
        assert!(manager.wait(id).await.is_none());
    }

    #[tokio::test]
    async fn unknown_job() {
        let manager = JobManager::new();
        assert!(manager.wait(JobId(999)).await.is_none());
    }
}
