//! Mock implementations for the repository, backend and event traits
//!
//! This module provides in-memory mock implementations that can be used
//! for unit testing without wiring up real storage or an execution
//! backend. The execution backend mock is scriptable: tests can make
//! submissions fail, choose the cancellation outcome and enqueue status
//! notifications to be picked up by the next poll.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobs_core::{JobsError, JobsResult};
use jobs_domain::backend::{CancelOutcome, ExecutionBackend, StatusNotification};
use jobs_domain::entities::{Job, Run};
use jobs_domain::events::{RunEventSink, RunStatusChanged};
use jobs_domain::repositories::{JobRepository, RunRepository};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Mock implementation of JobRepository for testing
#[derive(Debug, Clone)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let mut job_map = HashMap::new();
        for job in jobs {
            job_map.insert(job.id, job);
        }
        Self {
            jobs: Arc::new(Mutex::new(job_map)),
        }
    }

    pub fn clear(&self) {
        self.jobs.lock().unwrap().clear();
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn get_all_jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }
}

impl Default for MockJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &Job) -> JobsResult<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> JobsResult<Option<Job>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.get(&id).cloned())
    }

    async fn find_all(&self) -> JobsResult<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.values().cloned().collect())
    }

    async fn find_active(&self) -> JobsResult<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.values().filter(|j| j.active).cloned().collect())
    }

    async fn update(&self, job: &Job) -> JobsResult<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn update_last_evaluated(&self, id: Uuid, at: DateTime<Utc>) -> JobsResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) => {
                job.last_evaluated_at = Some(at);
                Ok(())
            }
            None => Err(JobsError::JobNotFound { id }),
        }
    }

    async fn delete(&self, id: Uuid) -> JobsResult<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        Ok(jobs.remove(&id).is_some())
    }
}

/// Mock implementation of RunRepository for testing
#[derive(Debug, Clone)]
pub struct MockRunRepository {
    runs: Arc<Mutex<HashMap<Uuid, Run>>>,
}

impl MockRunRepository {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_runs(runs: Vec<Run>) -> Self {
        let mut run_map = HashMap::new();
        for run in runs {
            run_map.insert(run.id, run);
        }
        Self {
            runs: Arc::new(Mutex::new(run_map)),
        }
    }

    pub fn count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn get_all_runs(&self) -> Vec<Run> {
        self.runs.lock().unwrap().values().cloned().collect()
    }
}

impl Default for MockRunRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunRepository for MockRunRepository {
    async fn create(&self, run: &Run) -> JobsResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        runs.insert(run.id, run.clone());
        Ok(run.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> JobsResult<Option<Run>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.get(&id).cloned())
    }

    async fn find_by_backend_run_id(&self, backend_run_id: &str) -> JobsResult<Option<Run>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .values()
            .find(|r| r.backend_run_id.as_deref() == Some(backend_run_id))
            .cloned())
    }

    async fn find_by_job_id(&self, job_id: Uuid) -> JobsResult<Vec<Run>> {
        let runs = self.runs.lock().unwrap();
        let mut matched: Vec<Run> = runs
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.created_at);
        Ok(matched)
    }

    async fn find_latest_by_job_id(&self, job_id: Uuid) -> JobsResult<Option<Run>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .values()
            .filter(|r| r.job_id == job_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn find_active(&self) -> JobsResult<Vec<Run>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn update(&self, run: &Run) -> JobsResult<Run> {
        let mut runs = self.runs.lock().unwrap();
        if !runs.contains_key(&run.id) {
            return Err(JobsError::RunNotFound { id: run.id });
        }
        runs.insert(run.id, run.clone());
        Ok(run.clone())
    }
}

/// A submission recorded by [`MockExecutionBackend`]
#[derive(Debug, Clone)]
pub struct SubmittedRun {
    pub backend_run_id: String,
    pub queue: String,
    pub task: String,
    pub args: serde_json::Value,
}

/// Scriptable mock of the execution backend
#[derive(Clone)]
pub struct MockExecutionBackend {
    submitted: Arc<Mutex<Vec<SubmittedRun>>>,
    cancel_requests: Arc<Mutex<Vec<String>>>,
    notifications: Arc<Mutex<Vec<StatusNotification>>>,
    fail_submissions: Arc<Mutex<bool>>,
    fail_cancels: Arc<Mutex<bool>>,
    cancel_outcome: Arc<Mutex<CancelOutcome>>,
    next_backend_id: Arc<Mutex<i64>>,
}

impl MockExecutionBackend {
    pub fn new() -> Self {
        Self {
            submitted: Arc::new(Mutex::new(Vec::new())),
            cancel_requests: Arc::new(Mutex::new(Vec::new())),
            notifications: Arc::new(Mutex::new(Vec::new())),
            fail_submissions: Arc::new(Mutex::new(false)),
            fail_cancels: Arc::new(Mutex::new(false)),
            cancel_outcome: Arc::new(Mutex::new(CancelOutcome::Signalled)),
            next_backend_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Make every subsequent submit call fail
    pub fn fail_submissions(&self, fail: bool) {
        *self.fail_submissions.lock().unwrap() = fail;
    }

    /// Make every subsequent cancel call fail
    pub fn fail_cancels(&self, fail: bool) {
        *self.fail_cancels.lock().unwrap() = fail;
    }

    /// Choose the outcome returned by accepted cancel requests
    pub fn set_cancel_outcome(&self, outcome: CancelOutcome) {
        *self.cancel_outcome.lock().unwrap() = outcome;
    }

    /// Queue a notification to be returned by the next poll
    pub fn push_notification(&self, notification: StatusNotification) {
        self.notifications.lock().unwrap().push(notification);
    }

    pub fn submitted_runs(&self) -> Vec<SubmittedRun> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn cancel_requests(&self) -> Vec<String> {
        self.cancel_requests.lock().unwrap().clone()
    }
}

impl Default for MockExecutionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionBackend for MockExecutionBackend {
    async fn submit(&self, queue: &str, task: &str, args: &serde_json::Value) -> JobsResult<String> {
        if *self.fail_submissions.lock().unwrap() {
            return Err(JobsError::Submission(
                "submission rejected by mock backend".to_string(),
            ));
        }
        let mut next_id = self.next_backend_id.lock().unwrap();
        let backend_run_id = format!("backend-{}", *next_id);
        *next_id += 1;

        self.submitted.lock().unwrap().push(SubmittedRun {
            backend_run_id: backend_run_id.clone(),
            queue: queue.to_string(),
            task: task.to_string(),
            args: args.clone(),
        });
        Ok(backend_run_id)
    }

    async fn request_cancel(&self, backend_run_id: &str) -> JobsResult<CancelOutcome> {
        self.cancel_requests
            .lock()
            .unwrap()
            .push(backend_run_id.to_string());
        if *self.fail_cancels.lock().unwrap() {
            return Err(JobsError::Cancel(
                "cancel rejected by mock backend".to_string(),
            ));
        }
        Ok(*self.cancel_outcome.lock().unwrap())
    }

    async fn poll_status_updates(&self) -> JobsResult<Vec<StatusNotification>> {
        let mut notifications = self.notifications.lock().unwrap();
        Ok(std::mem::take(&mut *notifications))
    }
}

/// Event sink that records every published event
#[derive(Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<RunStatusChanged>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunStatusChanged> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl RunEventSink for RecordingEventSink {
    async fn publish(&self, event: RunStatusChanged) -> JobsResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
