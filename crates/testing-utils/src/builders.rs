//! Test data builders
//!
//! Fluent builders for constructing jobs and runs in tests without
//! repeating the full entity literal every time.

use chrono::{DateTime, Utc};
use jobs_domain::entities::{
    CrontabSchedule, IntervalSchedule, Job, Principal, Run, RunStatus, Schedule,
};
use uuid::Uuid;

/// Builder for creating test jobs
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            job: Job::new("test_job".to_string(), "test_task".to_string()),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.job.name = name.to_string();
        self
    }

    pub fn with_task(mut self, task: &str) -> Self {
        self.job.task = task.to_string();
        self
    }

    pub fn with_queue(mut self, queue: &str) -> Self {
        self.job.default_queue = Some(queue.to_string());
        self
    }

    pub fn with_interval_seconds(mut self, seconds: i64) -> Self {
        self.job.schedule = Some(Schedule::interval(IntervalSchedule::from_seconds(seconds)));
        self
    }

    pub fn with_interval(mut self, interval: IntervalSchedule) -> Self {
        self.job.schedule = Some(Schedule::interval(interval));
        self
    }

    pub fn with_crontab(mut self, expr: &str) -> Self {
        let crontab = CrontabSchedule::parse(expr).expect("invalid crontab expression in test");
        self.job.schedule = Some(Schedule::crontab(crontab));
        self
    }

    /// Disable the schedule set by a previous `with_*` call
    pub fn with_disabled_schedule(mut self) -> Self {
        if let Some(schedule) = self.job.schedule.as_mut() {
            schedule.enabled = false;
        }
        self
    }

    pub fn with_arg(mut self, key: &str, template: &str) -> Self {
        self.job
            .args_template
            .insert(key.to_string(), template.to_string());
        self
    }

    pub fn with_args(mut self, args: &[(&str, &str)]) -> Self {
        for (key, template) in args {
            self.job
                .args_template
                .insert(key.to_string(), template.to_string());
        }
        self
    }

    pub fn with_last_evaluated_at(mut self, at: DateTime<Utc>) -> Self {
        self.job.last_evaluated_at = Some(at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.job.active = false;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test runs
pub struct RunBuilder {
    run: Run,
}

impl RunBuilder {
    pub fn new() -> Self {
        Self {
            run: Run::new(
                Uuid::new_v4(),
                "Manual run".to_string(),
                "default".to_string(),
                serde_json::json!({}),
                Principal::System,
                Utc::now(),
            ),
        }
    }

    pub fn with_job_id(mut self, job_id: Uuid) -> Self {
        self.run.job_id = job_id;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.run.title = title.to_string();
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.run.status = status;
        self
    }

    pub fn with_backend_run_id(mut self, backend_run_id: &str) -> Self {
        self.run.backend_run_id = Some(backend_run_id.to_string());
        self
    }

    pub fn with_started_by(mut self, started_by: Principal) -> Self {
        self.run.started_by = started_by;
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.run.created_at = at;
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.run.started_at = Some(at);
        self
    }

    pub fn with_finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.run.finished_at = Some(at);
        self
    }

    /// Shortcut for a run that is executing on the backend
    pub fn running(mut self, backend_run_id: &str) -> Self {
        self.run.status = RunStatus::Running;
        self.run.backend_run_id = Some(backend_run_id.to_string());
        self.run.started_at = Some(Utc::now());
        self
    }

    pub fn build(self) -> Run {
        self.run
    }
}

impl Default for RunBuilder {
    fn default() -> Self {
        Self::new()
    }
}
