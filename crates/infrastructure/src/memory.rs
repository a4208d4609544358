use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobs_core::{JobsError, JobsResult};
use jobs_domain::entities::{Job, Run};
use jobs_domain::repositories::{JobRepository, RunRepository};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 内存作业仓储实现
///
/// 使用RwLock保护的HashMap存储作业，适用于嵌入式部署场景。
/// 创建与更新时执行作业校验。
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    /// 作业存储：作业ID -> 作业
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &Job) -> JobsResult<Job> {
        job.validate()?;
        let mut jobs = self.jobs.write().await;
        if jobs.values().any(|j| j.name == job.name) {
            return Err(JobsError::InvalidJob(format!(
                "作业名称已存在: {}",
                job.name
            )));
        }
        jobs.insert(job.id, job.clone());
        debug!("已保存{}", job.entity_description());
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> JobsResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn find_all(&self) -> JobsResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn find_active(&self) -> JobsResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut active: Vec<Job> = jobs.values().filter(|j| j.active).cloned().collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn update(&self, job: &Job) -> JobsResult<Job> {
        job.validate()?;
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(JobsError::JobNotFound { id: job.id });
        }
        let mut updated = job.clone();
        updated.updated_at = Utc::now();
        jobs.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn update_last_evaluated(&self, id: Uuid, at: DateTime<Utc>) -> JobsResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobsError::JobNotFound { id })?;
        job.last_evaluated_at = Some(at);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> JobsResult<bool> {
        let mut jobs = self.jobs.write().await;
        Ok(jobs.remove(&id).is_some())
    }
}

/// 内存运行实例仓储实现
#[derive(Debug, Default)]
pub struct InMemoryRunRepository {
    /// 运行存储：运行ID -> 运行实例
    runs: Arc<RwLock<HashMap<Uuid, Run>>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn create(&self, run: &Run) -> JobsResult<Run> {
        let mut runs = self.runs.write().await;
        runs.insert(run.id, run.clone());
        debug!("已保存{}", run.entity_description());
        Ok(run.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> JobsResult<Option<Run>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&id).cloned())
    }

    async fn find_by_backend_run_id(&self, backend_run_id: &str) -> JobsResult<Option<Run>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .find(|r| r.backend_run_id.as_deref() == Some(backend_run_id))
            .cloned())
    }

    async fn find_by_job_id(&self, job_id: Uuid) -> JobsResult<Vec<Run>> {
        let runs = self.runs.read().await;
        let mut matched: Vec<Run> = runs
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn find_latest_by_job_id(&self, job_id: Uuid) -> JobsResult<Option<Run>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .filter(|r| r.job_id == job_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn find_active(&self) -> JobsResult<Vec<Run>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn update(&self, run: &Run) -> JobsResult<Run> {
        let mut runs = self.runs.write().await;
        if !runs.contains_key(&run.id) {
            return Err(JobsError::RunNotFound { id: run.id });
        }
        runs.insert(run.id, run.clone());
        Ok(run.clone())
    }
}
