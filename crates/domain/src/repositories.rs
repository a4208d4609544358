//! 领域仓储抽象
//!
//! 定义作业与运行实例的数据访问接口，遵循依赖倒置原则

use crate::entities::{Job, Run};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobs_core::JobsResult;
use uuid::Uuid;

/// 作业仓储抽象
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> JobsResult<Job>;
    async fn find_by_id(&self, id: Uuid) -> JobsResult<Option<Job>>;
    async fn find_all(&self) -> JobsResult<Vec<Job>>;
    async fn find_active(&self) -> JobsResult<Vec<Job>>;
    async fn update(&self, job: &Job) -> JobsResult<Job>;
    async fn update_last_evaluated(&self, id: Uuid, at: DateTime<Utc>) -> JobsResult<()>;
    async fn delete(&self, id: Uuid) -> JobsResult<bool>;
}

/// 运行实例仓储抽象
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: &Run) -> JobsResult<Run>;
    async fn find_by_id(&self, id: Uuid) -> JobsResult<Option<Run>>;
    async fn find_by_backend_run_id(&self, backend_run_id: &str) -> JobsResult<Option<Run>>;
    async fn find_by_job_id(&self, job_id: Uuid) -> JobsResult<Vec<Run>>;
    async fn find_latest_by_job_id(&self, job_id: Uuid) -> JobsResult<Option<Run>>;
    async fn find_active(&self) -> JobsResult<Vec<Run>>;
    async fn update(&self, run: &Run) -> JobsResult<Run>;
}
