use chrono::Utc;
use jobs_core::{JobsError, JobsResult};
use jobs_domain::backend::ExecutionBackend;
use jobs_domain::entities::{Principal, Run, RunStatus};
use jobs_domain::repositories::{JobRepository, RunRepository};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::lifecycle::RunLifecycle;
use crate::renderer::TriggerMode;
use crate::scheduler::JobScheduler;

/// 作业运行状态统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatusSummary {
    pub queued: usize,
    pub running: usize,
    pub cancelling: usize,
    pub success: usize,
    pub failed: usize,
    pub warning: usize,
    pub cancelled: usize,
}

impl RunStatusSummary {
    pub fn total(&self) -> usize {
        self.active() + self.finished()
    }
    pub fn active(&self) -> usize {
        self.queued + self.running + self.cancelling
    }
    pub fn finished(&self) -> usize {
        self.success + self.failed + self.warning + self.cancelled
    }
}

/// 作业控制服务
///
/// 提供手动触发、取消运行与状态查询入口。
pub struct JobController {
    job_repo: Arc<dyn JobRepository>,
    run_repo: Arc<dyn RunRepository>,
    backend: Arc<dyn ExecutionBackend>,
    lifecycle: Arc<RunLifecycle>,
    scheduler: Arc<JobScheduler>,
    cancel_timeout: Duration,
}

impl JobController {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        run_repo: Arc<dyn RunRepository>,
        backend: Arc<dyn ExecutionBackend>,
        lifecycle: Arc<RunLifecycle>,
        scheduler: Arc<JobScheduler>,
        cancel_timeout: Duration,
    ) -> Self {
        Self {
            job_repo,
            run_repo,
            backend,
            lifecycle,
            scheduler,
            cancel_timeout,
        }
    }

    /// 手动触发一次作业运行
    ///
    /// 与定时触发走同一条渲染、创建、提交路径，但不影响作业的
    /// 上次评估时间。override_args存在时整体替换作业的参数模板。
    pub async fn trigger(
        &self,
        job_id: Uuid,
        override_args: Option<HashMap<String, String>>,
        principal: Principal,
    ) -> JobsResult<Run> {
        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or(JobsError::JobNotFound { id: job_id })?;
        if !job.is_active() {
            return Err(JobsError::JobInactive { id: job_id });
        }

        info!("{} 被 {} 手动触发", job.entity_description(), principal);
        self.scheduler
            .dispatch_job(&job, TriggerMode::Manual, principal, override_args, Utc::now())
            .await
    }

    /// 请求取消一次运行
    ///
    /// 即发即忘：请求被后端受理即返回，不等待最终的CANCELLED。
    /// 排队中的运行若被后端直接撤下则立即进入CANCELLED。
    pub async fn request_cancel(&self, run_id: Uuid) -> JobsResult<()> {
        let run = self
            .run_repo
            .find_by_id(run_id)
            .await?
            .ok_or(JobsError::RunNotFound { id: run_id })?;

        if run.status.is_terminal() {
            return Err(JobsError::Cancel(format!(
                "运行 {} 已处于终止状态 {}",
                run_id, run.status
            )));
        }
        if run.status == RunStatus::Cancelling {
            info!("运行 {} 已在取消中，忽略重复请求", run_id);
            return Ok(());
        }

        let backend_run_id = run
            .backend_run_id
            .clone()
            .ok_or_else(|| JobsError::Cancel(format!("运行 {} 尚未获得后端运行标识", run_id)))?;

        let outcome = match tokio::time::timeout(
            self.cancel_timeout,
            self.backend.request_cancel(&backend_run_id),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(JobsError::Cancel(format!(
                    "取消请求超时({}秒)",
                    self.cancel_timeout.as_secs()
                )))
            }
        };

        let updated = self
            .lifecycle
            .apply_cancellation(run_id, outcome, Utc::now())
            .await?;
        info!(
            "运行 {} 的取消请求已受理，当前状态: {}",
            run_id, updated.status
        );
        Ok(())
    }

    /// 统计作业各状态的运行数量
    pub async fn get_status_summary(&self, job_id: Uuid) -> JobsResult<RunStatusSummary> {
        let runs = self.run_repo.find_by_job_id(job_id).await?;
        let mut summary = RunStatusSummary::default();
        for run in runs {
            match run.status {
                RunStatus::Queued => summary.queued += 1,
                RunStatus::Running => summary.running += 1,
                RunStatus::Cancelling => summary.cancelling += 1,
                RunStatus::Success => summary.success += 1,
                RunStatus::Failed => summary.failed += 1,
                RunStatus::Warning => summary.warning += 1,
                RunStatus::Cancelled => summary.cancelled += 1,
            }
        }
        Ok(summary)
    }
}
