use chrono::{DateTime, Utc};
use jobs_core::{JobsError, JobsResult};
use jobs_domain::backend::ExecutionBackend;
use jobs_domain::entities::{Job, Principal, Run, RunStatus};
use jobs_domain::repositories::{JobRepository, RunRepository};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::evaluator::ScheduleEvaluator;
use crate::lifecycle::RunLifecycle;
use crate::renderer::{ArgsRenderer, RenderContext, TriggerMode};

/// 作业调度器
///
/// 周期性扫描激活的作业，对到期的作业渲染参数、创建运行实例并
/// 提交到执行后端。单轮扫描内作业按顺序处理，同一作业不会并发派发。
pub struct JobScheduler {
    job_repo: Arc<dyn JobRepository>,
    run_repo: Arc<dyn RunRepository>,
    backend: Arc<dyn ExecutionBackend>,
    lifecycle: Arc<RunLifecycle>,
    evaluator: ScheduleEvaluator,
    renderer: ArgsRenderer,
    pub default_queue: String,
    submit_timeout: Duration,
}

impl JobScheduler {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        run_repo: Arc<dyn RunRepository>,
        backend: Arc<dyn ExecutionBackend>,
        lifecycle: Arc<RunLifecycle>,
        default_queue: String,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            job_repo,
            run_repo,
            backend,
            lifecycle,
            evaluator: ScheduleEvaluator::new(),
            renderer: ArgsRenderer::new(),
            default_queue,
            submit_timeout,
        }
    }

    /// 执行一轮扫描，返回本轮派发的运行实例
    pub async fn scan_cycle(&self) -> JobsResult<Vec<Run>> {
        self.scan_cycle_at(Utc::now()).await
    }

    /// 以指定时间执行一轮扫描
    pub async fn scan_cycle_at(&self, now: DateTime<Utc>) -> JobsResult<Vec<Run>> {
        debug!("开始扫描待调度的作业");
        let jobs = self.job_repo.find_active().await?;
        let mut dispatched = Vec::new();

        for job in jobs {
            match self.schedule_job_if_due(&job, now).await {
                Ok(Some(run)) => {
                    info!("作业 {} 触发运行 {}", job.name, run.id);
                    dispatched.push(run);
                }
                Ok(None) => {}
                Err(e) => {
                    // 单个作业出错不影响本轮其余作业
                    error!("调度作业 {} 失败: {}", job.name, e);
                }
            }
        }

        info!("本轮扫描完成，共派发 {} 个运行", dispatched.len());
        Ok(dispatched)
    }

    async fn schedule_job_if_due(
        &self,
        job: &Job,
        now: DateTime<Utc>,
    ) -> JobsResult<Option<Run>> {
        if !self.evaluator.is_due(job, now)? {
            return Ok(None);
        }

        // 无论派发结果如何都推进评估时间，失败的作业等待下个周期而不是
        // 在每轮扫描中立即重试
        let result = self
            .dispatch_job(job, TriggerMode::Scheduled, Principal::System, None, now)
            .await;
        self.job_repo.update_last_evaluated(job.id, now).await?;
        result.map(Some)
    }

    /// 为作业派发一次运行
    ///
    /// 渲染失败时不创建任何运行记录；提交失败时运行记录被标记为
    /// FAILED并在message中保留原因。
    pub async fn dispatch_job(
        &self,
        job: &Job,
        trigger: TriggerMode,
        principal: Principal,
        override_args: Option<HashMap<String, String>>,
        now: DateTime<Utc>,
    ) -> JobsResult<Run> {
        let mut context = RenderContext::new(job, trigger, principal.clone(), now);
        if let Some(last_run) = self.run_repo.find_latest_by_job_id(job.id).await? {
            context = context.with_last_run(&last_run);
        }
        let templates = override_args.as_ref().unwrap_or(&job.args_template);
        let args = self.renderer.render(templates, &context)?;

        let queue = job
            .default_queue
            .clone()
            .unwrap_or_else(|| self.default_queue.clone());
        let run = self
            .lifecycle
            .create_run(
                job,
                trigger.run_title().to_string(),
                queue.clone(),
                args,
                principal,
                now,
            )
            .await?;

        match tokio::time::timeout(
            self.submit_timeout,
            self.backend.submit(&queue, &job.task, &run.args),
        )
        .await
        {
            Ok(Ok(backend_run_id)) => {
                let updated = self
                    .lifecycle
                    .record_submission(run.id, &backend_run_id)
                    .await?;
                info!(
                    "作业 {} 已派发运行 {} (后端标识: {})",
                    job.name, run.id, backend_run_id
                );
                Ok(updated)
            }
            Ok(Err(e)) => {
                self.fail_submission(&run, format!("执行后端拒绝提交: {e}"), now)
                    .await
            }
            Err(_) => {
                self.fail_submission(
                    &run,
                    format!("提交执行后端超时({}秒)", self.submit_timeout.as_secs()),
                    now,
                )
                .await
            }
        }
    }

    async fn fail_submission(
        &self,
        run: &Run,
        cause: String,
        now: DateTime<Utc>,
    ) -> JobsResult<Run> {
        warn!("运行 {} 提交失败: {}", run.id, cause);
        if let Err(e) = self
            .lifecycle
            .transition(run.id, RunStatus::Failed, now, Some(cause.clone()))
            .await
        {
            error!("标记运行 {} 为失败状态时出错: {}", run.id, e);
        }
        Err(JobsError::Submission(cause))
    }
}
