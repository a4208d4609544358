use chrono::{DateTime, Utc};
use jobs_core::{JobsError, JobsResult};
use jobs_domain::backend::CancelOutcome;
use jobs_domain::entities::{Job, Principal, Run, RunStatus};
use jobs_domain::events::{RunEventSink, RunStatusChanged};
use jobs_domain::repositories::RunRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 检查运行状态流转是否合法
///
/// 终止状态不允许再流转，非终止状态允许幂等的自转。
pub fn is_valid_status_transition(from: RunStatus, to: RunStatus) -> bool {
    use RunStatus::*;
    if from.is_terminal() {
        return false;
    }
    match (from, to) {
        (Queued, Running) => true,
        (Queued, Failed) => true, // 提交失败直接标记失败
        (Queued, Cancelling) => true,
        (Queued, Cancelled) => true, // 开始前被后端撤下
        (Running, Success) => true,
        (Running, Failed) => true,
        (Running, Warning) => true,
        (Running, Cancelling) => true,
        (Cancelling, Cancelled) => true,
        (Cancelling, Success) => true, // 自然完成先于取消生效
        (Cancelling, Failed) => true,
        (Cancelling, Warning) => true,
        (status1, status2) if status1 == status2 => true,
        _ => false,
    }
}

/// 运行实例生命周期管理
///
/// 所有状态写入都经过这里，按运行实例加锁，保证读、校验、写的原子性。
pub struct RunLifecycle {
    run_repo: Arc<dyn RunRepository>,
    event_sink: Arc<dyn RunEventSink>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RunLifecycle {
    pub fn new(run_repo: Arc<dyn RunRepository>, event_sink: Arc<dyn RunEventSink>) -> Self {
        Self {
            run_repo,
            event_sink,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 创建一个排队中的运行实例并发布创建事件
    pub async fn create_run(
        &self,
        job: &Job,
        title: String,
        queue: String,
        args: serde_json::Value,
        started_by: Principal,
        at: DateTime<Utc>,
    ) -> JobsResult<Run> {
        let run = Run::new(job.id, title, queue, args, started_by, at);
        let created = self.run_repo.create(&run).await?;
        debug!("已创建{}", created.entity_description());
        self.publish_event(RunStatusChanged::new(&created, None, at))
            .await;
        Ok(created)
    }

    /// 应用一次状态流转
    ///
    /// 非法流转返回InvalidTransition，由调用方决定如何上报。
    pub async fn transition(
        &self,
        run_id: Uuid,
        new_status: RunStatus,
        at: DateTime<Utc>,
        message: Option<String>,
    ) -> JobsResult<Run> {
        let lock = self.entry_lock(run_id).await;
        let _guard = lock.lock().await;

        let mut run = self
            .run_repo
            .find_by_id(run_id)
            .await?
            .ok_or(JobsError::RunNotFound { id: run_id })?;
        let old_status = run.status;

        if old_status.is_terminal() {
            return Err(JobsError::InvalidTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }
        if old_status == new_status {
            debug!("运行 {} 已处于状态 {}，忽略重复流转", run_id, new_status);
            return Ok(run);
        }
        if !is_valid_status_transition(old_status, new_status) {
            return Err(JobsError::InvalidTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        run.apply_status(new_status, at);
        if let Some(message) = message {
            run.message = Some(message);
        }
        let updated = self.run_repo.update(&run).await?;

        if new_status.is_terminal() {
            self.release_lock(run_id).await;
        }
        info!("运行 {} 状态流转: {} -> {}", run_id, old_status, new_status);
        self.publish_event(RunStatusChanged::new(&updated, Some(old_status), at))
            .await;
        Ok(updated)
    }

    /// 记录提交成功后得到的后端运行标识
    pub async fn record_submission(&self, run_id: Uuid, backend_run_id: &str) -> JobsResult<Run> {
        let lock = self.entry_lock(run_id).await;
        let _guard = lock.lock().await;

        let mut run = self
            .run_repo
            .find_by_id(run_id)
            .await?
            .ok_or(JobsError::RunNotFound { id: run_id })?;
        run.backend_run_id = Some(backend_run_id.to_string());
        self.run_repo.update(&run).await
    }

    /// 后端受理取消请求后更新运行状态
    ///
    /// 排队中的运行被后端直接撤下时立即进入CANCELLED，否则进入
    /// CANCELLING等待后端反馈。与自然完成竞争时自然结果优先。
    pub async fn apply_cancellation(
        &self,
        run_id: Uuid,
        outcome: CancelOutcome,
        at: DateTime<Utc>,
    ) -> JobsResult<Run> {
        let lock = self.entry_lock(run_id).await;
        let _guard = lock.lock().await;

        let mut run = self
            .run_repo
            .find_by_id(run_id)
            .await?
            .ok_or(JobsError::RunNotFound { id: run_id })?;
        let old_status = run.status;

        if old_status.is_terminal() {
            info!("运行 {} 已自然结束({})，取消请求不再生效", run_id, old_status);
            return Ok(run);
        }

        run.cancel_requested = true;
        let target = if old_status == RunStatus::Queued && outcome == CancelOutcome::Dropped {
            RunStatus::Cancelled
        } else {
            RunStatus::Cancelling
        };

        if old_status == target {
            return self.run_repo.update(&run).await;
        }
        if !is_valid_status_transition(old_status, target) {
            return Err(JobsError::InvalidTransition {
                from: old_status.to_string(),
                to: target.to_string(),
            });
        }

        run.apply_status(target, at);
        let updated = self.run_repo.update(&run).await?;
        if target.is_terminal() {
            self.release_lock(run_id).await;
        }
        info!("运行 {} 已受理取消请求: {} -> {}", run_id, old_status, target);
        self.publish_event(RunStatusChanged::new(&updated, Some(old_status), at))
            .await;
        Ok(updated)
    }

    async fn entry_lock(&self, run_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(run_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // 终止状态的运行不会再有流转，及时清理锁表避免无限增长
    async fn release_lock(&self, run_id: Uuid) {
        let mut locks = self.locks.lock().await;
        locks.remove(&run_id);
    }

    async fn publish_event(&self, event: RunStatusChanged) {
        if let Err(e) = self.event_sink.publish(event).await {
            warn!("发布运行状态事件失败: {}", e);
        }
    }
}
