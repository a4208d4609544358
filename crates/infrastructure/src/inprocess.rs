use async_trait::async_trait;
use chrono::Utc;
use jobs_core::{JobsError, JobsResult};
use jobs_domain::backend::{CancelOutcome, ExecutionBackend, StatusNotification};
use jobs_domain::entities::RunStatus;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 任务处理结果
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success,
    /// 完成但有需要关注的问题
    Warning(Option<String>),
    Failed(String),
    /// 响应取消信号提前退出
    Cancelled,
}

/// 协作式取消标志
///
/// 处理器在执行过程中应定期检查该标志，发现取消后尽快收尾并
/// 返回[`TaskOutcome::Cancelled`]。
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 任务处理器抽象，按任务名注册到执行后端
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, args: &serde_json::Value, cancel: CancelFlag) -> TaskOutcome;
}

struct PendingTask {
    backend_run_id: String,
    queue: String,
    task: String,
    args: serde_json::Value,
    cancel: CancelFlag,
}

struct BackendInner {
    /// 已注册的任务处理器：任务名 -> 处理器
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    /// 待执行队列
    pending: Mutex<VecDeque<PendingTask>>,
    /// 新任务到达通知
    task_available: Notify,
    /// 正在执行的任务：后端运行标识 -> 取消标志
    running: Mutex<HashMap<String, CancelFlag>>,
    /// 待拉取的状态通知
    notifications: Mutex<VecDeque<StatusNotification>>,
    /// 待执行队列容量上限（0表示无限制）
    queue_capacity: usize,
    shutdown: AtomicBool,
}

impl BackendInner {
    async fn push_notification(
        &self,
        backend_run_id: &str,
        status: RunStatus,
        message: Option<String>,
    ) {
        let mut notifications = self.notifications.lock().await;
        notifications.push_back(StatusNotification {
            backend_run_id: backend_run_id.to_string(),
            status,
            message,
            timestamp: Utc::now(),
        });
    }
}

/// 进程内执行后端
///
/// 适用于嵌入式部署场景：提交的任务进入待执行队列，由固定数量的
/// 工作协程消费并调用注册的任务处理器，执行进度以状态通知的形式
/// 供轮询方拉取。
pub struct InProcessBackend {
    inner: Arc<BackendInner>,
}

impl InProcessBackend {
    /// 创建后端并启动工作协程
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let inner = Arc::new(BackendInner {
            handlers: RwLock::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            task_available: Notify::new(),
            running: Mutex::new(HashMap::new()),
            notifications: Mutex::new(VecDeque::new()),
            queue_capacity,
            shutdown: AtomicBool::new(false),
        });

        let worker_count = worker_count.max(1);
        for worker_id in 0..worker_count {
            let inner = inner.clone();
            tokio::spawn(async move {
                Self::worker_loop(inner, worker_id).await;
            });
        }
        info!("进程内执行后端已启动，工作协程数: {}", worker_count);

        Self { inner }
    }

    /// 注册任务处理器，同名注册会覆盖旧的处理器
    pub async fn register_handler(&self, task: &str, handler: Arc<dyn TaskHandler>) {
        let mut handlers = self.inner.handlers.write().await;
        if handlers.insert(task.to_string(), handler).is_some() {
            warn!("任务处理器 {} 被重新注册", task);
        } else {
            info!("已注册任务处理器: {}", task);
        }
    }

    pub async fn has_handler(&self, task: &str) -> bool {
        self.inner.handlers.read().await.contains_key(task)
    }

    /// 通知工作协程在完成当前任务后退出
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.task_available.notify_waiters();
        info!("进程内执行后端开始关闭");
    }

    async fn worker_loop(inner: Arc<BackendInner>, worker_id: usize) {
        loop {
            if inner.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let next = {
                let mut pending = inner.pending.lock().await;
                pending.pop_front()
            };
            match next {
                Some(task) => Self::execute_task(&inner, task, worker_id).await,
                None => {
                    // 空闲时等待新任务，短暂超时用于响应关闭
                    tokio::select! {
                        _ = inner.task_available.notified() => {}
                        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                    }
                }
            }
        }
        debug!("工作协程 {} 已退出", worker_id);
    }

    async fn execute_task(inner: &BackendInner, task: PendingTask, worker_id: usize) {
        let handler = {
            let handlers = inner.handlers.read().await;
            handlers.get(&task.task).cloned()
        };
        let Some(handler) = handler else {
            inner
                .push_notification(
                    &task.backend_run_id,
                    RunStatus::Failed,
                    Some(format!("任务处理器已不可用: {}", task.task)),
                )
                .await;
            return;
        };

        {
            let mut running = inner.running.lock().await;
            running.insert(task.backend_run_id.clone(), task.cancel.clone());
        }
        inner
            .push_notification(&task.backend_run_id, RunStatus::Running, None)
            .await;
        info!(
            "工作协程 {} 开始执行任务 {} (后端运行 {})",
            worker_id, task.task, task.backend_run_id
        );

        let outcome = handler.execute(&task.args, task.cancel.clone()).await;

        {
            let mut running = inner.running.lock().await;
            running.remove(&task.backend_run_id);
        }

        let (status, message) = match outcome {
            TaskOutcome::Success => (RunStatus::Success, None),
            TaskOutcome::Warning(message) => (RunStatus::Warning, message),
            TaskOutcome::Failed(cause) => (RunStatus::Failed, Some(cause)),
            TaskOutcome::Cancelled => (RunStatus::Cancelled, None),
        };
        info!(
            "任务 {} 执行结束: {} (后端运行 {})",
            task.task, status, task.backend_run_id
        );
        inner
            .push_notification(&task.backend_run_id, status, message)
            .await;
    }
}

#[async_trait]
impl ExecutionBackend for InProcessBackend {
    async fn submit(&self, queue: &str, task: &str, args: &serde_json::Value) -> JobsResult<String> {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(JobsError::Submission("执行后端已关闭".to_string()));
        }
        {
            let handlers = self.inner.handlers.read().await;
            if !handlers.contains_key(task) {
                return Err(JobsError::Submission(format!("未注册的任务处理器: {task}")));
            }
        }

        let backend_run_id = Uuid::new_v4().to_string();
        {
            let mut pending = self.inner.pending.lock().await;
            if self.inner.queue_capacity > 0 && pending.len() >= self.inner.queue_capacity {
                return Err(JobsError::Submission(format!(
                    "待执行队列已满({})，拒绝任务 {}",
                    self.inner.queue_capacity, task
                )));
            }
            pending.push_back(PendingTask {
                backend_run_id: backend_run_id.clone(),
                queue: queue.to_string(),
                task: task.to_string(),
                args: args.clone(),
                cancel: CancelFlag::new(),
            });
        }
        self.inner.task_available.notify_one();
        debug!(
            "已接受队列 {} 的任务 {} (后端运行 {})",
            queue, task, backend_run_id
        );
        Ok(backend_run_id)
    }

    async fn request_cancel(&self, backend_run_id: &str) -> JobsResult<CancelOutcome> {
        // 还在待执行队列中的任务直接撤下，之后不会产生任何状态通知，
        // 最终状态由取消方落库
        {
            let mut pending = self.inner.pending.lock().await;
            if let Some(pos) = pending
                .iter()
                .position(|t| t.backend_run_id == backend_run_id)
            {
                let dropped = pending.remove(pos);
                info!(
                    "后端运行 {} 在开始前被移出队列 {}",
                    backend_run_id,
                    dropped.map(|t| t.queue).unwrap_or_default()
                );
                return Ok(CancelOutcome::Dropped);
            }
        }

        let running = self.inner.running.lock().await;
        if let Some(flag) = running.get(backend_run_id) {
            flag.cancel();
            info!("已向后端运行 {} 发送取消信号", backend_run_id);
            return Ok(CancelOutcome::Signalled);
        }

        Err(JobsError::Cancel(format!(
            "后端不存在运行 {backend_run_id}，可能已执行完成"
        )))
    }

    async fn poll_status_updates(&self) -> JobsResult<Vec<StatusNotification>> {
        let mut notifications = self.inner.notifications.lock().await;
        Ok(notifications.drain(..).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration as StdDuration;

    struct SucceedingHandler;

    #[async_trait]
    impl TaskHandler for SucceedingHandler {
        async fn execute(&self, _args: &serde_json::Value, _cancel: CancelFlag) -> TaskOutcome {
            TaskOutcome::Success
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl TaskHandler for FailingHandler {
        async fn execute(&self, _args: &serde_json::Value, _cancel: CancelFlag) -> TaskOutcome {
            TaskOutcome::Failed("boom".to_string())
        }
    }

    struct WaitForCancelHandler;

    #[async_trait]
    impl TaskHandler for WaitForCancelHandler {
        async fn execute(&self, _args: &serde_json::Value, cancel: CancelFlag) -> TaskOutcome {
            for _ in 0..500 {
                if cancel.is_cancelled() {
                    return TaskOutcome::Cancelled;
                }
                tokio::time::sleep(StdDuration::from_millis(10)).await;
            }
            TaskOutcome::Success
        }
    }

    async fn collect_notifications(
        backend: &InProcessBackend,
        count: usize,
    ) -> Vec<StatusNotification> {
        let mut collected = Vec::new();
        for _ in 0..200 {
            collected.extend(backend.poll_status_updates().await.unwrap());
            if collected.len() >= count {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        collected
    }

    #[tokio::test]
    async fn test_submit_executes_and_notifies() {
        let backend = InProcessBackend::new(2, 16);
        backend
            .register_handler("echo", Arc::new(SucceedingHandler))
            .await;

        let id = backend
            .submit("default", "echo", &json!({"message": "hi"}))
            .await
            .unwrap();

        let notifications = collect_notifications(&backend, 2).await;
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].backend_run_id, id);
        assert_eq!(notifications[0].status, RunStatus::Running);
        assert_eq!(notifications[1].status, RunStatus::Success);
        assert!(notifications[0].timestamp <= notifications[1].timestamp);
    }

    #[tokio::test]
    async fn test_submit_unregistered_task_rejected() {
        let backend = InProcessBackend::new(1, 16);

        let result = backend.submit("default", "missing", &json!({})).await;
        assert!(matches!(result, Err(JobsError::Submission(_))));
    }

    #[tokio::test]
    async fn test_failed_task_reports_cause() {
        let backend = InProcessBackend::new(1, 16);
        backend
            .register_handler("broken", Arc::new(FailingHandler))
            .await;

        backend.submit("default", "broken", &json!({})).await.unwrap();

        let notifications = collect_notifications(&backend, 2).await;
        assert_eq!(notifications[1].status, RunStatus::Failed);
        assert_eq!(notifications[1].message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_cancel_running_task_signalled() {
        let backend = InProcessBackend::new(1, 16);
        backend
            .register_handler("wait", Arc::new(WaitForCancelHandler))
            .await;

        let id = backend.submit("default", "wait", &json!({})).await.unwrap();

        // Wait until the worker picked the task up
        let notifications = collect_notifications(&backend, 1).await;
        assert_eq!(notifications[0].status, RunStatus::Running);

        let outcome = backend.request_cancel(&id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Signalled);

        let notifications = collect_notifications(&backend, 1).await;
        assert_eq!(notifications[0].status, RunStatus::Cancelled);
        assert_eq!(notifications[0].backend_run_id, id);
    }

    #[tokio::test]
    async fn test_cancel_pending_task_dropped_without_notification() {
        let backend = InProcessBackend::new(1, 16);
        backend
            .register_handler("wait", Arc::new(WaitForCancelHandler))
            .await;
        backend
            .register_handler("echo", Arc::new(SucceedingHandler))
            .await;

        // Occupy the single worker, then queue a second task behind it
        let blocker = backend.submit("default", "wait", &json!({})).await.unwrap();
        let notifications = collect_notifications(&backend, 1).await;
        assert_eq!(notifications[0].status, RunStatus::Running);

        let queued = backend.submit("default", "echo", &json!({})).await.unwrap();
        let outcome = backend.request_cancel(&queued).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Dropped);

        // Unblock the worker and confirm the dropped task never reports
        backend.request_cancel(&blocker).await.unwrap();
        let notifications = collect_notifications(&backend, 1).await;
        assert!(notifications.iter().all(|n| n.backend_run_id != queued));
    }

    #[tokio::test]
    async fn test_cancel_unknown_run_rejected() {
        let backend = InProcessBackend::new(1, 16);

        let result = backend.request_cancel("no-such-run").await;
        assert!(matches!(result, Err(JobsError::Cancel(_))));
    }

    #[tokio::test]
    async fn test_queue_capacity_limit() {
        let backend = InProcessBackend::new(1, 1);
        backend
            .register_handler("wait", Arc::new(WaitForCancelHandler))
            .await;

        let blocker = backend.submit("default", "wait", &json!({})).await.unwrap();
        let notifications = collect_notifications(&backend, 1).await;
        assert_eq!(notifications[0].status, RunStatus::Running);

        // Worker is busy; one slot in the queue, the next submit overflows
        backend.submit("default", "wait", &json!({})).await.unwrap();
        let result = backend.submit("default", "wait", &json!({})).await;
        assert!(matches!(result, Err(JobsError::Submission(_))));

        backend.request_cancel(&blocker).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_rejected() {
        let backend = InProcessBackend::new(1, 16);
        backend
            .register_handler("echo", Arc::new(SucceedingHandler))
            .await;

        backend.shutdown();
        let result = backend.submit("default", "echo", &json!({})).await;
        assert!(matches!(result, Err(JobsError::Submission(_))));
    }
}
