use chrono::Utc;
use jobs_core::{JobsError, JobsResult};
use jobs_domain::backend::{ExecutionBackend, StatusNotification};
use jobs_domain::repositories::RunRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::lifecycle::RunLifecycle;

/// 未关联到运行记录的通知最多保留多少秒等待重试
const DEFER_MAX_AGE_SECONDS: i64 = 5;

/// 运行状态监听服务
///
/// 轮询执行后端的状态通知并应用到对应的运行实例。被生命周期
/// 拒绝的流转（过期或重复的回调）记录警告后丢弃。
pub struct StateListener {
    run_repo: Arc<dyn RunRepository>,
    backend: Arc<dyn ExecutionBackend>,
    lifecycle: Arc<RunLifecycle>,
    poll_interval: Duration,
    running: Arc<RwLock<bool>>,
    deferred: Mutex<Vec<StatusNotification>>,
}

impl StateListener {
    pub fn new(
        run_repo: Arc<dyn RunRepository>,
        backend: Arc<dyn ExecutionBackend>,
        lifecycle: Arc<RunLifecycle>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            run_repo,
            backend,
            lifecycle,
            poll_interval,
            running: Arc::new(RwLock::new(false)),
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// 持续轮询状态通知，直至stop被调用
    pub async fn listen_for_updates(&self) -> JobsResult<()> {
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!("运行状态监听服务已启动");

        loop {
            if !self.is_running().await {
                break;
            }
            match self.poll_once().await {
                Ok(0) => tokio::time::sleep(self.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    error!("拉取状态通知失败: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("运行状态监听服务已停止");
        Ok(())
    }

    /// 执行一轮拉取与处理，返回完成处理的通知数量
    pub async fn poll_once(&self) -> JobsResult<usize> {
        let mut batch: Vec<StatusNotification> = {
            let mut deferred = self.deferred.lock().await;
            std::mem::take(&mut *deferred)
        };
        batch.extend(self.backend.poll_status_updates().await?);

        let mut processed = 0;
        for notification in batch {
            match self.process_notification(&notification).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(JobsError::InvalidTransition { from, to }) => {
                    warn!(
                        "后端运行 {} 的状态回调被拒绝: {} -> {}",
                        notification.backend_run_id, from, to
                    );
                    processed += 1;
                }
                Err(e) => {
                    error!(
                        "处理后端运行 {} 的状态通知失败: {}",
                        notification.backend_run_id, e
                    );
                    processed += 1;
                }
            }
        }
        Ok(processed)
    }

    // 返回Ok(false)表示通知被延后，等待下一轮重试
    async fn process_notification(&self, notification: &StatusNotification) -> JobsResult<bool> {
        match self
            .run_repo
            .find_by_backend_run_id(&notification.backend_run_id)
            .await?
        {
            Some(run) => {
                self.lifecycle
                    .transition(
                        run.id,
                        notification.status,
                        notification.timestamp,
                        notification.message.clone(),
                    )
                    .await?;
                Ok(true)
            }
            None => {
                // 提交方可能尚未落盘后端标识，短暂保留通知等待下一轮
                let age = Utc::now() - notification.timestamp;
                if age < chrono::Duration::seconds(DEFER_MAX_AGE_SECONDS) {
                    debug!(
                        "后端运行 {} 暂未关联运行记录，延后处理",
                        notification.backend_run_id
                    );
                    self.deferred.lock().await.push(notification.clone());
                    Ok(false)
                } else {
                    warn!(
                        "收到未知后端运行 {} 的状态通知，已丢弃",
                        notification.backend_run_id
                    );
                    Ok(true)
                }
            }
        }
    }
}
