//! 执行后端抽象
//!
//! 后端负责实际执行提交的运行，并通过状态通知反馈进度。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobs_core::JobsResult;
use serde::{Deserialize, Serialize};

use crate::entities::RunStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusNotification {
    pub backend_run_id: String,
    pub status: RunStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 取消请求被后端接受后的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// 运行尚未开始，已直接从待执行队列移除
    Dropped,
    /// 取消信号已传递给正在执行的运行
    Signalled,
}

/// 执行后端抽象
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// 提交一次运行，返回后端侧的运行标识
    async fn submit(&self, queue: &str, task: &str, args: &serde_json::Value) -> JobsResult<String>;

    /// 请求取消一次运行
    async fn request_cancel(&self, backend_run_id: &str) -> JobsResult<CancelOutcome>;

    /// 拉取后端产生的状态通知，返回后即从后端移除
    async fn poll_status_updates(&self) -> JobsResult<Vec<StatusNotification>>;
}
