//! 领域事件
//!
//! 运行状态发生变化时对外发布的事件。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobs_core::JobsResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Run, RunStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatusChanged {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub job_id: Uuid,
    pub old_status: Option<RunStatus>,
    pub new_status: RunStatus,
    pub occurred_at: DateTime<Utc>,
}

impl RunStatusChanged {
    pub fn new(run: &Run, old_status: Option<RunStatus>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            run_id: run.id,
            job_id: run.job_id,
            old_status,
            new_status: run.status,
            occurred_at,
        }
    }
    pub fn event_type(&self) -> &'static str {
        "run_status_changed"
    }
}

/// 运行状态事件发布抽象
#[async_trait]
pub trait RunEventSink: Send + Sync {
    async fn publish(&self, event: RunStatusChanged) -> JobsResult<()>;
}
