use chrono::{DateTime, Utc};
use jobs_core::{JobsError, JobsResult};
use jobs_domain::entities::{Job, Principal, Run, RunStatus};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// 运行的触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    Scheduled,
    Manual,
}

impl TriggerMode {
    pub fn run_title(&self) -> &'static str {
        match self {
            TriggerMode::Scheduled => "Scheduled run",
            TriggerMode::Manual => "Manual run",
        }
    }
}

/// 参数模板的渲染上下文，所有字段都可在模板中引用
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    pub now: DateTime<Utc>,
    pub trigger: TriggerMode,
    pub principal: Principal,
    pub job: JobContext,
    pub last_run: Option<LastRunContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobContext {
    pub id: Uuid,
    pub name: String,
    pub task: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRunContext {
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RenderContext {
    pub fn new(job: &Job, trigger: TriggerMode, principal: Principal, now: DateTime<Utc>) -> Self {
        Self {
            now,
            trigger,
            principal,
            job: JobContext {
                id: job.id,
                name: job.name.clone(),
                task: job.task.clone(),
            },
            last_run: None,
        }
    }

    pub fn with_last_run(mut self, run: &Run) -> Self {
        self.last_run = Some(LastRunContext {
            status: run.status,
            started_at: run.started_at,
            finished_at: run.finished_at,
        });
        self
    }
}

/// 参数模板渲染器
///
/// 模板中引用未定义变量视为错误，任意一个模板渲染失败都会使
/// 整次渲染失败且不产生部分结果。
pub struct ArgsRenderer {
    env: Environment<'static>,
}

impl ArgsRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    pub fn render(
        &self,
        templates: &HashMap<String, String>,
        context: &RenderContext,
    ) -> JobsResult<serde_json::Value> {
        let mut rendered = serde_json::Map::new();
        for (key, template) in templates {
            let value = self
                .env
                .render_str(template, context)
                .map_err(|e| JobsError::Template {
                    key: key.clone(),
                    message: e.to_string(),
                })?;
            rendered.insert(key.clone(), serde_json::Value::String(value));
        }
        Ok(serde_json::Value::Object(rendered))
    }
}

impl Default for ArgsRenderer {
    fn default() -> Self {
        Self::new()
    }
}
