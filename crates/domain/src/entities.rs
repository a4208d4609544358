use chrono::{DateTime, Duration, Utc};
use jobs_core::{JobsError, JobsResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub task: String,
    pub default_queue: Option<String>,
    pub active: bool,
    pub args_template: HashMap<String, String>,
    pub schedule: Option<Schedule>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: String, task: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            task,
            default_queue: None,
            active: true,
            args_template: HashMap::new(),
            schedule: None,
            last_evaluated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn is_schedulable(&self) -> bool {
        self.active && self.schedule.as_ref().is_some_and(|s| s.enabled)
    }
    pub fn validate(&self) -> JobsResult<()> {
        if self.name.trim().is_empty() {
            return Err(JobsError::InvalidJob("作业名称不能为空".to_string()));
        }
        if self.name.chars().count() > 250 {
            return Err(JobsError::InvalidJob(format!(
                "作业名称超过250个字符: {}",
                self.name.chars().count()
            )));
        }
        if self.task.trim().is_empty() {
            return Err(JobsError::InvalidJob(format!(
                "作业 '{}' 未指定任务名",
                self.name
            )));
        }
        Ok(())
    }
    pub fn entity_description(&self) -> String {
        format!("作业 '{}' (ID: {}, 任务: {})", self.name, self.id, self.task)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub rule: ScheduleRule,
}

fn default_enabled() -> bool {
    true
}

impl Schedule {
    pub fn interval(interval: IntervalSchedule) -> Self {
        Self {
            enabled: true,
            rule: ScheduleRule::Interval(interval),
        }
    }
    pub fn crontab(crontab: CrontabSchedule) -> Self {
        Self {
            enabled: true,
            rule: ScheduleRule::Crontab(crontab),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduleRule {
    Interval(IntervalSchedule),
    Crontab(CrontabSchedule),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntervalSchedule {
    #[serde(default)]
    pub weeks: i64,
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
    #[serde(default)]
    pub seconds: i64,
}

impl IntervalSchedule {
    pub fn from_seconds(seconds: i64) -> Self {
        Self {
            seconds,
            ..Default::default()
        }
    }
    pub fn duration(&self) -> Duration {
        Duration::weeks(self.weeks)
            + Duration::days(self.days)
            + Duration::hours(self.hours)
            + Duration::minutes(self.minutes)
            + Duration::seconds(self.seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrontabSchedule {
    #[serde(default = "default_field")]
    pub minute: String,
    #[serde(default = "default_field")]
    pub hour: String,
    #[serde(default = "default_field")]
    pub day_of_month: String,
    #[serde(default = "default_field")]
    pub month_of_year: String,
    #[serde(default = "default_field")]
    pub day_of_week: String,
}

fn default_field() -> String {
    "*".to_string()
}

impl Default for CrontabSchedule {
    fn default() -> Self {
        Self {
            minute: default_field(),
            hour: default_field(),
            day_of_month: default_field(),
            month_of_year: default_field(),
            day_of_week: default_field(),
        }
    }
}

impl CrontabSchedule {
    /// 解析标准5字段crontab表达式
    pub fn parse(expr: &str) -> JobsResult<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(JobsError::InvalidSchedule {
                expr: expr.to_string(),
                message: format!("crontab表达式必须包含5个字段，实际为 {}", fields.len()),
            });
        }
        Ok(Self {
            minute: fields[0].to_string(),
            hour: fields[1].to_string(),
            day_of_month: fields[2].to_string(),
            month_of_year: fields[3].to_string(),
            day_of_week: fields[4].to_string(),
        })
    }
    pub fn cron_expression(&self) -> String {
        // 秒字段固定为0，对齐到整分钟
        format!(
            "0 {} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month_of_year, self.day_of_week
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Principal {
    System,
    User { id: String },
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::System => write!(f, "system"),
            Principal::User { id } => write!(f, "user:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RunStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "CANCELLING")]
    Cancelling,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Warning | RunStatus::Cancelled
        )
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::Running => "RUNNING",
            RunStatus::Cancelling => "CANCELLING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Warning => "WARNING",
            RunStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub job_id: Uuid,
    pub title: String,
    pub queue: String,
    pub args: serde_json::Value,
    pub status: RunStatus,
    pub started_by: Principal,
    pub backend_run_id: Option<String>,
    pub cancel_requested: bool,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(
        job_id: Uuid,
        title: String,
        queue: String,
        args: serde_json::Value,
        started_by: Principal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            title,
            queue,
            args,
            status: RunStatus::Queued,
            started_by,
            backend_run_id: None,
            cancel_requested: false,
            message: None,
            started_at: None,
            finished_at: None,
            created_at,
        }
    }
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
    pub fn is_successful(&self) -> bool {
        matches!(self.status, RunStatus::Success)
    }
    pub fn apply_status(&mut self, status: RunStatus, at: DateTime<Utc>) {
        self.status = status;
        match status {
            RunStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(at);
                }
            }
            RunStatus::Success | RunStatus::Failed | RunStatus::Warning | RunStatus::Cancelled => {
                if self.finished_at.is_none() {
                    self.finished_at = Some(at);
                }
            }
            _ => {}
        }
    }
    pub fn execution_duration_ms(&self) -> Option<i64> {
        if let (Some(started), Some(finished)) = (self.started_at, self.finished_at) {
            Some((finished - started).num_milliseconds())
        } else {
            None
        }
    }
    pub fn entity_description(&self) -> String {
        format!(
            "运行实例 (ID: {}, 作业ID: {}, 状态: {})",
            self.id, self.job_id, self.status
        )
    }
}
