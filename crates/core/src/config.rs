use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::JobsError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

/// 调度循环相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub scan_interval_seconds: u64,
    pub default_queue: String,
    pub submit_timeout_seconds: u64,
    pub cancel_timeout_seconds: u64,
    pub status_poll_interval_ms: u64,
}

/// 内置执行后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// 配置文件中声明的作业，启动时载入作业存储
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub task: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub every_seconds: Option<u64>,
    #[serde(default)]
    pub crontab: Option<String>,
    #[serde(default)]
    pub args: HashMap<String, String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig {
                scan_interval_seconds: 10,
                default_queue: "default".to_string(),
                submit_timeout_seconds: 10,
                cancel_timeout_seconds: 5,
                status_poll_interval_ms: 200,
            },
            backend: BackendConfig {
                worker_count: 2,
                queue_capacity: 128,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            jobs: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/jobs.toml", "jobs.toml", "/etc/jobs/config.toml"];

            let mut config_file_found = false;
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    config_file_found = true;
                    break;
                }
            }

            if !config_file_found {
                builder = builder
                    .set_default("scheduler.scan_interval_seconds", 10)?
                    .set_default("scheduler.default_queue", "default")?
                    .set_default("scheduler.submit_timeout_seconds", 10)?
                    .set_default("scheduler.cancel_timeout_seconds", 5)?
                    .set_default("scheduler.status_poll_interval_ms", 200)?
                    .set_default("backend.worker_count", 2)?
                    .set_default("backend.queue_capacity", 128)?
                    .set_default("logging.level", "info")?
                    .set_default("logging.format", "pretty")?;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("JOBS")
                .separator("_")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.scheduler.scan_interval_seconds == 0 {
            return Err(JobsError::Configuration(
                "scheduler.scan_interval_seconds 必须大于0".to_string(),
            ));
        }
        if self.scheduler.default_queue.trim().is_empty() {
            return Err(JobsError::Configuration(
                "scheduler.default_queue 不能为空".to_string(),
            ));
        }
        if self.scheduler.submit_timeout_seconds == 0 {
            return Err(JobsError::Configuration(
                "scheduler.submit_timeout_seconds 必须大于0".to_string(),
            ));
        }
        if self.scheduler.cancel_timeout_seconds == 0 {
            return Err(JobsError::Configuration(
                "scheduler.cancel_timeout_seconds 必须大于0".to_string(),
            ));
        }
        if self.scheduler.status_poll_interval_ms == 0 {
            return Err(JobsError::Configuration(
                "scheduler.status_poll_interval_ms 必须大于0".to_string(),
            ));
        }
        if self.backend.worker_count == 0 {
            return Err(JobsError::Configuration(
                "backend.worker_count 必须大于0".to_string(),
            ));
        }
        if self.backend.queue_capacity == 0 {
            return Err(JobsError::Configuration(
                "backend.queue_capacity 必须大于0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(JobsError::Configuration(format!(
                "无效的日志级别: {}",
                self.logging.level
            )));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(JobsError::Configuration(format!(
                "无效的日志格式: {}",
                self.logging.format
            )));
        }

        for job in &self.jobs {
            job.validate()?;
        }

        Ok(())
    }
}

impl JobDefinition {
    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.name.trim().is_empty() {
            return Err(JobsError::Configuration("作业名称不能为空".to_string()));
        }
        if self.task.trim().is_empty() {
            return Err(JobsError::Configuration(format!(
                "作业 {} 未指定任务名",
                self.name
            )));
        }
        if self.every_seconds.is_some() && self.crontab.is_some() {
            return Err(JobsError::Configuration(format!(
                "作业 {} 不能同时声明 every_seconds 和 crontab",
                self.name
            )));
        }
        if let Some(seconds) = self.every_seconds {
            if seconds == 0 {
                return Err(JobsError::Configuration(format!(
                    "作业 {} 的 every_seconds 必须大于0",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
