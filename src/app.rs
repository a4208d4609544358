use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jobs_core::{AppConfig, JobDefinition, JobsError};
use jobs_dispatcher::{JobController, JobScheduler, RunLifecycle, ScheduleEvaluator, StateListener};
use jobs_domain::{
    CrontabSchedule, IntervalSchedule, Job, JobRepository, RunStatusChanged, Schedule,
};
use jobs_infrastructure::{
    BroadcastEventSink, CancelFlag, InMemoryJobRepository, InMemoryRunRepository, InProcessBackend,
    TaskHandler, TaskOutcome,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 内置的日志输出任务处理器
///
/// 读取参数中的message并写入一条日志，用于演示和联调。
struct LogMessageHandler;

#[async_trait]
impl TaskHandler for LogMessageHandler {
    async fn execute(&self, args: &serde_json::Value, cancel: CancelFlag) -> TaskOutcome {
        if cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }

        match args.get("message").and_then(|v| v.as_str()) {
            Some(message) => {
                info!("log_message: {}", message);
                TaskOutcome::Success
            }
            None => TaskOutcome::Failed("缺少message参数".to_string()),
        }
    }
}

/// 主应用程序
///
/// 组装内存仓储、进程内执行后端和调度服务，并负责从配置装载
/// 预定义作业。可以通过二进制入口运行，也可以嵌入到其他程序中，
/// 由调用方注册自定义任务处理器后驱动。
pub struct Application {
    config: AppConfig,
    job_repo: Arc<InMemoryJobRepository>,
    run_repo: Arc<InMemoryRunRepository>,
    backend: Arc<InProcessBackend>,
    event_sink: Arc<BroadcastEventSink>,
    scheduler: Arc<JobScheduler>,
    controller: Arc<JobController>,
    listener: Arc<StateListener>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化作业调度应用");

        let job_repo = Arc::new(InMemoryJobRepository::new());
        let run_repo = Arc::new(InMemoryRunRepository::new());
        let event_sink = Arc::new(BroadcastEventSink::new(256));

        // 创建进程内执行后端并注册内置任务处理器
        let backend = Arc::new(InProcessBackend::new(
            config.backend.worker_count,
            config.backend.queue_capacity,
        ));
        backend
            .register_handler("log_message", Arc::new(LogMessageHandler))
            .await;

        let lifecycle = Arc::new(RunLifecycle::new(run_repo.clone(), event_sink.clone()));

        let scheduler = Arc::new(JobScheduler::new(
            job_repo.clone(),
            run_repo.clone(),
            backend.clone(),
            lifecycle.clone(),
            config.scheduler.default_queue.clone(),
            Duration::from_secs(config.scheduler.submit_timeout_seconds),
        ));

        let listener = Arc::new(StateListener::new(
            run_repo.clone(),
            backend.clone(),
            lifecycle.clone(),
            Duration::from_millis(config.scheduler.status_poll_interval_ms),
        ));

        let controller = Arc::new(JobController::new(
            job_repo.clone(),
            run_repo.clone(),
            backend.clone(),
            lifecycle,
            scheduler.clone(),
            Duration::from_secs(config.scheduler.cancel_timeout_seconds),
        ));

        let app = Self {
            config,
            job_repo,
            run_repo,
            backend,
            event_sink,
            scheduler,
            controller,
            listener,
        };

        app.seed_jobs().await?;

        Ok(app)
    }

    /// 从配置装载预定义作业
    async fn seed_jobs(&self) -> Result<()> {
        for definition in &self.config.jobs {
            let job = build_job(definition)
                .with_context(|| format!("作业 {} 的定义无效", definition.name))?;

            if !self.backend.has_handler(&job.task).await {
                warn!("作业 {} 引用了未注册的任务处理器: {}", job.name, job.task);
            }

            let created = self
                .job_repo
                .create(&job)
                .await
                .with_context(|| format!("装载作业 {} 失败", definition.name))?;
            info!("已装载作业: {} ({})", created.name, created.id);
        }

        Ok(())
    }

    /// 运行应用程序，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动作业调度服务");

        // 启动调度器任务
        let scheduler_handle = {
            let scheduler = Arc::clone(&self.scheduler);
            let interval = self.config.scheduler.scan_interval_seconds;
            let shutdown_rx = shutdown_rx.resubscribe();

            tokio::spawn(async move {
                run_scheduler_loop(scheduler, interval, shutdown_rx).await;
            })
        };

        // 启动状态监听器任务
        let listener_handle = {
            let listener = Arc::clone(&self.listener);
            let shutdown_rx = shutdown_rx.resubscribe();

            tokio::spawn(async move {
                run_state_listener_loop(listener, shutdown_rx).await;
            })
        };

        // 等待关闭信号
        let _ = shutdown_rx.recv().await;
        info!("调度服务收到关闭信号");

        // 停止执行后端的工作协程
        self.backend.shutdown();

        // 等待任务完成
        let _ = tokio::join!(scheduler_handle, listener_handle);

        info!("作业调度服务已停止");
        Ok(())
    }

    /// 配置信息
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 作业仓储
    pub fn job_repository(&self) -> Arc<InMemoryJobRepository> {
        Arc::clone(&self.job_repo)
    }

    /// 运行实例仓储
    pub fn run_repository(&self) -> Arc<InMemoryRunRepository> {
        Arc::clone(&self.run_repo)
    }

    /// 执行后端，嵌入方可在启动前注册自定义任务处理器
    pub fn backend(&self) -> Arc<InProcessBackend> {
        Arc::clone(&self.backend)
    }

    /// 调度器
    pub fn scheduler(&self) -> Arc<JobScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// 运行控制服务，提供手动触发和取消
    pub fn controller(&self) -> Arc<JobController> {
        Arc::clone(&self.controller)
    }

    /// 订阅运行状态变更事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<RunStatusChanged> {
        self.event_sink.subscribe()
    }
}

/// 把配置中的作业定义转换为作业实体
fn build_job(definition: &JobDefinition) -> jobs_core::JobsResult<Job> {
    let mut job = Job::new(definition.name.clone(), definition.task.clone());
    job.default_queue = definition.queue.clone();
    job.active = definition.active;
    job.args_template = definition.args.clone();

    job.schedule = match (definition.every_seconds, &definition.crontab) {
        (Some(seconds), None) => Some(Schedule::interval(IntervalSchedule::from_seconds(
            seconds as i64,
        ))),
        (None, Some(expr)) => Some(Schedule::crontab(CrontabSchedule::parse(expr)?)),
        (None, None) => None,
        (Some(_), Some(_)) => {
            return Err(JobsError::InvalidJob(format!(
                "作业 {} 不能同时声明 every_seconds 和 crontab",
                definition.name
            )));
        }
    };

    if let Some(ref schedule) = job.schedule {
        ScheduleEvaluator::validate(schedule)?;
    }

    job.validate()?;

    Ok(job)
}

/// 运行调度器循环
async fn run_scheduler_loop(
    scheduler: Arc<JobScheduler>,
    interval_seconds: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = scheduler.scan_cycle().await {
                    error!("作业调度失败: {}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("调度器循环收到关闭信号");
                break;
            }
        }
    }
}

/// 运行状态监听器循环
async fn run_state_listener_loop(
    listener: Arc<StateListener>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tokio::select! {
        result = listener.listen_for_updates() => {
            if let Err(e) = result {
                error!("状态监听器失败: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("状态监听器收到关闭信号");
            listener.stop().await;
        }
    }
}
