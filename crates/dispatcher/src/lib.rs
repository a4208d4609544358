//! 作业调度服务
//!
//! 提供作业调度的核心能力：
//! - 调度规则求值（固定间隔与crontab表达式）
//! - 参数模板渲染
//! - 运行实例生命周期与状态机
//! - 周期扫描与派发
//! - 手动触发与取消控制
//! - 执行后端状态通知监听

pub mod controller;
pub mod evaluator;
pub mod lifecycle;
pub mod renderer;
pub mod scheduler;
pub mod state_listener;

pub use controller::{JobController, RunStatusSummary};
pub use evaluator::ScheduleEvaluator;
pub use lifecycle::{is_valid_status_transition, RunLifecycle};
pub use renderer::{ArgsRenderer, RenderContext, TriggerMode};
pub use scheduler::JobScheduler;
pub use state_listener::StateListener;
