//! 基础设施实现
//!
//! 领域抽象的进程内实现，面向嵌入式部署：
//! - 内存仓储（作业与运行实例）
//! - 进程内执行后端（工作协程池 + 任务处理器注册表）
//! - 广播事件分发

pub mod events;
pub mod inprocess;
pub mod memory;

pub use events::BroadcastEventSink;
pub use inprocess::{CancelFlag, InProcessBackend, TaskHandler, TaskOutcome};
pub use memory::{InMemoryJobRepository, InMemoryRunRepository};
