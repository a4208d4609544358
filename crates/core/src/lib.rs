pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AppConfig, BackendConfig, JobDefinition, LoggingConfig, SchedulerConfig};
pub use errors::*;
pub use logging::init_logging;

/// 统一的Result类型
pub type JobsResult<T> = std::result::Result<T, JobsError>;
