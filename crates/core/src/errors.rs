use thiserror::Error;
use uuid::Uuid;

/// 作业调度错误类型定义
#[derive(Debug, Error)]
pub enum JobsError {
    #[error("作业未找到: {id}")]
    JobNotFound { id: Uuid },

    #[error("运行实例未找到: {id}")]
    RunNotFound { id: Uuid },

    #[error("作业未激活: {id}")]
    JobInactive { id: Uuid },

    #[error("无效的作业定义: {0}")]
    InvalidJob(String),

    #[error("无效的调度规则: {expr} - {message}")]
    InvalidSchedule { expr: String, message: String },

    #[error("参数模板渲染失败: {key} - {message}")]
    Template { key: String, message: String },

    #[error("提交执行后端失败: {0}")]
    Submission(String),

    #[error("取消请求失败: {0}")]
    Cancel(String),

    #[error("非法的状态流转: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, JobsError>;
