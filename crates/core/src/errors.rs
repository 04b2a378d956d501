use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("消息队列错误: {0}")]
    MessageQueue(String),
    #[error("幂等账本错误: {0}")]
    Ledger(String),
    #[error("外部服务错误: {0}")]
    ExternalService(String),
    #[error("外部服务限流: {0}")]
    Throttled(String),
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn queue_error<S: Into<String>>(msg: S) -> Self {
        Self::MessageQueue(msg.into())
    }
    pub fn ledger_error<S: Into<String>>(msg: S) -> Self {
        Self::Ledger(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn timeout_error<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// 基础设施类错误（网络、限流、数据库、超时）可按阶段策略重试。
    /// 验证错误单独分类：仅在清洗阶段的有限预算内重试。
    /// 其余错误一律视为不可重试，防止未知错误耗尽资源。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Database(_)
                | PipelineError::DatabaseOperation(_)
                | PipelineError::MessageQueue(_)
                | PipelineError::Ledger(_)
                | PipelineError::ExternalService(_)
                | PipelineError::Throttled(_)
                | PipelineError::Timeout(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Internal(_)
                | PipelineError::Configuration(_)
                | PipelineError::Serialization(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}
