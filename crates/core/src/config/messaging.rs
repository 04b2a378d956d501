use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageQueueType {
    Rabbitmq,
    InMemory,
}

/// 进件队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQueueConfig {
    pub r#type: MessageQueueType,
    pub url: String,
    /// 贷款申请进件队列名
    pub application_queue: String,
    /// 单次拉取的最大消息数
    pub batch_size: usize,
    /// 空队列时单次拉取的等待窗口（秒）
    pub wait_seconds: u64,
    pub connection_timeout_seconds: u64,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            r#type: MessageQueueType::Rabbitmq,
            url: "amqp://localhost:5672".to_string(),
            application_queue: "loan_applications".to_string(),
            batch_size: 10,
            wait_seconds: 5,
            connection_timeout_seconds: 30,
        }
    }
}

impl MessageQueueConfig {
    pub fn in_memory_default() -> Self {
        Self {
            r#type: MessageQueueType::InMemory,
            url: String::new(), // 内存队列不需要URL
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        match self.r#type {
            MessageQueueType::Rabbitmq => {
                if !self.url.starts_with("amqp://") && !self.url.starts_with("amqps://") {
                    return Err(PipelineError::config_error(
                        "RabbitMQ URL必须以amqp://或amqps://开头",
                    ));
                }
            }
            MessageQueueType::InMemory => {}
        }
        if self.application_queue.is_empty() {
            return Err(PipelineError::config_error(
                "message_queue.application_queue 不能为空",
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::config_error(
                "message_queue.batch_size 必须大于 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerType {
    Redis,
    InMemory,
}

/// 幂等账本配置
///
/// 账本条目带TTL：完成后过期是安全的（限制账本增长）；
/// IN_PROGRESS条目在工作流仍在运行时过期则可能导致重复启动，
/// 这是已接受并记录在案的竞态窗口，不做静默掩盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub r#type: LedgerType,
    pub url: String,
    /// 账本键前缀
    pub key_prefix: String,
    /// 条目存活时间（秒），默认1小时
    pub ttl_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            r#type: LedgerType::Redis,
            url: "redis://localhost:6379".to_string(),
            key_prefix: "loan_pipeline:ledger".to_string(),
            ttl_seconds: 3600,
            max_retry_attempts: 3,
            retry_delay_seconds: 5,
        }
    }
}

impl LedgerConfig {
    pub fn in_memory_default() -> Self {
        Self {
            r#type: LedgerType::InMemory,
            url: String::new(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.r#type == LedgerType::Redis
            && !self.url.starts_with("redis://")
            && !self.url.starts_with("rediss://")
        {
            return Err(PipelineError::config_error(
                "Redis账本URL必须以redis://或rediss://开头",
            ));
        }
        if self.ttl_seconds == 0 {
            return Err(PipelineError::config_error("ledger.ttl_seconds 必须大于 0"));
        }
        if self.key_prefix.is_empty() {
            return Err(PipelineError::config_error("ledger.key_prefix 不能为空"));
        }
        Ok(())
    }
}

/// 评分服务客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringServiceConfig {
    pub endpoint: String,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for ScoringServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000/score".to_string(),
            connect_timeout_seconds: 2,
            request_timeout_seconds: 5,
        }
    }
}

impl ScoringServiceConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(PipelineError::config_error(
                "scoring.endpoint 必须是http(s) URL",
            ));
        }
        Ok(())
    }
}
