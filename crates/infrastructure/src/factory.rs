use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use pipeline_core::config::{LedgerConfig, LedgerType, MessageQueueConfig, MessageQueueType};
use pipeline_core::PipelineResult;
use pipeline_domain::ledger::IdempotencyLedger;
use pipeline_domain::messaging::ApplicationQueue;

use crate::in_memory_queue::InMemoryApplicationQueue;
use crate::memory_ledger::InMemoryLedger;
use crate::message_queue::RabbitMqApplicationQueue;
use crate::redis_ledger::RedisLedger;

/// 按配置创建进件队列实现
pub struct QueueFactory;

impl QueueFactory {
    pub async fn create(
        config: &MessageQueueConfig,
    ) -> PipelineResult<Arc<dyn ApplicationQueue>> {
        debug!("创建进件队列，类型: {:?}", config.r#type);

        match config.r#type {
            MessageQueueType::Rabbitmq => {
                info!("初始化RabbitMQ进件队列");
                let queue = RabbitMqApplicationQueue::new(config.clone()).await?;
                Ok(Arc::new(queue))
            }
            MessageQueueType::InMemory => {
                info!("初始化内存进件队列");
                Ok(Arc::new(InMemoryApplicationQueue::new()))
            }
        }
    }
}

/// 按配置创建幂等账本实现
pub struct LedgerFactory;

impl LedgerFactory {
    pub async fn create(config: &LedgerConfig) -> PipelineResult<Arc<dyn IdempotencyLedger>> {
        debug!("创建幂等账本，类型: {:?}", config.r#type);

        match config.r#type {
            LedgerType::Redis => {
                info!("初始化Redis幂等账本");
                let ledger = RedisLedger::new(config).await?;
                Ok(Arc::new(ledger))
            }
            LedgerType::InMemory => {
                info!("初始化内存幂等账本");
                Ok(Arc::new(InMemoryLedger::new(Duration::from_secs(
                    config.ttl_seconds,
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_queue() {
        let config = MessageQueueConfig::in_memory_default();
        let queue = QueueFactory::create(&config).await.unwrap();
        let batch = queue
            .receive_batch(1, Duration::from_millis(5))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_create_in_memory_ledger() {
        let config = LedgerConfig::in_memory_default();
        let ledger = LedgerFactory::create(&config).await.unwrap();
        let decision = ledger.begin_or_reject(uuid::Uuid::new_v4()).await.unwrap();
        assert!(matches!(
            decision,
            pipeline_domain::entities::AdmissionDecision::Admitted(_)
        ));
    }
}
