use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use pipeline_core::PipelineResult;
use pipeline_domain::entities::ApplicationMessage;
use pipeline_domain::messaging::ApplicationQueue;

/// 内存进件队列实现
///
/// 使用内存双端队列模拟至少一次投递的进件队列，适用于嵌入式
/// 部署和测试场景。消息被拉取后进入在途集合，nack可将其重新
/// 入队并累加投递计数。
#[derive(Debug, Default)]
pub struct InMemoryApplicationQueue {
    /// 待投递消息
    pending: Arc<Mutex<VecDeque<ApplicationMessage>>>,
    /// 在途消息：delivery_id -> 消息
    in_flight: Arc<Mutex<HashMap<String, ApplicationMessage>>>,
}

impl InMemoryApplicationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 投入一条新申请，返回分配的delivery_id
    pub async fn push(&self, payload: serde_json::Value) -> String {
        let delivery_id = Uuid::new_v4().to_string();
        let message = ApplicationMessage::new(delivery_id.clone(), payload);
        self.pending.lock().await.push_back(message);
        delivery_id
    }

    /// 直接投入一条构造好的消息（测试重投递场景用）
    pub async fn push_message(&self, message: ApplicationMessage) {
        self.pending.lock().await.push_back(message);
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn in_flight_len(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

#[async_trait]
impl ApplicationQueue for InMemoryApplicationQueue {
    async fn receive_batch(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> PipelineResult<Vec<ApplicationMessage>> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let mut batch = Vec::new();
            {
                let mut pending = self.pending.lock().await;
                let mut in_flight = self.in_flight.lock().await;
                while batch.len() < max_messages {
                    let Some(message) = pending.pop_front() else {
                        break;
                    };
                    in_flight.insert(message.delivery_id.clone(), message.clone());
                    batch.push(message);
                }
            }

            if !batch.is_empty() {
                debug!("从内存队列拉取 {} 条消息", batch.len());
                return Ok(batch);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn ack(&self, delivery_id: &str) -> PipelineResult<()> {
        let removed = self.in_flight.lock().await.remove(delivery_id);
        if removed.is_none() {
            warn!(delivery_id, "确认了未知的delivery_id");
        }
        Ok(())
    }

    async fn nack(&self, delivery_id: &str, requeue: bool) -> PipelineResult<()> {
        let removed = self.in_flight.lock().await.remove(delivery_id);
        match removed {
            Some(mut message) if requeue => {
                message.receive_count += 1;
                self.pending.lock().await.push_back(message);
            }
            Some(_) => {
                debug!(delivery_id, "消息被拒绝且不再入队");
            }
            None => {
                warn!(delivery_id, "拒绝了未知的delivery_id");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_push_receive_ack() {
        let queue = InMemoryApplicationQueue::new();
        let delivery_id = queue.push(json!({"loan_amnt": 1000})).await;

        let batch = queue
            .receive_batch(10, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].delivery_id, delivery_id);
        assert_eq!(queue.in_flight_len().await, 1);

        queue.ack(&delivery_id).await.unwrap();
        assert_eq!(queue.in_flight_len().await, 0);
        assert_eq!(queue.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_receive_respects_batch_size() {
        let queue = InMemoryApplicationQueue::new();
        for i in 0..5 {
            queue.push(json!({"loan_amnt": i})).await;
        }

        let batch = queue
            .receive_batch(3, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.pending_len().await, 2);
        assert_eq!(queue.in_flight_len().await, 3);
    }

    #[tokio::test]
    async fn test_empty_queue_returns_after_wait() {
        let queue = InMemoryApplicationQueue::new();
        let batch = queue
            .receive_batch(10, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_nack_requeue_increments_receive_count() {
        let queue = InMemoryApplicationQueue::new();
        let delivery_id = queue.push(json!({"loan_amnt": 1000})).await;

        let batch = queue
            .receive_batch(1, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(batch[0].receive_count, 1);

        queue.nack(&delivery_id, true).await.unwrap();
        let batch = queue
            .receive_batch(1, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].receive_count, 2);
        assert!(batch[0].is_redelivery());
    }

    #[tokio::test]
    async fn test_nack_without_requeue_drops_message() {
        let queue = InMemoryApplicationQueue::new();
        let delivery_id = queue.push(json!({"loan_amnt": 1000})).await;

        queue
            .receive_batch(1, Duration::from_millis(10))
            .await
            .unwrap();
        queue.nack(&delivery_id, false).await.unwrap();
        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(queue.in_flight_len().await, 0);
    }
}
