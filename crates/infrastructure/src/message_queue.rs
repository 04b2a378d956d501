use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Queue,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pipeline_core::config::MessageQueueConfig;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::entities::ApplicationMessage;
use pipeline_domain::messaging::ApplicationQueue;

/// RabbitMQ进件队列实现
///
/// 消息的确认延迟到工作流终态：拉取时记录delivery_tag，
/// ack/nack时按delivery_id找回。
pub struct RabbitMqApplicationQueue {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    config: MessageQueueConfig,
    /// 在途消息的投递标签：delivery_id -> delivery_tag
    delivery_tags: Arc<Mutex<HashMap<String, u64>>>,
}

impl RabbitMqApplicationQueue {
    /// 创建新的RabbitMQ队列实例并声明进件队列
    pub async fn new(config: MessageQueueConfig) -> PipelineResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| PipelineError::queue_error(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| PipelineError::queue_error(format!("创建通道失败: {e}")))?;

        info!("成功连接到RabbitMQ: {}", config.url);

        let queue = Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            config,
            delivery_tags: Arc::new(Mutex::new(HashMap::new())),
        };

        queue.initialize_queue().await?;
        Ok(queue)
    }

    async fn initialize_queue(&self) -> PipelineResult<()> {
        let channel = self.channel.lock().await;
        self.declare_queue(&channel, &self.config.application_queue, true)
            .await?;
        info!("进件队列初始化完成");
        Ok(())
    }

    async fn declare_queue(
        &self,
        channel: &Channel,
        queue_name: &str,
        durable: bool,
    ) -> PipelineResult<Queue> {
        let queue = channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                PipelineError::queue_error(format!("声明队列 {queue_name} 失败: {e}"))
            })?;

        debug!("队列 {} 声明成功", queue_name);
        Ok(queue)
    }

    /// 向进件队列投递一条申请（上游生产方和测试用）
    pub async fn publish(&self, payload: &serde_json::Value) -> PipelineResult<()> {
        let channel = self.channel.lock().await;
        let body = serde_json::to_vec(payload)
            .map_err(|e| PipelineError::Serialization(format!("序列化申请载荷失败: {e}")))?;

        let confirm = channel
            .basic_publish(
                "",
                &self.config.application_queue,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(2), // 2 = persistent
            )
            .await
            .map_err(|e| PipelineError::queue_error(format!("发布申请消息失败: {e}")))?;

        confirm
            .await
            .map_err(|e| PipelineError::queue_error(format!("消息发布确认失败: {e}")))?;

        debug!("申请消息已发布到队列: {}", self.config.application_queue);
        Ok(())
    }

    fn lookup_error(delivery_id: &str) -> PipelineError {
        PipelineError::queue_error(format!("未知的delivery_id: {delivery_id}"))
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> PipelineResult<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| PipelineError::queue_error(format!("关闭连接失败: {e}")))?;
        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}

#[async_trait]
impl ApplicationQueue for RabbitMqApplicationQueue {
    async fn receive_batch(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> PipelineResult<Vec<ApplicationMessage>> {
        let deadline = tokio::time::Instant::now() + wait;
        let mut messages = Vec::new();

        loop {
            let get_result = {
                let channel = self.channel.lock().await;
                channel
                    .basic_get(&self.config.application_queue, BasicGetOptions::default())
                    .await
            };

            match get_result {
                Ok(Some(delivery)) => {
                    let payload: serde_json::Value = match serde_json::from_slice(&delivery.data) {
                        Ok(payload) => payload,
                        Err(e) => {
                            // 载荷不是合法JSON：重试不会有不同结果，直接丢弃
                            warn!("丢弃无法解析的进件消息: {}", e);
                            let channel = self.channel.lock().await;
                            channel
                                .basic_nack(
                                    delivery.delivery_tag,
                                    BasicNackOptions {
                                        requeue: false,
                                        ..Default::default()
                                    },
                                )
                                .await
                                .map_err(|e| {
                                    PipelineError::queue_error(format!("拒绝消息失败: {e}"))
                                })?;
                            continue;
                        }
                    };

                    let delivery_id = delivery.delivery_tag.to_string();
                    self.delivery_tags
                        .lock()
                        .await
                        .insert(delivery_id.clone(), delivery.delivery_tag);
                    messages.push(ApplicationMessage::new(delivery_id, payload));

                    if messages.len() >= max_messages {
                        break;
                    }
                }
                Ok(None) => {
                    if !messages.is_empty() || tokio::time::Instant::now() >= deadline {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    return Err(PipelineError::queue_error(format!(
                        "从队列 {} 获取消息失败: {e}",
                        self.config.application_queue
                    )));
                }
            }
        }

        Ok(messages)
    }

    async fn ack(&self, delivery_id: &str) -> PipelineResult<()> {
        let tag = self
            .delivery_tags
            .lock()
            .await
            .remove(delivery_id)
            .ok_or_else(|| Self::lookup_error(delivery_id))?;

        let channel = self.channel.lock().await;
        channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| PipelineError::queue_error(format!("确认消息失败: {e}")))?;

        debug!(delivery_id, "消息已确认");
        Ok(())
    }

    async fn nack(&self, delivery_id: &str, requeue: bool) -> PipelineResult<()> {
        let tag = self
            .delivery_tags
            .lock()
            .await
            .remove(delivery_id)
            .ok_or_else(|| Self::lookup_error(delivery_id))?;

        let channel = self.channel.lock().await;
        channel
            .basic_nack(
                tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| PipelineError::queue_error(format!("拒绝消息失败: {e}")))?;

        debug!(delivery_id, requeue, "消息已拒绝");
        Ok(())
    }
}
