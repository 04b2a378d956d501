use async_trait::async_trait;
use std::time::Duration;

use crate::entities::ApplicationMessage;
use pipeline_core::PipelineResult;

/// 进件队列接口
///
/// 至少一次投递、不保证顺序。消息只有在对应工作流到达终态后
/// 才被确认删除；提前确认会在进程崩溃时丢失在途工作。
#[async_trait]
pub trait ApplicationQueue: Send + Sync {
    /// 拉取一批消息，最多 `max_messages` 条，空队列时最多等待 `wait`
    async fn receive_batch(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> PipelineResult<Vec<ApplicationMessage>>;

    /// 确认消息处理完成，将其从队列移除
    async fn ack(&self, delivery_id: &str) -> PipelineResult<()>;

    /// 拒绝消息，`requeue` 为真时重新入队等待再次投递
    async fn nack(&self, delivery_id: &str, requeue: bool) -> PipelineResult<()>;
}
