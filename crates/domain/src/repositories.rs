use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{DeadLetterRecord, ScoredApplication};
use pipeline_core::PipelineResult;

/// 已评分申请的持久化存储
///
/// 以 application_id 为键做upsert而不是仅插入：持久化阶段的
/// 假阴性超时重试不会产生第二条记录。
#[async_trait]
pub trait ScoredApplicationStore: Send + Sync {
    async fn upsert(&self, record: &ScoredApplication) -> PipelineResult<()>;
    async fn get_by_id(&self, application_id: Uuid) -> PipelineResult<Option<ScoredApplication>>;
}

/// 死信落地（尽力而为）
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn write(&self, record: &DeadLetterRecord) -> PipelineResult<()>;
}
