use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::AdmissionDecision;
use pipeline_core::PipelineResult;

/// 幂等账本接口
///
/// `begin_or_reject` 必须是单次原子条件写（例如针对自然键的
/// compare-and-swap），避免两个并发分发器实例同时放行同一申请。
/// 条目按TTL过期；COMPLETED条目过期是安全的，IN_PROGRESS条目在
/// 工作流超过TTL仍在运行时过期会打开重复启动的窗口——这是记录
/// 在案的取舍，如需更强保证可在此接口上加租约续期。
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// 首见自然键时铸造申请ID并登记IN_PROGRESS；重复键返回当前状态
    async fn begin_or_reject(&self, natural_key: Uuid) -> PipelineResult<AdmissionDecision>;

    /// 工作流成功后把条目翻转为COMPLETED（保留原TTL）
    async fn mark_completed(&self, natural_key: Uuid, application_id: Uuid)
        -> PipelineResult<()>;
}
