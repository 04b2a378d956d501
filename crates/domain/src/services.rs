use async_trait::async_trait;

use crate::entities::{EngineeredFeatures, RiskScore};
use pipeline_core::PipelineResult;

/// 清洗与特征工程服务
///
/// 入参是原始申请载荷；格式问题返回 `PipelineError::Validation`，
/// 由清洗阶段的有限重试预算兜底。
#[async_trait]
pub trait CleaningService: Send + Sync {
    async fn clean(&self, payload: &serde_json::Value) -> PipelineResult<EngineeredFeatures>;
}

/// 风险评分服务
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, features: &EngineeredFeatures) -> PipelineResult<RiskScore>;
}
