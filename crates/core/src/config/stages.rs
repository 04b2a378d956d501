use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};

/// 退避抖动策略
///
/// Full抖动：实际延迟在 [0, 计算出的指数延迟] 内均匀随机，
/// 用于避免大量工作流同时重试造成的雷群效应。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    None,
    Full,
}

/// 单个阶段的重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagePolicyConfig {
    /// 单次尝试的超时时间（秒）
    pub timeout_seconds: u64,
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 基础重试间隔（秒）
    pub base_delay_seconds: f64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 抖动策略
    pub jitter: JitterStrategy,
}

impl StagePolicyConfig {
    pub fn validate(&self, stage: &str) -> PipelineResult<()> {
        if self.max_attempts == 0 {
            return Err(PipelineError::config_error(format!(
                "stages.{stage}.max_attempts 必须大于 0"
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(PipelineError::config_error(format!(
                "stages.{stage}.timeout_seconds 必须大于 0"
            )));
        }
        if self.base_delay_seconds < 0.0 {
            return Err(PipelineError::config_error(format!(
                "stages.{stage}.base_delay_seconds 不能为负"
            )));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(PipelineError::config_error(format!(
                "stages.{stage}.backoff_multiplier 不能小于 1.0"
            )));
        }
        Ok(())
    }
}

/// 三个阶段的重试策略集合
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub clean: StagePolicyConfig,
    pub score: StagePolicyConfig,
    pub persist: StagePolicyConfig,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            // 清洗阶段：验证类失败也占用这里的两次预算
            clean: StagePolicyConfig {
                timeout_seconds: 120,
                max_attempts: 2,
                base_delay_seconds: 3.0,
                backoff_multiplier: 1.5,
                jitter: JitterStrategy::None,
            },
            score: StagePolicyConfig {
                timeout_seconds: 60,
                max_attempts: 3,
                base_delay_seconds: 5.0,
                backoff_multiplier: 2.0,
                jitter: JitterStrategy::Full,
            },
            persist: StagePolicyConfig {
                timeout_seconds: 90,
                max_attempts: 3,
                base_delay_seconds: 5.0,
                backoff_multiplier: 2.0,
                jitter: JitterStrategy::Full,
            },
        }
    }
}

impl StagesConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        self.clean.validate("clean")?;
        self.score.validate("score")?;
        self.persist.validate("persist")?;
        Ok(())
    }
}
