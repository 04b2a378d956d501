use std::future::Future;

use tracing::{debug, warn};

use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::entities::{StageOutcome, WorkflowStage};

use crate::retry_policy::RetryPolicy;

/// 阶段执行器
///
/// 在超时约束下调用阶段函数，按调用方提供的分类谓词判断失败
/// 是否可重试，并按策略做指数退避。执行器本身无状态，除日志
/// 和指标外没有副作用；副作用都在被调用的阶段函数里。
#[derive(Debug, Clone)]
pub struct StageExecutor {
    stage: WorkflowStage,
    policy: RetryPolicy,
}

impl StageExecutor {
    pub fn new(stage: WorkflowStage, policy: RetryPolicy) -> Self {
        Self { stage, policy }
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    /// 执行一个阶段直到成功、尝试耗尽或遇到致命错误。
    ///
    /// 超时的尝试被转换成 `PipelineError::Timeout` 再交给分类谓词；
    /// 底层调用可能仍在远端继续，编排器只是不再等待。
    pub async fn execute<T, F, Fut, C>(&self, mut operation: F, is_retryable: C) -> StageOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
        C: Fn(&PipelineError) -> bool,
    {
        let mut attempt: u32 = 1;

        loop {
            let result = match tokio::time::timeout(self.policy.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::timeout_error(format!(
                    "阶段 {} 第 {} 次尝试超过 {:?}",
                    self.stage, attempt, self.policy.timeout
                ))),
            };

            match result {
                Ok(value) => {
                    debug!(stage = %self.stage, attempt, "阶段执行成功");
                    return StageOutcome::Success(value);
                }
                Err(cause) => {
                    let retryable = is_retryable(&cause);

                    if retryable && attempt < self.policy.max_attempts {
                        let delay = self.policy.delay_for_attempt(attempt);
                        warn!(
                            stage = %self.stage,
                            attempt,
                            max_attempts = self.policy.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            "阶段尝试失败，退避后重试: {}", cause
                        );
                        metrics::counter!("pipeline_stage_retries_total", "stage" => self.stage.as_str())
                            .increment(1);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    if retryable {
                        warn!(
                            stage = %self.stage,
                            attempt,
                            "阶段重试次数耗尽: {}", cause
                        );
                    } else {
                        warn!(stage = %self.stage, attempt, "阶段遇到不可重试错误: {}", cause);
                    }
                    metrics::counter!("pipeline_stage_failures_total", "stage" => self.stage.as_str())
                        .increment(1);
                    return StageOutcome::Fatal { cause, attempts: attempt };
                }
            }
        }
    }
}
