use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use pipeline_core::config::StagesConfig;
use pipeline_core::PipelineError;
use pipeline_domain::entities::{
    ApplicationMessage, EngineeredFeatures, RiskScore, ScoredApplication, StageOutcome,
    WorkflowOutcome, WorkflowStage,
};
use pipeline_domain::ledger::IdempotencyLedger;
use pipeline_domain::repositories::ScoredApplicationStore;
use pipeline_domain::services::{CleaningService, ScoringService};

use crate::dead_letter::DeadLetterReporter;
use crate::retry_policy::RetryPolicy;
use crate::stage_executor::StageExecutor;

/// 三个阶段的重试策略
#[derive(Debug, Clone)]
pub struct StagePolicies {
    pub clean: RetryPolicy,
    pub score: RetryPolicy,
    pub persist: RetryPolicy,
}

impl From<&StagesConfig> for StagePolicies {
    fn from(config: &StagesConfig) -> Self {
        Self {
            clean: RetryPolicy::from(&config.clean),
            score: RetryPolicy::from(&config.score),
            persist: RetryPolicy::from(&config.persist),
        }
    }
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self::from(&StagesConfig::default())
    }
}

/// 一次工作流执行的内存状态
///
/// 放行时创建，到达终态后随任务一起销毁。中间结果显式地随
/// 执行状态传递，没有任何跨执行的环境上下文。
#[derive(Debug)]
pub struct WorkflowExecution {
    pub application_id: Uuid,
    pub natural_key: Uuid,
    pub message: ApplicationMessage,
    pub features: Option<EngineeredFeatures>,
    pub risk_score: Option<RiskScore>,
    /// 失败阶段的实际尝试次数
    pub stage_attempts: HashMap<WorkflowStage, u32>,
}

impl WorkflowExecution {
    pub fn new(application_id: Uuid, natural_key: Uuid, message: ApplicationMessage) -> Self {
        Self {
            application_id,
            natural_key,
            message,
            features: None,
            risk_score: None,
            stage_attempts: HashMap::new(),
        }
    }
}

/// 工作流控制器：CLEAN → SCORE → PERSIST 的顺序状态机
///
/// 每个阶段使用各自的重试策略；任何阶段的致命失败走统一的
/// 死信出口。阶段不可跳过、不可重排，前一阶段的结局未知前
/// 不会开始下一阶段。SUCCEEDED 把账本条目翻转为 COMPLETED，
/// FAILED 恰好触发一次死信报告。
pub struct WorkflowController {
    cleaning: Arc<dyn CleaningService>,
    scoring: Arc<dyn ScoringService>,
    store: Arc<dyn ScoredApplicationStore>,
    ledger: Arc<dyn IdempotencyLedger>,
    reporter: DeadLetterReporter,
    clean_executor: StageExecutor,
    score_executor: StageExecutor,
    persist_executor: StageExecutor,
}

impl WorkflowController {
    pub fn new(
        cleaning: Arc<dyn CleaningService>,
        scoring: Arc<dyn ScoringService>,
        store: Arc<dyn ScoredApplicationStore>,
        ledger: Arc<dyn IdempotencyLedger>,
        reporter: DeadLetterReporter,
        policies: StagePolicies,
    ) -> Self {
        Self {
            cleaning,
            scoring,
            store,
            ledger,
            reporter,
            clean_executor: StageExecutor::new(WorkflowStage::Clean, policies.clean),
            score_executor: StageExecutor::new(WorkflowStage::Score, policies.score),
            persist_executor: StageExecutor::new(WorkflowStage::Persist, policies.persist),
        }
    }

    /// 驱动一次执行走完状态机，返回两种终态之一。
    pub async fn run(&self, mut execution: WorkflowExecution) -> WorkflowOutcome {
        let application_id = execution.application_id;

        // CLEAN：验证类错误也占用本阶段的有限重试预算
        let clean_outcome = self
            .clean_executor
            .execute(
                || self.cleaning.clean(&execution.message.payload),
                |e| e.is_retryable() || e.is_validation(),
            )
            .await;
        let features = match clean_outcome {
            StageOutcome::Success(features) => features,
            StageOutcome::Fatal { cause, attempts } => {
                return self
                    .fail(execution, WorkflowStage::Clean, cause, attempts)
                    .await;
            }
        };
        execution.features = Some(features.clone());

        // SCORE
        let score_outcome = self
            .score_executor
            .execute(|| self.scoring.score(&features), |e| e.is_retryable())
            .await;
        let risk_score = match score_outcome {
            StageOutcome::Success(score) => score,
            StageOutcome::Fatal { cause, attempts } => {
                return self
                    .fail(execution, WorkflowStage::Score, cause, attempts)
                    .await;
            }
        };
        execution.risk_score = Some(risk_score);

        // PERSIST：以 application_id 为键upsert，重试不会产生重复记录
        let record = ScoredApplication {
            application_id,
            delivery_id: execution.message.delivery_id.clone(),
            features,
            risk_score: risk_score.0,
            processed_at: Utc::now(),
        };
        let persist_outcome = self
            .persist_executor
            .execute(|| self.store.upsert(&record), |e| e.is_retryable())
            .await;
        match persist_outcome {
            StageOutcome::Success(()) => {}
            StageOutcome::Fatal { cause, attempts } => {
                return self
                    .fail(execution, WorkflowStage::Persist, cause, attempts)
                    .await;
            }
        }

        // 完成标记失败不回滚已持久化的记录：条目会随TTL过期，
        // 窗口内的重投递命中 IN_PROGRESS 被抑制，窗口外的重跑
        // 落在upsert上仍然幂等。
        if let Err(e) = self
            .ledger
            .mark_completed(execution.natural_key, application_id)
            .await
        {
            error!(%application_id, "标记账本完成失败: {}", e);
        }

        info!(%application_id, risk_score = risk_score.0, "工作流处理成功");
        metrics::counter!("pipeline_workflows_succeeded_total").increment(1);
        WorkflowOutcome::Succeeded { application_id }
    }

    async fn fail(
        &self,
        mut execution: WorkflowExecution,
        failed_stage: WorkflowStage,
        cause: PipelineError,
        attempts: u32,
    ) -> WorkflowOutcome {
        execution.stage_attempts.insert(failed_stage, attempts);
        warn!(
            application_id = %execution.application_id,
            stage = %failed_stage,
            attempts,
            "工作流终态失败: {}", cause
        );

        self.reporter
            .report(
                execution.application_id,
                failed_stage,
                &cause,
                &execution.message.payload,
            )
            .await;

        metrics::counter!("pipeline_workflows_failed_total", "stage" => failed_stage.as_str())
            .increment(1);
        WorkflowOutcome::DeadLettered {
            application_id: execution.application_id,
            failed_stage,
        }
    }
}
