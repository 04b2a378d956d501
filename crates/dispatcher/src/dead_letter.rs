use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use pipeline_core::PipelineError;
use pipeline_domain::entities::{DeadLetterRecord, WorkflowStage};
use pipeline_domain::repositories::DeadLetterSink;

/// 死信报告器
///
/// 终态失败时把完整失败上下文写入持久化的死信存储。写入本身
/// 是尽力而为：写失败只记日志，工作流仍然按终态失败处理——
/// 宁可丢失死信记录，也不为它无限重试而占着资源不放。
pub struct DeadLetterReporter {
    sink: Arc<dyn DeadLetterSink>,
}

impl DeadLetterReporter {
    pub fn new(sink: Arc<dyn DeadLetterSink>) -> Self {
        Self { sink }
    }

    pub async fn report(
        &self,
        application_id: Uuid,
        failed_stage: WorkflowStage,
        cause: &PipelineError,
        original_input: &serde_json::Value,
    ) {
        let record = DeadLetterRecord {
            application_id,
            failed_stage,
            cause: cause.to_string(),
            original_input: original_input.clone(),
            occurred_at: Utc::now(),
        };

        match self.sink.write(&record).await {
            Ok(()) => {
                info!(
                    %application_id,
                    stage = %failed_stage,
                    "死信记录已写入"
                );
            }
            Err(e) => {
                error!(
                    %application_id,
                    stage = %failed_stage,
                    "写入死信记录失败，该记录将丢失: {}", e
                );
            }
        }
        metrics::counter!("pipeline_dead_letters_total", "stage" => failed_stage.as_str())
            .increment(1);
    }
}
