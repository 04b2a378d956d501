use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use pipeline_core::PipelineResult;
use pipeline_domain::entities::DeadLetterRecord;
use pipeline_domain::repositories::DeadLetterSink;

/// 死信记录的Postgres落地，只追加不修改
pub struct PostgresDeadLetterStore {
    pool: PgPool,
}

impl PostgresDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterSink for PostgresDeadLetterStore {
    #[instrument(skip(self, record), fields(
        application_id = %record.application_id,
        failed_stage = %record.failed_stage,
    ))]
    async fn write(&self, record: &DeadLetterRecord) -> PipelineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dead_letter_records (
                application_id, failed_stage, cause, original_input, occurred_at
            ) VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.application_id)
        .bind(record.failed_stage.as_str())
        .bind(&record.cause)
        .bind(&record.original_input)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await?;

        debug!(
            application_id = %record.application_id,
            stage = %record.failed_stage,
            "死信记录落库成功"
        );
        Ok(())
    }
}
