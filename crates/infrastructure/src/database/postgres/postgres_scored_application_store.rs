use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use pipeline_core::PipelineResult;
use pipeline_domain::entities::{EngineeredFeatures, ScoredApplication};
use pipeline_domain::repositories::ScoredApplicationStore;

/// 已评分申请的Postgres存储
///
/// 写入是以 application_id 为冲突键的upsert：持久化阶段因
/// 假阴性超时而重试时不会产生第二条记录。
pub struct PostgresScoredApplicationStore {
    pool: PgPool,
}

impl PostgresScoredApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> PipelineResult<ScoredApplication> {
        Ok(ScoredApplication {
            application_id: row.try_get("application_id")?,
            delivery_id: row.try_get("delivery_id")?,
            features: EngineeredFeatures {
                loan_amnt: row.try_get("loan_amnt")?,
                term: row.try_get("term")?,
                int_rate: row.try_get("int_rate")?,
                installment: row.try_get("installment")?,
                emp_length: row.try_get("emp_length")?,
                annual_inc: row.try_get("annual_inc")?,
                dti: row.try_get("dti")?,
                addr_state: row.try_get("addr_state")?,
                credit_to_income_ratio: row.try_get("credit_to_income_ratio")?,
                is_self_employed: row.try_get("is_self_employed")?,
                loan_month: row.try_get("loan_month")?,
                is_long_term: row.try_get("is_long_term")?,
            },
            risk_score: row.try_get("risk_score")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

#[async_trait]
impl ScoredApplicationStore for PostgresScoredApplicationStore {
    #[instrument(skip(self, record), fields(application_id = %record.application_id))]
    async fn upsert(&self, record: &ScoredApplication) -> PipelineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scored_loan_applications (
                application_id, delivery_id, loan_amnt, term, int_rate, installment,
                emp_length, annual_inc, dti, addr_state,
                credit_to_income_ratio, is_self_employed, loan_month, is_long_term,
                risk_score, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (application_id) DO UPDATE SET
                delivery_id = EXCLUDED.delivery_id,
                loan_amnt = EXCLUDED.loan_amnt,
                term = EXCLUDED.term,
                int_rate = EXCLUDED.int_rate,
                installment = EXCLUDED.installment,
                emp_length = EXCLUDED.emp_length,
                annual_inc = EXCLUDED.annual_inc,
                dti = EXCLUDED.dti,
                addr_state = EXCLUDED.addr_state,
                credit_to_income_ratio = EXCLUDED.credit_to_income_ratio,
                is_self_employed = EXCLUDED.is_self_employed,
                loan_month = EXCLUDED.loan_month,
                is_long_term = EXCLUDED.is_long_term,
                risk_score = EXCLUDED.risk_score,
                processed_at = EXCLUDED.processed_at
            "#,
        )
        .bind(record.application_id)
        .bind(&record.delivery_id)
        .bind(record.features.loan_amnt)
        .bind(record.features.term)
        .bind(record.features.int_rate)
        .bind(record.features.installment)
        .bind(record.features.emp_length)
        .bind(record.features.annual_inc)
        .bind(record.features.dti)
        .bind(&record.features.addr_state)
        .bind(record.features.credit_to_income_ratio)
        .bind(record.features.is_self_employed)
        .bind(record.features.loan_month)
        .bind(record.features.is_long_term)
        .bind(record.risk_score)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await?;

        debug!(
            application_id = %record.application_id,
            risk_score = record.risk_score,
            "已评分申请记录写入成功"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(application_id = %application_id))]
    async fn get_by_id(
        &self,
        application_id: Uuid,
    ) -> PipelineResult<Option<ScoredApplication>> {
        let row = sqlx::query(
            r#"
            SELECT application_id, delivery_id, loan_amnt, term, int_rate, installment,
                   emp_length, annual_inc, dti, addr_state,
                   credit_to_income_ratio, is_self_employed, loan_month, is_long_term,
                   risk_score, processed_at
            FROM scored_loan_applications
            WHERE application_id = $1
            "#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => {
                debug!(%application_id, "查询的申请记录不存在");
                Ok(None)
            }
        }
    }
}
