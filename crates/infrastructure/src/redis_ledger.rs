use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use uuid::Uuid;

use pipeline_core::config::LedgerConfig;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::entities::{AdmissionDecision, IdempotencyRecord, LedgerState};
use pipeline_domain::ledger::IdempotencyLedger;

/// Redis幂等账本实现
///
/// 放行依赖 `SET NX PX` 的原子条件写：两个分发器副本同时写同一
/// 自然键时只有一个成功。条目的过期交给Redis的TTL；完成标记用
/// `SET XX KEEPTTL` 翻转状态并保留剩余TTL。
pub struct RedisLedger {
    manager: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
}

impl RedisLedger {
    pub async fn new(config: &LedgerConfig) -> PipelineResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| PipelineError::ledger_error(format!("创建Redis客户端失败: {e}")))?;

        let manager = Self::connect_with_retry(&client, config).await?;

        let ledger = Self {
            manager,
            key_prefix: config.key_prefix.clone(),
            ttl: Duration::from_secs(config.ttl_seconds),
        };
        ledger.test_connection().await?;
        debug!("成功连接到Redis账本: {}", config.url);
        Ok(ledger)
    }

    async fn connect_with_retry(
        client: &redis::Client,
        config: &LedgerConfig,
    ) -> PipelineResult<ConnectionManager> {
        let mut last_error = None;

        for attempt in 0..config.max_retry_attempts {
            match client.get_connection_manager().await {
                Ok(manager) => {
                    if attempt > 0 {
                        debug!("第 {} 次尝试后连接Redis成功", attempt + 1);
                    }
                    return Ok(manager);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < config.max_retry_attempts - 1 {
                        warn!(
                            "连接Redis失败 (第 {}/{} 次): {}，{}秒后重试",
                            attempt + 1,
                            config.max_retry_attempts,
                            last_error.as_ref().unwrap(),
                            config.retry_delay_seconds
                        );
                        sleep(Duration::from_secs(config.retry_delay_seconds)).await;
                    }
                }
            }
        }

        let error_msg = format!(
            "连接Redis失败，已尝试 {} 次。最后错误: {}",
            config.max_retry_attempts,
            last_error.map_or("未知".to_string(), |e| e.to_string())
        );
        error!("{}", error_msg);
        Err(PipelineError::ledger_error(error_msg))
    }

    async fn test_connection(&self) -> PipelineResult<()> {
        let mut conn = self.manager.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| PipelineError::ledger_error(format!("Redis PING失败: {e}")))?;
        if response != "PONG" {
            return Err(PipelineError::ledger_error(format!(
                "非预期的PING响应: {response}"
            )));
        }
        Ok(())
    }

    fn key(&self, natural_key: Uuid) -> String {
        format!("{}:{}", self.key_prefix, natural_key)
    }
}

#[async_trait]
impl IdempotencyLedger for RedisLedger {
    async fn begin_or_reject(&self, natural_key: Uuid) -> PipelineResult<AdmissionDecision> {
        let key = self.key(natural_key);
        let mut conn = self.manager.clone();

        // 条目可能恰好在 SET NX 失败与 GET 之间过期，整体重试一次
        for _ in 0..2 {
            let application_id = Uuid::new_v4();
            let record = IdempotencyRecord {
                application_id,
                state: LedgerState::InProgress,
            };
            let value = serde_json::to_string(&record)?;

            let admitted: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("NX")
                .arg("PX")
                .arg(self.ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .map_err(|e| PipelineError::ledger_error(format!("账本条件写入失败: {e}")))?;

            if admitted.is_some() {
                debug!(%natural_key, %application_id, "账本登记新申请");
                return Ok(AdmissionDecision::Admitted(application_id));
            }

            let existing: Option<String> = redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| PipelineError::ledger_error(format!("读取账本条目失败: {e}")))?;

            match existing {
                Some(raw) => {
                    let record: IdempotencyRecord = serde_json::from_str(&raw).map_err(|e| {
                        PipelineError::ledger_error(format!("账本条目损坏: {e}"))
                    })?;
                    return Ok(match record.state {
                        LedgerState::InProgress => AdmissionDecision::AlreadyInProgress,
                        LedgerState::Completed => AdmissionDecision::AlreadyCompleted,
                    });
                }
                None => continue,
            }
        }

        Err(PipelineError::ledger_error(
            "无法确定幂等状态：条目在检查期间反复过期",
        ))
    }

    async fn mark_completed(
        &self,
        natural_key: Uuid,
        application_id: Uuid,
    ) -> PipelineResult<()> {
        let key = self.key(natural_key);
        let record = IdempotencyRecord {
            application_id,
            state: LedgerState::Completed,
        };
        let value = serde_json::to_string(&record)?;

        let mut conn = self.manager.clone();
        // XX：只更新仍存在的条目；KEEPTTL保留剩余TTL
        let updated: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&value)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
            .map_err(|e| PipelineError::ledger_error(format!("标记账本完成失败: {e}")))?;

        if updated.is_none() {
            warn!(%natural_key, "标记完成时账本条目已过期");
        }
        Ok(())
    }
}
