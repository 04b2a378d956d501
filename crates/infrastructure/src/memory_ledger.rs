use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use pipeline_core::PipelineResult;
use pipeline_domain::entities::{AdmissionDecision, IdempotencyRecord, LedgerState};
use pipeline_domain::ledger::IdempotencyLedger;

struct Entry {
    record: IdempotencyRecord,
    expires_at: Instant,
}

/// 内存幂等账本实现
///
/// 单把互斥锁保证 `begin_or_reject` 的检查加写入是原子的。
/// 条目按TTL懒惰过期：访问时发现过期即移除，效果上等同于
/// 存储层的TTL。适用于嵌入式部署和测试。
pub struct InMemoryLedger {
    entries: Mutex<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl InMemoryLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// 当前条目状态（测试用；过期条目视为不存在）
    pub async fn state_of(&self, natural_key: Uuid) -> Option<LedgerState> {
        let entries = self.entries.lock().await;
        entries
            .get(&natural_key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.record.state)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryLedger {
    async fn begin_or_reject(&self, natural_key: Uuid) -> PipelineResult<AdmissionDecision> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some(entry) = entries.get(&natural_key) {
            if entry.expires_at > now {
                return Ok(match entry.record.state {
                    LedgerState::InProgress => AdmissionDecision::AlreadyInProgress,
                    LedgerState::Completed => AdmissionDecision::AlreadyCompleted,
                });
            }
            // 条目已过期，允许重新处理
            entries.remove(&natural_key);
        }

        let application_id = Uuid::new_v4();
        entries.insert(
            natural_key,
            Entry {
                record: IdempotencyRecord {
                    application_id,
                    state: LedgerState::InProgress,
                },
                expires_at: now + self.ttl,
            },
        );
        debug!(%natural_key, %application_id, "账本登记新申请");
        Ok(AdmissionDecision::Admitted(application_id))
    }

    async fn mark_completed(
        &self,
        natural_key: Uuid,
        application_id: Uuid,
    ) -> PipelineResult<()> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&natural_key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.record.application_id = application_id;
                entry.record.state = LedgerState::Completed;
                // 保留原TTL，完成后的过期是安全的
            }
            _ => {
                warn!(%natural_key, "标记完成时账本条目已过期");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use pipeline_domain::entities::ApplicationMessage;

    #[tokio::test]
    async fn test_first_sight_admits() {
        let ledger = InMemoryLedger::new(Duration::from_secs(60));
        let key = Uuid::new_v4();

        let decision = ledger.begin_or_reject(key).await.unwrap();
        assert!(matches!(decision, AdmissionDecision::Admitted(_)));
        assert_eq!(ledger.state_of(key).await, Some(LedgerState::InProgress));
    }

    #[tokio::test]
    async fn test_duplicate_rejected_while_in_progress() {
        let ledger = InMemoryLedger::new(Duration::from_secs(60));
        let key = Uuid::new_v4();

        ledger.begin_or_reject(key).await.unwrap();
        let second = ledger.begin_or_reject(key).await.unwrap();
        assert_eq!(second, AdmissionDecision::AlreadyInProgress);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_after_completion() {
        let ledger = InMemoryLedger::new(Duration::from_secs(60));
        let key = Uuid::new_v4();

        let AdmissionDecision::Admitted(application_id) =
            ledger.begin_or_reject(key).await.unwrap()
        else {
            panic!("expected admission");
        };
        ledger.mark_completed(key, application_id).await.unwrap();

        let decision = ledger.begin_or_reject(key).await.unwrap();
        assert_eq!(decision, AdmissionDecision::AlreadyCompleted);
        assert_eq!(ledger.state_of(key).await, Some(LedgerState::Completed));
    }

    #[tokio::test]
    async fn test_expired_entry_allows_reprocessing() {
        let ledger = InMemoryLedger::new(Duration::from_millis(20));
        let key = Uuid::new_v4();

        ledger.begin_or_reject(key).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // TTL过期后同一自然键可以再次放行（记录在案的竞态取舍）
        let decision = ledger.begin_or_reject(key).await.unwrap();
        assert!(matches!(decision, AdmissionDecision::Admitted(_)));
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_admit_exactly_once() {
        // 同一自然键并发投递两次时必须恰好放行一个
        let ledger = Arc::new(InMemoryLedger::new(Duration::from_secs(60)));
        let message = ApplicationMessage::new("d1".to_string(), json!({"naturalKey": "A1"}));
        let key = message.natural_key();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(
                async move { ledger.begin_or_reject(key).await },
            ));
        }

        let mut admitted = 0;
        let mut in_progress = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                AdmissionDecision::Admitted(_) => admitted += 1,
                AdmissionDecision::AlreadyInProgress => in_progress += 1,
                AdmissionDecision::AlreadyCompleted => panic!("unexpected completion"),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(in_progress, 1);
        assert_eq!(ledger.len().await, 1);
    }
}
