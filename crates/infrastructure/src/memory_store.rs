use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use pipeline_core::PipelineResult;
use pipeline_domain::entities::{DeadLetterRecord, ScoredApplication};
use pipeline_domain::repositories::{DeadLetterSink, ScoredApplicationStore};

/// 内存版已评分申请存储，嵌入式部署和测试用
#[derive(Debug, Default)]
pub struct InMemoryScoredApplicationStore {
    records: Mutex<HashMap<Uuid, ScoredApplication>>,
}

impl InMemoryScoredApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn get_all(&self) -> Vec<ScoredApplication> {
        self.records.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl ScoredApplicationStore for InMemoryScoredApplicationStore {
    async fn upsert(&self, record: &ScoredApplication) -> PipelineResult<()> {
        self.records
            .lock()
            .await
            .insert(record.application_id, record.clone());
        Ok(())
    }

    async fn get_by_id(
        &self,
        application_id: Uuid,
    ) -> PipelineResult<Option<ScoredApplication>> {
        Ok(self.records.lock().await.get(&application_id).cloned())
    }
}

/// 内存版死信落地，嵌入式部署和测试用
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterSink {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn write(&self, record: &DeadLetterRecord) -> PipelineResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
