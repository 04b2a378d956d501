//! 集成测试共用的桩实现和快速重试策略
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use pipeline_core::config::JitterStrategy;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_dispatcher::retry_policy::RetryPolicy;
use pipeline_dispatcher::workflow::StagePolicies;
use pipeline_domain::entities::{AdmissionDecision, EngineeredFeatures, RiskScore};
use pipeline_domain::ledger::IdempotencyLedger;
use pipeline_domain::repositories::{DeadLetterSink, ScoredApplicationStore};
use pipeline_domain::services::{CleaningService, ScoringService};

pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_millis(200),
        max_attempts,
        base_delay: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        jitter: JitterStrategy::None,
        max_delay: Duration::from_millis(10),
    }
}

/// 生产默认的尝试次数（清洗2次、评分3次、持久化3次），毫秒级延迟
pub fn fast_policies() -> StagePolicies {
    StagePolicies {
        clean: fast_policy(2),
        score: fast_policy(3),
        persist: fast_policy(3),
    }
}

pub fn sample_payload() -> serde_json::Value {
    json!({
        "loan_amnt": "10000",
        "term": "36 months",
        "int_rate": "13.5%",
        "installment": 339.25,
        "emp_length": "10+ years",
        "annual_inc": 55000,
        "dti": 18.2,
        "addr_state": "CA",
        "emp_title": "Teacher",
        "issue_d": "Dec-2018"
    })
}

/// 固定风险分的评分桩
pub struct FixedScorer {
    pub score: f64,
    calls: AtomicU32,
}

impl FixedScorer {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringService for FixedScorer {
    async fn score(&self, _features: &EngineeredFeatures) -> PipelineResult<RiskScore> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RiskScore(self.score))
    }
}

/// 前 fail_times 次返回可重试错误，之后返回固定分数
pub struct FlakyScorer {
    fail_times: u32,
    score: f64,
    calls: AtomicU32,
}

impl FlakyScorer {
    pub fn new(fail_times: u32, score: f64) -> Self {
        Self {
            fail_times,
            score,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringService for FlakyScorer {
    async fn score(&self, _features: &EngineeredFeatures) -> PipelineResult<RiskScore> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_times {
            Err(PipelineError::Throttled("HTTP 429".to_string()))
        } else {
            Ok(RiskScore(self.score))
        }
    }
}

/// 总是返回验证错误的清洗桩
pub struct RejectingCleaner {
    calls: AtomicU32,
}

impl RejectingCleaner {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CleaningService for RejectingCleaner {
    async fn clean(&self, _payload: &serde_json::Value) -> PipelineResult<EngineeredFeatures> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::validation_error("字段无法解析"))
    }
}

/// 总是失败（可重试错误）的存储桩
pub struct FailingStore {
    calls: AtomicU32,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoredApplicationStore for FailingStore {
    async fn upsert(
        &self,
        _record: &pipeline_domain::entities::ScoredApplication,
    ) -> PipelineResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::database_error("连接中断"))
    }

    async fn get_by_id(
        &self,
        _application_id: Uuid,
    ) -> PipelineResult<Option<pipeline_domain::entities::ScoredApplication>> {
        Ok(None)
    }
}

/// 写入总是失败的死信落地桩
pub struct FailingSink;

#[async_trait]
impl DeadLetterSink for FailingSink {
    async fn write(
        &self,
        _record: &pipeline_domain::entities::DeadLetterRecord,
    ) -> PipelineResult<()> {
        Err(PipelineError::database_error("死信表不可用"))
    }
}

/// 账本总是报错的桩，用于验证消息退回队列
pub struct ErrorLedger;

#[async_trait]
impl IdempotencyLedger for ErrorLedger {
    async fn begin_or_reject(&self, _natural_key: Uuid) -> PipelineResult<AdmissionDecision> {
        Err(PipelineError::ledger_error("账本存储不可用"))
    }

    async fn mark_completed(
        &self,
        _natural_key: Uuid,
        _application_id: Uuid,
    ) -> PipelineResult<()> {
        Err(PipelineError::ledger_error("账本存储不可用"))
    }
}

/// 记录各阶段调用顺序的探针
pub struct StageProbe {
    pub order: Arc<Mutex<Vec<&'static str>>>,
}

impl StageProbe {
    pub fn new() -> Self {
        Self {
            order: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn order(&self) -> Vec<&'static str> {
        self.order.lock().await.clone()
    }
}

/// 清洗探针：记录调用后委托给真实实现或失败
pub struct ProbingCleaner {
    order: Arc<Mutex<Vec<&'static str>>>,
    fail: bool,
}

impl ProbingCleaner {
    pub fn new(probe: &StageProbe, fail: bool) -> Self {
        Self {
            order: probe.order.clone(),
            fail,
        }
    }
}

#[async_trait]
impl CleaningService for ProbingCleaner {
    async fn clean(&self, _payload: &serde_json::Value) -> PipelineResult<EngineeredFeatures> {
        self.order.lock().await.push("clean");
        if self.fail {
            return Err(PipelineError::Internal("清洗失败".to_string()));
        }
        Ok(EngineeredFeatures {
            loan_amnt: 1000.0,
            term: 36,
            int_rate: 0.1,
            installment: 33.0,
            emp_length: 5,
            annual_inc: 50000.0,
            dti: 0.2,
            addr_state: "CA".to_string(),
            credit_to_income_ratio: 0.02,
            is_self_employed: false,
            loan_month: 6,
            is_long_term: true,
        })
    }
}

/// 评分探针
pub struct ProbingScorer {
    order: Arc<Mutex<Vec<&'static str>>>,
    fail: bool,
}

impl ProbingScorer {
    pub fn new(probe: &StageProbe, fail: bool) -> Self {
        Self {
            order: probe.order.clone(),
            fail,
        }
    }
}

#[async_trait]
impl ScoringService for ProbingScorer {
    async fn score(&self, _features: &EngineeredFeatures) -> PipelineResult<RiskScore> {
        self.order.lock().await.push("score");
        if self.fail {
            return Err(PipelineError::Internal("评分失败".to_string()));
        }
        Ok(RiskScore(0.5))
    }
}

/// 持久化探针
pub struct ProbingStore {
    order: Arc<Mutex<Vec<&'static str>>>,
}

impl ProbingStore {
    pub fn new(probe: &StageProbe) -> Self {
        Self {
            order: probe.order.clone(),
        }
    }
}

#[async_trait]
impl ScoredApplicationStore for ProbingStore {
    async fn upsert(
        &self,
        _record: &pipeline_domain::entities::ScoredApplication,
    ) -> PipelineResult<()> {
        self.order.lock().await.push("persist");
        Ok(())
    }

    async fn get_by_id(
        &self,
        _application_id: Uuid,
    ) -> PipelineResult<Option<pipeline_domain::entities::ScoredApplication>> {
        Ok(None)
    }
}
