use chrono::{DateTime, Utc};
use pipeline_core::PipelineError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 从队列到达的一条贷款申请消息
///
/// `delivery_id` 由队列分配，重投递时会变化；去重依据是消息内容
/// 派生的自然键，而不是投递元数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationMessage {
    pub delivery_id: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub receive_count: u32,
}

impl ApplicationMessage {
    pub fn new(delivery_id: String, payload: serde_json::Value) -> Self {
        Self {
            delivery_id,
            payload,
            received_at: Utc::now(),
            receive_count: 1,
        }
    }

    /// 基于消息内容派生自然键（UUIDv5）。
    ///
    /// serde_json 的对象默认按键排序，同一逻辑申请的任意次重投递
    /// 会得到同一个键。
    pub fn natural_key(&self) -> Uuid {
        let canonical = self.payload.to_string();
        Uuid::new_v5(&Uuid::NAMESPACE_OID, canonical.as_bytes())
    }

    pub fn is_redelivery(&self) -> bool {
        self.receive_count > 1
    }
}

/// 清洗与特征工程阶段的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredFeatures {
    pub loan_amnt: f64,
    pub term: i32,
    pub int_rate: f64,
    pub installment: f64,
    pub emp_length: i32,
    pub annual_inc: f64,
    pub dti: f64,
    pub addr_state: String,
    pub credit_to_income_ratio: f64,
    pub is_self_employed: bool,
    pub loan_month: i32,
    pub is_long_term: bool,
}

/// 评分服务返回的风险分
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(pub f64);

/// 持久化的已评分申请记录，以 application_id 为主键做upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredApplication {
    pub application_id: Uuid,
    pub delivery_id: String,
    pub features: EngineeredFeatures,
    pub risk_score: f64,
    pub processed_at: DateTime<Utc>,
}

/// 工作流阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStage {
    #[serde(rename = "CLEAN")]
    Clean,
    #[serde(rename = "SCORE")]
    Score,
    #[serde(rename = "PERSIST")]
    Persist,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Clean => "CLEAN",
            WorkflowStage::Score => "SCORE",
            WorkflowStage::Persist => "PERSIST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLEAN" => Some(WorkflowStage::Clean),
            "SCORE" => Some(WorkflowStage::Score),
            "PERSIST" => Some(WorkflowStage::Persist),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个阶段执行的最终结局
///
/// 可重试失败在执行器的尝试循环内部消化，对控制器只暴露
/// 成功或致命失败两种结果。
#[derive(Debug)]
pub enum StageOutcome<T> {
    Success(T),
    Fatal { cause: PipelineError, attempts: u32 },
}

/// 工作流的终态，二者必居其一
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Succeeded {
        application_id: Uuid,
    },
    DeadLettered {
        application_id: Uuid,
        failed_stage: WorkflowStage,
    },
}

/// 账本条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerState {
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
}

/// 幂等账本条目（过期由存储层的TTL负责）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub application_id: Uuid,
    pub state: LedgerState,
}

/// 幂等检查的裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// 首次见到该自然键，铸造新的申请ID并放行
    Admitted(Uuid),
    /// 同一逻辑申请的工作流仍在进行中
    AlreadyInProgress,
    /// 同一逻辑申请已处理完成
    AlreadyCompleted,
}

/// 终态失败的死信记录，写入后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub application_id: Uuid,
    pub failed_stage: WorkflowStage,
    pub cause: String,
    pub original_input: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}
