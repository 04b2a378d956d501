//! 流水线编排引擎
//!
//! 把进件队列中的贷款申请消息变成可靠执行的三阶段工作流：
//! 清洗 → 评分 → 持久化。幂等账本保证同一逻辑申请至多一次
//! 处理，阶段执行器提供有界重试，死信报告器保证终态失败可见。

pub mod dead_letter;
pub mod dispatcher;
pub mod retry_policy;
pub mod stage_executor;
pub mod workflow;

pub use dead_letter::DeadLetterReporter;
pub use dispatcher::ApplicationDispatcher;
pub use retry_policy::RetryPolicy;
pub use stage_executor::StageExecutor;
pub use workflow::{StagePolicies, WorkflowController, WorkflowExecution};
