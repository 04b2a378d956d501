use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use pipeline_core::config::{DispatcherConfig, MessageQueueConfig};
use pipeline_core::PipelineResult;
use pipeline_domain::entities::{AdmissionDecision, ApplicationMessage, WorkflowOutcome};
use pipeline_domain::ledger::IdempotencyLedger;
use pipeline_domain::messaging::ApplicationQueue;

use crate::workflow::{WorkflowController, WorkflowExecution};

/// 申请分发器
///
/// 按批从进件队列拉取消息，经幂等账本去重后为每条新申请启动
/// 一个独立的工作流任务。消息只有在工作流到达终态（成功或
/// 死信）后才被确认；重复投递直接确认并丢弃。除账本外没有
/// 任何跨执行的共享可变状态。
#[derive(Clone)]
pub struct ApplicationDispatcher {
    queue: Arc<dyn ApplicationQueue>,
    ledger: Arc<dyn IdempotencyLedger>,
    controller: Arc<WorkflowController>,
    queue_config: MessageQueueConfig,
    config: DispatcherConfig,
}

impl ApplicationDispatcher {
    pub fn new(
        queue: Arc<dyn ApplicationQueue>,
        ledger: Arc<dyn IdempotencyLedger>,
        controller: Arc<WorkflowController>,
        queue_config: MessageQueueConfig,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            ledger,
            controller,
            queue_config,
            config,
        }
    }

    /// 消费循环：拉取一批、并发处理、等待整批终态后再拉下一批。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> PipelineResult<()> {
        info!(
            queue = %self.queue_config.application_queue,
            batch_size = self.queue_config.batch_size,
            "启动申请分发器"
        );

        loop {
            let batch = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("分发器收到关闭信号");
                    break;
                }
                batch = self.queue.receive_batch(
                    self.queue_config.batch_size,
                    Duration::from_secs(self.queue_config.wait_seconds),
                ) => batch,
            };

            match batch {
                Ok(messages) if messages.is_empty() => continue,
                Ok(messages) => self.dispatch_batch(messages).await,
                Err(e) => {
                    error!("拉取进件消息失败: {}", e);
                    tokio::time::sleep(Duration::from_secs(self.config.error_backoff_seconds))
                        .await;
                }
            }
        }

        info!("申请分发器已停止");
        Ok(())
    }

    /// 同一批内的消息并发处理，每条消息独占一个工作流任务。
    pub async fn dispatch_batch(&self, messages: Vec<ApplicationMessage>) {
        debug!("收到 {} 条进件消息", messages.len());

        let mut handles = Vec::with_capacity(messages.len());
        for message in messages {
            let dispatcher = self.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.handle_message(message).await;
            }));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("工作流任务异常退出: {}", e);
            }
        }
    }

    /// 处理单条消息：去重、启动工作流、终态后确认。
    pub async fn handle_message(&self, message: ApplicationMessage) {
        let natural_key = message.natural_key();
        let delivery_id = message.delivery_id.clone();

        match self.ledger.begin_or_reject(natural_key).await {
            Ok(AdmissionDecision::Admitted(application_id)) => {
                info!(
                    %application_id,
                    %natural_key,
                    delivery_id = %delivery_id,
                    "申请已放行，启动工作流"
                );
                metrics::counter!("pipeline_messages_admitted_total").increment(1);

                let execution = WorkflowExecution::new(application_id, natural_key, message);
                match self.controller.run(execution).await {
                    WorkflowOutcome::Succeeded { application_id } => {
                        debug!(%application_id, "工作流成功，确认消息");
                    }
                    WorkflowOutcome::DeadLettered {
                        application_id,
                        failed_stage,
                    } => {
                        warn!(
                            %application_id,
                            stage = %failed_stage,
                            "工作流进入死信，确认消息"
                        );
                    }
                }
                // 成功与死信都是终态，消息都要确认移除
                if let Err(e) = self.queue.ack(&delivery_id).await {
                    error!(delivery_id = %delivery_id, "确认消息失败: {}", e);
                }
            }
            Ok(AdmissionDecision::AlreadyInProgress) => {
                debug!(%natural_key, "重复投递：同一申请的工作流仍在进行，直接确认");
                metrics::counter!("pipeline_messages_duplicate_total", "state" => "in_progress")
                    .increment(1);
                if let Err(e) = self.queue.ack(&delivery_id).await {
                    error!(delivery_id = %delivery_id, "确认重复消息失败: {}", e);
                }
            }
            Ok(AdmissionDecision::AlreadyCompleted) => {
                debug!(%natural_key, "重复投递：同一申请已处理完成，直接确认");
                metrics::counter!("pipeline_messages_duplicate_total", "state" => "completed")
                    .increment(1);
                if let Err(e) = self.queue.ack(&delivery_id).await {
                    error!(delivery_id = %delivery_id, "确认重复消息失败: {}", e);
                }
            }
            Err(e) => {
                // 账本不可用时既不放行也不确认，把消息留给下一次投递
                error!(%natural_key, "幂等检查失败，消息退回队列: {}", e);
                metrics::counter!("pipeline_ledger_errors_total").increment(1);
                if let Err(nack_err) = self.queue.nack(&delivery_id, true).await {
                    error!(delivery_id = %delivery_id, "退回消息失败: {}", nack_err);
                }
            }
        }
    }
}
