use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use pipeline_core::config::ScoringServiceConfig;
use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::entities::{EngineeredFeatures, RiskScore};
use pipeline_domain::services::ScoringService;

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    risk_score: Option<f64>,
}

/// 把非200状态码映射为流水线错误。
///
/// 429（限流）和5xx视为可重试的基础设施故障；其余非200状态
/// 说明请求本身有问题，重试不会有不同结果，按致命处理。
fn status_error(status: StatusCode) -> Option<PipelineError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(PipelineError::Throttled(
            "评分服务返回 HTTP 429 (Too Many Requests)".to_string(),
        ));
    }
    if status.is_server_error() {
        return Some(PipelineError::ExternalService(format!(
            "评分服务返回 HTTP {status}"
        )));
    }
    if !status.is_success() {
        return Some(PipelineError::Internal(format!(
            "评分服务返回非预期状态码 HTTP {status}"
        )));
    }
    None
}

/// HTTP评分服务客户端
///
/// 把工程化特征POST给外部模型服务，解析响应中的 `risk_score`。
/// 连接与请求超时来自配置；请求级超时之外还有阶段执行器的
/// 整体超时兜底。
pub struct HttpScoringClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpScoringClient {
    pub fn new(config: &ScoringServiceConfig) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_seconds))
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| PipelineError::config_error(format!("构建HTTP客户端失败: {e}")))?;

        info!(endpoint = %config.endpoint, "评分服务客户端就绪");
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ScoringService for HttpScoringClient {
    async fn score(&self, features: &EngineeredFeatures) -> PipelineResult<RiskScore> {
        debug!(endpoint = %self.endpoint, "调用评分服务");

        let response = self
            .client
            .post(&self.endpoint)
            .json(features)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::timeout_error(format!("评分服务请求超时: {e}"))
                } else {
                    PipelineError::ExternalService(format!("评分服务请求失败: {e}"))
                }
            })?;

        if let Some(err) = status_error(response.status()) {
            warn!(status = %response.status(), "评分服务返回异常状态");
            return Err(err);
        }

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Serialization(format!("解析评分响应失败: {e}")))?;

        let risk_score = body.risk_score.ok_or_else(|| {
            PipelineError::Internal("评分响应缺少 risk_score 字段".to_string())
        })?;

        debug!(risk_score, "评分服务返回风险分");
        Ok(RiskScore(risk_score))
    }
}
