use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::messaging::{LedgerConfig, MessageQueueConfig, ScoringServiceConfig};
use super::stages::StagesConfig;
use crate::errors::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/loan_pipeline".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

/// 分发器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    /// 消费出错后的退避时间（秒）
    pub error_backoff_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            error_backoff_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_bind_address: "127.0.0.1:9090".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub message_queue: MessageQueueConfig,
    pub ledger: LedgerConfig,
    pub dispatcher: DispatcherConfig,
    pub stages: StagesConfig,
    pub scoring: ScoringServiceConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：TOML文件 + `PIPELINE__`前缀的环境变量覆盖。
    /// 未指定路径时按默认路径列表查找，找不到则使用内置默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/pipeline.toml",
                "pipeline.toml",
                "/etc/loan-pipeline/config.toml",
            ];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("PIPELINE")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("解析配置失败")?;

        config.validate().context("配置验证失败")?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.database.url.is_empty() {
            return Err(PipelineError::config_error("database.url 不能为空"));
        }
        if self.database.max_connections == 0 {
            return Err(PipelineError::config_error(
                "database.max_connections 必须大于 0",
            ));
        }
        self.message_queue.validate()?;
        self.ledger.validate()?;
        self.stages.validate()?;
        self.scoring.validate()?;
        Ok(())
    }
}
