pub mod app_config;
pub mod messaging;
pub mod stages;

pub use app_config::{
    AppConfig, DatabaseConfig, DispatcherConfig, ObservabilityConfig,
};
pub use messaging::{
    LedgerConfig, LedgerType, MessageQueueConfig, MessageQueueType, ScoringServiceConfig,
};
pub use stages::{JitterStrategy, StagePolicyConfig, StagesConfig};
