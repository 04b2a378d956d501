//! 阶段协作方的具体实现
//!
//! 清洗/特征工程在进程内完成，评分通过HTTP调用外部模型服务。
//! 两者都只实现domain里的服务端口，编排引擎不感知具体实现。

pub mod feature_engineering;
pub mod scoring_client;

pub use feature_engineering::FeatureEngineeringService;
pub use scoring_client::HttpScoringClient;
