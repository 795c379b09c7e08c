//! Cohort Core 采集管道库
//!
//! 将在线玩家按评分桶分层，从搜索后端按复合条件有界采样合格玩家，
//! 再从归档后端分页拉取每个玩家的近期有评分对局，落地供离线分析。

pub mod client;
pub mod config;
pub mod criteria;
pub mod error;
pub mod hydrator;
pub mod pipeline;
pub mod policy;
pub mod ratelimit;
pub mod sampler;
pub mod secrets;
pub mod sink;

pub use client::{
    GameArchiveApi, GameArchiveClient, GameQuerySpec, GameRecord, UserPropertiesApi,
    UserPropertiesClient, UserRecord,
};
pub use config::{BucketConfig, EndpointConfig, PipelineConfig, RetryConfig};
pub use criteria::{
    BinaryOperator, CriteriaBuilder, CriteriaSet, Criterion, LogicalOperator, QualityFilters,
    SampleBucket, TimeClass,
};
pub use error::{FaultKind, PipelineError, Result, UpstreamFault};
pub use hydrator::{GameHydrator, HydrationOutcome};
pub use pipeline::{BucketPipeline, PlayerFailure, RunReport};
pub use policy::RetryPolicy;
pub use ratelimit::RateLimiter;
pub use sampler::UserSampler;
pub use secrets::Credentials;
pub use sink::{JsonFileSink, ResultSink, SqliteSink};
