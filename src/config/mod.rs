//! 管道配置
//!
//! 配置从 TOML 文件加载，环境变量可覆盖单项配置。
//! 每个桶就是一次参数化运行：桶列表、采样上限、每人对局数、
//! 输出位置等都由配置驱动，不存在写死参数的副本脚本。
//! 配置是显式传递的值，加载后在构造组件前完成校验。

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::criteria::{QualityFilters, SampleBucket, TimeClass};
use crate::error::{PipelineError, Result};
use crate::policy::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// 单个评分桶的边界
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BucketConfig {
    pub rating_min: u32,
    pub rating_max: u32,
}

/// 上游服务端点
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub user_properties: String,
    #[serde(default)]
    pub game_archive: String,
}

/// 重试参数
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_ratio() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(
            self.max_attempts,
            self.initial_delay_ms,
            self.max_delay_ms,
            self.backoff_multiplier,
            self.jitter_ratio,
        )
    }
}

/// 采集管道配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// 要采样的评分桶列表
    #[serde(default)]
    pub buckets: Vec<BucketConfig>,
    /// 每桶采样上限
    #[serde(default = "default_player_per_bucket")]
    pub player_per_bucket: u32,
    /// 每个玩家的分页大小
    #[serde(default = "default_game_per_player")]
    pub game_per_player: u32,
    /// 持久化目标：目录（JSON 文件）或 .sqlite3 文件
    #[serde(default = "default_output_location")]
    pub output_location: String,
    /// 分页安全上限
    #[serde(default = "default_max_hydration_pages")]
    pub max_hydration_pages: u32,
    /// 并发水合的工作者数量
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// 是否在用户名之外持久化水合对局
    #[serde(default)]
    pub include_games: bool,
    /// 被采样的评分维度
    #[serde(default = "default_time_class")]
    pub time_class: TimeClass,
    /// 出站请求预算（每秒）
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    /// 单次请求超时（毫秒），不存在跨越整个桶的超时
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub filters: QualityFilters,
}

fn default_player_per_bucket() -> u32 {
    200
}

fn default_game_per_player() -> u32 {
    100
}

fn default_output_location() -> String {
    "datasets".to_string()
}

fn default_max_hydration_pages() -> u32 {
    50
}

fn default_worker_count() -> usize {
    4
}

fn default_time_class() -> TimeClass {
    TimeClass::Blitz
}

fn default_requests_per_second() -> f64 {
    5.0
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl PipelineConfig {
    /// 从 TOML 文件加载并应用环境变量覆盖，返回前完成校验
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!("failed to read {}: {}", path.display(), err))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_overrides(|name| env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| PipelineError::Config(err.to_string()))
    }

    /// 环境变量覆盖，查找函数可注入便于测试
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "COHORT_PLAYER_PER_BUCKET", &mut self.player_per_bucket);
        override_parsed(&lookup, "COHORT_GAME_PER_PLAYER", &mut self.game_per_player);
        override_parsed(&lookup, "COHORT_MAX_HYDRATION_PAGES", &mut self.max_hydration_pages);
        override_parsed(&lookup, "COHORT_WORKER_COUNT", &mut self.worker_count);
        override_parsed(&lookup, "COHORT_REQUESTS_PER_SECOND", &mut self.requests_per_second);
        override_parsed(&lookup, "COHORT_INCLUDE_GAMES", &mut self.include_games);
        if let Some(value) = lookup("COHORT_OUTPUT_LOCATION") {
            self.output_location = value;
        }
        if let Some(value) = lookup("COHORT_USER_PROPERTIES_ENDPOINT") {
            self.endpoints.user_properties = value;
        }
        if let Some(value) = lookup("COHORT_GAME_ARCHIVE_ENDPOINT") {
            self.endpoints.game_archive = value;
        }

        // 两个边界都给出时，以单桶运行覆盖配置文件中的桶列表
        let rating_min = lookup("COHORT_RATING_MIN").and_then(|v| parse_or_warn("COHORT_RATING_MIN", &v));
        let rating_max = lookup("COHORT_RATING_MAX").and_then(|v| parse_or_warn("COHORT_RATING_MAX", &v));
        if let (Some(rating_min), Some(rating_max)) = (rating_min, rating_max) {
            self.buckets = vec![BucketConfig {
                rating_min,
                rating_max,
            }];
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.buckets.is_empty() {
            return Err(PipelineError::Config(
                "at least one bucket must be configured".to_string(),
            ));
        }
        for bucket in self.sample_buckets() {
            bucket.validate()?;
        }
        if self.game_per_player == 0 {
            return Err(PipelineError::Config(
                "game_per_player must be greater than zero".to_string(),
            ));
        }
        if self.max_hydration_pages == 0 {
            return Err(PipelineError::Config(
                "max_hydration_pages must be greater than zero".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(PipelineError::Config(
                "worker_count must be greater than zero".to_string(),
            ));
        }
        if self.endpoints.user_properties.is_empty() || self.endpoints.game_archive.is_empty() {
            return Err(PipelineError::Config(
                "endpoints.user_properties and endpoints.game_archive must be set".to_string(),
            ));
        }
        if !self.requests_per_second.is_finite() || self.requests_per_second < 0.0 {
            return Err(PipelineError::Config(
                "requests_per_second must be a non-negative number".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config(
                "retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sample_buckets(&self) -> Vec<SampleBucket> {
        self.buckets
            .iter()
            .map(|bucket| {
                SampleBucket::new(bucket.rating_min, bucket.rating_max, self.player_per_bucket)
            })
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 输出位置指向 .sqlite3 文件时走关系库落地，否则按目录写 JSON
    pub fn sqlite_output(&self) -> bool {
        self.output_location.ends_with(".sqlite3") || self.output_location.ends_with(".db")
    }
}

fn parse_or_warn<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(name, value, "ignoring unparsable override");
            None
        }
    }
}

fn override_parsed<T, F>(lookup: &F, name: &str, target: &mut T)
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(name) {
        if let Some(parsed) = parse_or_warn(name, &value) {
            *target = parsed;
        }
    }
}
