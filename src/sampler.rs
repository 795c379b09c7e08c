//! 桶级用户采样
//!
//! 每个评分桶只发出一次有界搜索请求：上限由后端强制执行，
//! 客户端不做翻页补齐（刻意有界而非穷举）。结果按用户名去重，
//! 空结果是合法结论而非故障。

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{SearchUserPropertiesRequest, UserPropertiesApi, UserRecord};
use crate::criteria::{CriteriaBuilder, SampleBucket};
use crate::error::{PipelineError, Result};
use crate::policy::{RetryPolicy, execute_with_retry};
use crate::ratelimit::RateLimiter;

const SERVICE: &str = "user-properties";

/// 请求的属性集，用户名是采样结果的主键
const SAMPLE_PROPERTIES: &[&str] = &["username"];

pub struct UserSampler {
    client: Arc<dyn UserPropertiesApi>,
    builder: CriteriaBuilder,
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
}

impl UserSampler {
    pub fn new(
        client: Arc<dyn UserPropertiesApi>,
        builder: CriteriaBuilder,
        policy: RetryPolicy,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            builder,
            policy,
            limiter,
        }
    }

    /// 采样一个桶内的合格用户
    ///
    /// 桶参数不合法时在发起任何网络调用之前即返回校验错误；
    /// 上游故障经分类重试后仍失败的，向桶级调用方上抛。
    pub async fn sample(&self, bucket: &SampleBucket) -> Result<Vec<UserRecord>> {
        bucket.validate()?;

        let criteria = self.builder.build(bucket);
        let request = SearchUserPropertiesRequest::new(
            criteria,
            SAMPLE_PROPERTIES.iter().map(|p| p.to_string()).collect(),
            bucket.player_per_bucket,
        );

        let client = self.client.clone();
        let limiter = self.limiter.clone();
        let response = execute_with_retry(&self.policy, SERVICE, move || {
            let client = client.clone();
            let limiter = limiter.clone();
            let request = request.clone();
            async move {
                limiter.acquire().await;
                client.search_user_properties(&request).await
            }
        })
        .await
        .map_err(|fault| PipelineError::upstream(SERVICE, fault))?;

        let mut seen = HashSet::new();
        let mut users = Vec::new();
        for bundle in response.user_properties {
            let username = bundle
                .properties
                .get("username")
                .map(|v| v.value.clone())
                .unwrap_or_default();
            if username.is_empty() {
                warn!("sample entry without username property, skipping");
                continue;
            }
            if !seen.insert(username.clone()) {
                continue;
            }
            let properties = bundle
                .properties
                .into_iter()
                .map(|(name, prop)| (name, prop.value))
                .collect();
            users.push(UserRecord {
                username,
                properties,
            });
            if users.len() as u32 >= bucket.player_per_bucket {
                break;
            }
        }

        debug!(
            rating_min = bucket.rating_min,
            rating_max = bucket.rating_max,
            sampled = users.len(),
            "bucket sampled"
        );
        Ok(users)
    }
}
