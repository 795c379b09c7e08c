//! 结果持久化
//!
//! 数据集键名由桶边界确定性派生，不同桶之间绝不冲突。
//! 写入对调用方原子（不存在可见的半成品数据集），并且幂等：
//! 对同一桶身份重复持久化是覆盖而非追加，重跑安全。

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::client::GameRecord;
use crate::criteria::SampleBucket;
use crate::error::Result;

mod json;
mod sqlite;

pub use json::JsonFileSink;
pub use sqlite::SqliteSink;

/// 用户名数据集键名
pub fn users_dataset_name(bucket: &SampleBucket) -> String {
    format!("users_{}_{}", bucket.rating_min, bucket.rating_max)
}

/// 对局数据集键名
pub fn games_dataset_name(bucket: &SampleBucket) -> String {
    format!("games_{}_{}", bucket.rating_min, bucket.rating_max)
}

/// 采集结果的终点归属方
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// 持久化一个桶的有序用户名列表，返回数据集键名
    async fn persist_users(&self, bucket: &SampleBucket, usernames: &[String]) -> Result<String>;

    /// 持久化按玩家分组的水合对局记录，返回数据集键名
    async fn persist_games(
        &self,
        bucket: &SampleBucket,
        games: &BTreeMap<String, Vec<GameRecord>>,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_names_derived_from_bounds() {
        let bucket = SampleBucket::new(2900, 3000, 200);
        assert_eq!(users_dataset_name(&bucket), "users_2900_3000");
        assert_eq!(games_dataset_name(&bucket), "games_2900_3000");
    }

    #[test]
    fn test_dataset_names_do_not_collide_across_buckets() {
        let a = users_dataset_name(&SampleBucket::new(1000, 2000, 200));
        let b = users_dataset_name(&SampleBucket::new(2000, 3000, 200));
        assert_ne!(a, b);
    }
}
