//! JSON 文件落地
//!
//! 每个数据集一个 `<name>.json`，先写临时文件再同目录改名，
//! 调用方看不到写了一半的文件。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use tracing::info;

use crate::client::GameRecord;
use crate::criteria::SampleBucket;
use crate::error::{PipelineError, Result};

use super::{ResultSink, games_dataset_name, users_dataset_name};

#[derive(Clone)]
pub struct JsonFileSink {
    root: PathBuf,
}

impl JsonFileSink {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    async fn write_dataset<T: Serialize>(&self, name: &str, payload: &T) -> Result<String> {
        let bytes = serde_json::to_vec_pretty(payload)
            .map_err(|err| PipelineError::Storage(err.to_string()))?;
        let target = self.root.join(format!("{}.json", name));
        let staging = self.root.join(format!(".{}.json.tmp", name));
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &target).await?;
        info!(dataset = name, path = %target.display(), "dataset persisted");
        Ok(name.to_string())
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn persist_users(&self, bucket: &SampleBucket, usernames: &[String]) -> Result<String> {
        self.write_dataset(&users_dataset_name(bucket), &usernames)
            .await
    }

    async fn persist_games(
        &self,
        bucket: &SampleBucket,
        games: &BTreeMap<String, Vec<GameRecord>>,
    ) -> Result<String> {
        self.write_dataset(&games_dataset_name(bucket), games).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cohort-sink-{}-{}", tag, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_persist_users_writes_ordered_list() {
        let root = temp_root("users");
        let sink = JsonFileSink::new(&root).unwrap();
        let bucket = SampleBucket::new(2900, 3000, 200);
        let usernames: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let dataset = sink.persist_users(&bucket, &usernames).await.unwrap();
        assert_eq!(dataset, "users_2900_3000");

        let raw = std::fs::read_to_string(root.join("users_2900_3000.json")).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, usernames);
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_persist_is_idempotent_overwrite() {
        let root = temp_root("overwrite");
        let sink = JsonFileSink::new(&root).unwrap();
        let bucket = SampleBucket::new(1000, 2000, 200);

        sink.persist_users(&bucket, &["x".to_string(), "y".to_string()])
            .await
            .unwrap();
        sink.persist_users(&bucket, &["z".to_string()]).await.unwrap();

        let raw = std::fs::read_to_string(root.join("users_1000_2000.json")).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec!["z".to_string()]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_no_staging_file_left_behind() {
        let root = temp_root("staging");
        let sink = JsonFileSink::new(&root).unwrap();
        let bucket = SampleBucket::new(1000, 2000, 200);
        sink.persist_users(&bucket, &["a".to_string()]).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(&root)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_persist_games_grouped_by_player() {
        let root = temp_root("games");
        let sink = JsonFileSink::new(&root).unwrap();
        let bucket = SampleBucket::new(2900, 3000, 200);

        let mut games = BTreeMap::new();
        games.insert(
            "a".to_string(),
            vec![GameRecord {
                game: json!({"end_time": 5}),
                eco_metadata: Some(json!({"eco": "B90"})),
            }],
        );
        let dataset = sink.persist_games(&bucket, &games).await.unwrap();
        assert_eq!(dataset, "games_2900_3000");

        let raw = std::fs::read_to_string(root.join("games_2900_3000.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["a"][0]["game"]["end_time"], 5);
        std::fs::remove_dir_all(&root).ok();
    }
}
