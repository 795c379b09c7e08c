//! SQLite 落地
//!
//! 每个数据集一张表，表名即数据集键名。覆盖写在单个事务内完成
//! （删表、建表、整批插入一起提交），读侧要么看到旧数据集要么
//! 看到新数据集。产出的库可直接交给只读巡检工具。

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::QueryBuilder;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::client::GameRecord;
use crate::criteria::SampleBucket;
use crate::error::{PipelineError, Result};

use super::{ResultSink, games_dataset_name, users_dataset_name};

// 每批绑定参数不能超过 SQLite 的上限，按行数分批插入
const INSERT_CHUNK_ROWS: usize = 500;

pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ResultSink for SqliteSink {
    async fn persist_users(&self, bucket: &SampleBucket, usernames: &[String]) -> Result<String> {
        let name = users_dataset_name(bucket);
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", name))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE \"{}\" (position INTEGER PRIMARY KEY, username TEXT NOT NULL)",
            name
        ))
        .execute(&mut *tx)
        .await?;

        for (offset, chunk) in usernames.chunks(INSERT_CHUNK_ROWS).enumerate() {
            let mut builder = QueryBuilder::new(format!(
                "INSERT INTO \"{}\" (position, username)",
                name
            ));
            builder.push_values(chunk.iter().enumerate(), |mut row, (index, username)| {
                row.push_bind((offset * INSERT_CHUNK_ROWS + index) as i64)
                    .push_bind(username.as_str());
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        info!(dataset = %name, rows = usernames.len(), "dataset persisted");
        Ok(name)
    }

    async fn persist_games(
        &self,
        bucket: &SampleBucket,
        games: &BTreeMap<String, Vec<GameRecord>>,
    ) -> Result<String> {
        let name = games_dataset_name(bucket);

        let mut rows = Vec::new();
        for (username, records) in games {
            for (position, record) in records.iter().enumerate() {
                let game = serde_json::to_string(&record.game)
                    .map_err(|err| PipelineError::Storage(err.to_string()))?;
                let eco_metadata = record
                    .eco_metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|err| PipelineError::Storage(err.to_string()))?;
                rows.push((username.clone(), position as i64, game, eco_metadata));
            }
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{}\"", name))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE \"{}\" (username TEXT NOT NULL, position INTEGER NOT NULL, game TEXT NOT NULL, eco_metadata TEXT)",
            name
        ))
        .execute(&mut *tx)
        .await?;

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut builder = QueryBuilder::new(format!(
                "INSERT INTO \"{}\" (username, position, game, eco_metadata)",
                name
            ));
            builder.push_values(chunk, |mut row, (username, position, game, eco_metadata)| {
                row.push_bind(username.as_str())
                    .push_bind(*position)
                    .push_bind(game.as_str())
                    .push_bind(eco_metadata.as_deref());
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        info!(dataset = %name, rows = rows.len(), "dataset persisted");
        Ok(name)
    }
}
