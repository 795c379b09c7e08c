//! 桶级采集编排
//!
//! 一次桶运行 = 一次采样调用，随后对每个采样用户做对局水合。
//! 水合由有界工作者池并发执行：工作者从共享队列领取用户，
//! 结果经 mpsc 汇入单一累积者，写路径不存在交错的并发写。
//! 采样失败向上传播（没有样本就没有可水合的用户）；单个用户的
//! 水合失败被就地容纳，不影响其他用户。运行总是以持久化一份
//! （可能部分、可能为空的）数据集收尾，被跳过或失败的条目带着
//! 分类诊断进日志。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::GameRecord;
use crate::criteria::SampleBucket;
use crate::error::{Result, UpstreamFault};
use crate::hydrator::{GameHydrator, HydrationOutcome};
use crate::sampler::UserSampler;
use crate::sink::ResultSink;

/// 单个玩家的水合失败记录
#[derive(Debug)]
pub struct PlayerFailure {
    pub username: String,
    pub fault: UpstreamFault,
}

/// 一次桶运行的结果汇总
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub bucket: SampleBucket,
    pub users_dataset: String,
    pub games_dataset: Option<String>,
    pub sampled: usize,
    pub hydrated_players: usize,
    pub total_games: usize,
    pub failures: Vec<PlayerFailure>,
    pub cancelled: bool,
}

pub struct BucketPipeline {
    sampler: UserSampler,
    hydrator: Arc<GameHydrator>,
    sink: Arc<dyn ResultSink>,
    include_games: bool,
    worker_count: usize,
}

impl BucketPipeline {
    pub fn new(
        sampler: UserSampler,
        hydrator: Arc<GameHydrator>,
        sink: Arc<dyn ResultSink>,
        include_games: bool,
        worker_count: usize,
    ) -> Self {
        Self {
            sampler,
            hydrator,
            sink,
            include_games,
            worker_count: worker_count.max(1),
        }
    }

    /// 执行一个桶的采样与水合
    ///
    /// 取消信号生效后不再发起新的出站调用，在途调用正常完成，
    /// 已完成用户的记录照常持久化。
    pub async fn run(
        &self,
        bucket: &SampleBucket,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            rating_min = bucket.rating_min,
            rating_max = bucket.rating_max,
            player_per_bucket = bucket.player_per_bucket,
            "bucket run started"
        );

        let users = self.sampler.sample(bucket).await?;
        let usernames: Vec<String> = users.iter().map(|u| u.username.clone()).collect();
        let users_dataset = self.sink.persist_users(bucket, &usernames).await?;

        let mut report = RunReport {
            run_id,
            started_at,
            bucket: *bucket,
            users_dataset,
            games_dataset: None,
            sampled: usernames.len(),
            hydrated_players: 0,
            total_games: 0,
            failures: Vec::new(),
            cancelled: *cancel.borrow(),
        };

        if self.include_games && !usernames.is_empty() {
            let (games, failures, hydrated_players) =
                self.hydrate_all(&usernames, cancel.clone()).await;
            report.total_games = games.values().map(Vec::len).sum();
            report.hydrated_players = hydrated_players;
            report.failures = failures;
            report.games_dataset = Some(self.sink.persist_games(bucket, &games).await?);
            report.cancelled = *cancel.borrow();
        }

        info!(
            %run_id,
            dataset = %report.users_dataset,
            sampled = report.sampled,
            hydrated = report.hydrated_players,
            games = report.total_games,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "bucket run finished"
        );
        Ok(report)
    }

    /// 有界工作者池 + 单累积者
    async fn hydrate_all(
        &self,
        usernames: &[String],
        cancel: watch::Receiver<bool>,
    ) -> (
        BTreeMap<String, Vec<GameRecord>>,
        Vec<PlayerFailure>,
        usize,
    ) {
        let (work_tx, work_rx) = mpsc::channel::<String>(usernames.len());
        for username in usernames {
            // 容量等于任务数，入队不会阻塞
            if work_tx.send(username.clone()).await.is_err() {
                break;
            }
        }
        drop(work_tx);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<HydrationOutcome>(self.worker_count);
        let mut workers = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let hydrator = self.hydrator.clone();
            let cancel = cancel.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    if *cancel.borrow() {
                        break;
                    }
                    let username = {
                        let mut rx = work_rx.lock().await;
                        match rx.recv().await {
                            Some(username) => username,
                            None => break,
                        }
                    };
                    let outcome = hydrator.hydrate_until(&username, &cancel).await;
                    if result_tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut games = BTreeMap::new();
        let mut failures = Vec::new();
        let mut hydrated_players = 0usize;
        while let Some(outcome) = result_rx.recv().await {
            let HydrationOutcome {
                player_id,
                games: player_games,
                fault,
                pages_fetched: _,
            } = outcome;
            match fault {
                None => hydrated_players += 1,
                Some(fault) => {
                    warn!(
                        username = %player_id,
                        code = %fault.code,
                        kind = %fault.kind,
                        kept_games = player_games.len(),
                        "player hydration failed, partial result kept"
                    );
                    failures.push(PlayerFailure {
                        username: player_id.clone(),
                        fault,
                    });
                }
            }
            if !player_games.is_empty() {
                games.insert(player_id, player_games);
            }
        }

        for worker in workers {
            if let Err(err) = worker.await {
                error!(?err, "hydration worker panicked");
            }
        }

        (games, failures, hydrated_players)
    }
}
