//! 玩家对局水合
//!
//! 对单个玩家发出分页查询序列：从第 1 页起，整页返回就继续下一页，
//! 首个短页即数据尽头；配置的最大页数兜底上游永不报尾的情况。
//! 每页调用都经过故障分类与限速。单页的可重试故障只重试该页；
//! 不可重试故障终止该玩家的水合，但已收集的记录随故障指示一并返回，
//! 不影响其他玩家。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::client::{GameArchiveApi, GameQuerySpec, GameRecord, HydrateGamesRequest};
use crate::criteria::TimeClass;
use crate::error::UpstreamFault;
use crate::policy::{RetryPolicy, execute_with_retry};
use crate::ratelimit::RateLimiter;

const SERVICE: &str = "game-archive";

/// 一次水合运行的结果：可能完整，也可能部分加故障指示
#[derive(Debug)]
pub struct HydrationOutcome {
    pub player_id: String,
    pub games: Vec<GameRecord>,
    pub fault: Option<UpstreamFault>,
    pub pages_fetched: u32,
}

impl HydrationOutcome {
    pub fn is_complete(&self) -> bool {
        self.fault.is_none()
    }
}

pub struct GameHydrator {
    client: Arc<dyn GameArchiveApi>,
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    time_class: TimeClass,
    page_size: u32,
    max_pages: u32,
    mask_paths: Vec<String>,
}

impl GameHydrator {
    pub fn new(
        client: Arc<dyn GameArchiveApi>,
        policy: RetryPolicy,
        limiter: Arc<RateLimiter>,
        time_class: TimeClass,
        page_size: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            client,
            policy,
            limiter,
            time_class,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            mask_paths: vec!["eco_metadata".to_string()],
        }
    }

    /// 拉取一个玩家的近期有评分对局，按结束时间新到旧
    pub async fn hydrate(&self, player_id: &str) -> HydrationOutcome {
        self.hydrate_inner(player_id, None).await
    }

    /// 同 `hydrate`，但在每次发页前检查取消信号：收到取消后不再
    /// 发起新的页调用，已收集的记录原样返回
    pub async fn hydrate_until(
        &self,
        player_id: &str,
        cancel: &watch::Receiver<bool>,
    ) -> HydrationOutcome {
        self.hydrate_inner(player_id, Some(cancel)).await
    }

    async fn hydrate_inner(
        &self,
        player_id: &str,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> HydrationOutcome {
        let mut games: Vec<GameRecord> = Vec::new();
        let mut fault = None;
        let mut pages_fetched = 0u32;
        let mut last_end_time: Option<i64> = None;
        let mut spec = GameQuerySpec::recent_rated(player_id, self.time_class, 1, self.page_size);

        loop {
            if cancel.is_some_and(|flag| *flag.borrow()) {
                debug!(player_id, page = spec.page, "hydration cancelled between pages");
                break;
            }
            let request = HydrateGamesRequest::new(spec.clone(), self.mask_paths.clone());
            let client = self.client.clone();
            let limiter = self.limiter.clone();
            let result = execute_with_retry(&self.policy, SERVICE, move || {
                let client = client.clone();
                let limiter = limiter.clone();
                let request = request.clone();
                async move {
                    limiter.acquire().await;
                    client.hydrate_games(&request).await
                }
            })
            .await;

            match result {
                Ok(response) => {
                    pages_fetched += 1;
                    let count = response.hydrated_games.len() as u32;
                    for hydrated in response.hydrated_games {
                        let record = GameRecord::from(hydrated);
                        if let Some(end_time) = record.end_time() {
                            if last_end_time.is_some_and(|prev| end_time > prev) {
                                warn!(
                                    player_id,
                                    page = spec.page,
                                    "game records out of newest-first order"
                                );
                            }
                            last_end_time = Some(end_time);
                        }
                        games.push(record);
                    }
                    if count < self.page_size {
                        break;
                    }
                    if spec.page >= self.max_pages {
                        warn!(
                            player_id,
                            pages = pages_fetched,
                            "hydration page cap reached before end of data"
                        );
                        break;
                    }
                    spec = spec.next_page();
                }
                Err(page_fault) => {
                    warn!(
                        player_id,
                        page = spec.page,
                        code = %page_fault.code,
                        kind = %page_fault.kind,
                        collected = games.len(),
                        "hydration stopped on upstream fault, keeping partial result"
                    );
                    fault = Some(page_fault);
                    break;
                }
            }
        }

        debug!(
            player_id,
            games = games.len(),
            pages = pages_fetched,
            complete = fault.is_none(),
            "player hydrated"
        );
        HydrationOutcome {
            player_id: player_id.to_string(),
            games,
            fault,
            pages_fetched,
        }
    }
}
