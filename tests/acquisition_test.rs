// 采集管道集成测试 - 通过公共 API 走完采样到落地的完整链路
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use cohort_core::client::{
    HydrateGamesRequest, HydrateGamesResponse, HydratedGame, PropertyValue,
    SearchUserPropertiesRequest, SearchUserPropertiesResponse, UserPropertyBundle,
};
use cohort_core::{
    BucketPipeline, CriteriaBuilder, FaultKind, GameArchiveApi, GameHydrator, JsonFileSink,
    QualityFilters, RateLimiter, RetryPolicy, SampleBucket, TimeClass, UpstreamFault,
    UserPropertiesApi, UserSampler,
};

struct ScriptedSearch {
    usernames: Vec<&'static str>,
    calls: AtomicU32,
}

#[async_trait]
impl UserPropertiesApi for ScriptedSearch {
    async fn search_user_properties(
        &self,
        request: &SearchUserPropertiesRequest,
    ) -> Result<SearchUserPropertiesResponse, UpstreamFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.limit, 200);
        let user_properties = self
            .usernames
            .iter()
            .map(|name| {
                let mut properties = HashMap::new();
                properties.insert(
                    "username".to_string(),
                    PropertyValue {
                        value: name.to_string(),
                    },
                );
                UserPropertyBundle { properties }
            })
            .collect();
        Ok(SearchUserPropertiesResponse { user_properties })
    }
}

/// 页大小 100，依次返回 100、100、37 条记录
struct PagedArchive {
    calls: AtomicU32,
}

#[async_trait]
impl GameArchiveApi for PagedArchive {
    async fn hydrate_games(
        &self,
        request: &HydrateGamesRequest,
    ) -> Result<HydrateGamesResponse, UpstreamFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let page = request.criteria.page;
        assert!(page <= 3, "no page beyond the first short page");
        let count = match page {
            1 | 2 => 100,
            _ => 37,
        };
        let base = 10_000_000 - i64::from(page) * 1_000;
        let hydrated_games = (0..count)
            .map(|index| HydratedGame {
                game: json!({"end_time": base - i64::from(index)}),
                eco_metadata: Some(json!({"eco": "B12"})),
            })
            .collect();
        Ok(HydrateGamesResponse { hydrated_games })
    }
}

fn temp_root(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "cohort-acceptance-{}-{}",
        tag,
        uuid::Uuid::new_v4()
    ))
}

#[tokio::test]
async fn test_bucket_run_end_to_end() {
    let _ = tracing_subscriber::fmt::try_init();

    let root = temp_root("run");
    let limiter = Arc::new(RateLimiter::new(0.0));
    let policy = RetryPolicy::from_config(2, 1, 5, 2.0, 0.0);
    let search = Arc::new(ScriptedSearch {
        usernames: vec!["a", "b", "c", "d", "e"],
        calls: AtomicU32::new(0),
    });
    let archive = Arc::new(PagedArchive {
        calls: AtomicU32::new(0),
    });

    let sampler = UserSampler::new(
        search.clone(),
        CriteriaBuilder::new(TimeClass::Blitz, QualityFilters::default()),
        policy.clone(),
        limiter.clone(),
    );
    let hydrator = Arc::new(GameHydrator::new(
        archive.clone(),
        policy,
        limiter,
        TimeClass::Blitz,
        100,
        50,
    ));
    let sink = Arc::new(JsonFileSink::new(&root).unwrap());
    let pipeline = BucketPipeline::new(sampler, hydrator, sink, true, 2);

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let report = pipeline
        .run(&SampleBucket::new(2900, 3000, 200), cancel_rx)
        .await
        .unwrap();

    // 采样：一次有界请求，5 个用户按原顺序返回
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.sampled, 5);
    assert_eq!(report.users_dataset, "users_2900_3000");

    // 水合：每个玩家 3 页（100+100+37），不存在第 4 页请求
    assert_eq!(report.total_games, 5 * 237);
    assert_eq!(archive.calls.load(Ordering::SeqCst), 15);
    assert!(report.failures.is_empty());

    let raw = std::fs::read_to_string(root.join("users_2900_3000.json")).unwrap();
    let usernames: Vec<String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(usernames, vec!["a", "b", "c", "d", "e"]);

    let raw = std::fs::read_to_string(root.join("games_2900_3000.json")).unwrap();
    let games: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(games["a"].as_array().unwrap().len(), 237);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_invalid_bucket_rejected_without_network() {
    let _ = tracing_subscriber::fmt::try_init();

    let limiter = Arc::new(RateLimiter::new(0.0));
    let search = Arc::new(ScriptedSearch {
        usernames: vec!["a"],
        calls: AtomicU32::new(0),
    });
    let sampler = UserSampler::new(
        search.clone(),
        CriteriaBuilder::new(TimeClass::Blitz, QualityFilters::default()),
        RetryPolicy::default(),
        limiter,
    );

    let err = sampler
        .sample(&SampleBucket::new(3000, 2900, 200))
        .await
        .unwrap_err();
    assert!(matches!(err, cohort_core::PipelineError::Validation(_)));
    assert_eq!(search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_always_rate_limited_backend_exhausts_attempts() {
    let _ = tracing_subscriber::fmt::try_init();

    struct Throttled {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GameArchiveApi for Throttled {
        async fn hydrate_games(
            &self,
            _request: &HydrateGamesRequest,
        ) -> Result<HydrateGamesResponse, UpstreamFault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamFault::new(
                FaultKind::RateLimited,
                "resource_exhausted",
                "request budget exceeded",
            ))
        }
    }

    let archive = Arc::new(Throttled {
        calls: AtomicU32::new(0),
    });
    let hydrator = GameHydrator::new(
        archive.clone(),
        RetryPolicy::from_config(3, 1, 5, 2.0, 0.0),
        Arc::new(RateLimiter::new(0.0)),
        TimeClass::Blitz,
        100,
        50,
    );

    let outcome = hydrator.hydrate("p1").await;
    assert_eq!(archive.calls.load(Ordering::SeqCst), 3);
    assert!(outcome.games.is_empty());
    let fault = outcome.fault.unwrap();
    assert_eq!(fault.kind, FaultKind::Transient);
    assert_eq!(fault.code, "resource_exhausted");
}
