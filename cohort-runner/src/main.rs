//! 采集管道入口
//!
//! 启动顺序：日志、配置、凭证校验（任一缺失即失败退出，不发起
//! 任何网络调用）、客户端构造，随后逐桶执行参数化运行。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};

use cohort_core::{
    BucketPipeline, Credentials, CriteriaBuilder, GameArchiveClient, GameHydrator, JsonFileSink,
    PipelineConfig, RateLimiter, ResultSink, SqliteSink, UserPropertiesClient, UserSampler,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref())?;

    // 凭证在任何组件构造之前加载校验
    let credentials = Credentials::from_env()?;

    let timeout = config.request_timeout();
    let search_client = Arc::new(UserPropertiesClient::new(
        &config.endpoints.user_properties,
        &credentials.user_properties_api_key,
        timeout,
    )?);
    let archive_client = Arc::new(GameArchiveClient::new(
        &config.endpoints.game_archive,
        &credentials.game_archive_api_key,
        timeout,
    )?);

    let limiter = Arc::new(RateLimiter::new(config.requests_per_second));
    let policy = config.retry_policy();
    let sampler = UserSampler::new(
        search_client,
        CriteriaBuilder::new(config.time_class, config.filters.clone()),
        policy.clone(),
        limiter.clone(),
    );
    let hydrator = Arc::new(GameHydrator::new(
        archive_client,
        policy,
        limiter,
        config.time_class,
        config.game_per_player,
        config.max_hydration_pages,
    ));
    let sink: Arc<dyn ResultSink> = if config.sqlite_output() {
        Arc::new(SqliteSink::connect(&config.output_location).await?)
    } else {
        Arc::new(JsonFileSink::new(&config.output_location)?)
    };
    let pipeline = BucketPipeline::new(
        sampler,
        hydrator,
        sink,
        config.include_games,
        config.worker_count,
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, letting in-flight work finish");
            let _ = cancel_tx.send(true);
        }
    });

    for bucket in config.sample_buckets() {
        if *cancel_rx.borrow() {
            info!("run cancelled, skipping remaining buckets");
            break;
        }
        match pipeline.run(&bucket, cancel_rx.clone()).await {
            Ok(report) => {
                for failure in &report.failures {
                    warn!(
                        username = %failure.username,
                        fault = %failure.fault,
                        "player skipped"
                    );
                }
            }
            Err(err) => {
                error!(
                    rating_min = bucket.rating_min,
                    rating_max = bucket.rating_max,
                    error = %err,
                    "bucket run failed"
                );
            }
        }
    }

    Ok(())
}
