//! 上游故障分类与重试策略（指数退避加抖动）

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{FaultKind, UpstreamFault};

/// 按上游错误码与 HTTP 状态码归类故障
///
/// 错误码优先于状态码；两者都无法归类时返回 `Unknown`。
pub fn classify(code: &str, http_status: Option<u16>) -> FaultKind {
    match code {
        "resource_exhausted" => return FaultKind::RateLimited,
        "unavailable" | "deadline_exceeded" | "internal" => return FaultKind::Transient,
        "invalid_argument" | "malformed" | "out_of_range" => {
            return FaultKind::PermanentValidation;
        }
        "unauthenticated" | "permission_denied" => return FaultKind::AuthorizationDenied,
        _ => {}
    }
    match http_status {
        Some(429) => FaultKind::RateLimited,
        Some(status) if (500..=504).contains(&status) => FaultKind::Transient,
        Some(401) | Some(403) => FaultKind::AuthorizationDenied,
        Some(400) => FaultKind::PermanentValidation,
        _ => FaultKind::Unknown,
    }
}

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: f64,
    /// 抖动比例，0 表示无抖动
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        jitter_ratio: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            jitter_ratio,
        }
    }

    pub fn should_retry(&self, kind: FaultKind, attempt: u32) -> bool {
        kind.is_retryable() && attempt < self.max_attempts
    }

    /// 计算第 `attempt` 次重试前的延迟（指数退避，封顶后加抖动）
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = (self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
        .min(self.max_delay_ms as f64);
        let delay_ms = if self.jitter_ratio > 0.0 {
            let spread = base * self.jitter_ratio;
            let jittered = rand::thread_rng().gen_range(base - spread..=base + spread);
            jittered.min(self.max_delay_ms as f64)
        } else {
            base
        };
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// 带重试地执行一次上游调用
///
/// 仅对可重试分类退避重试；重试预算耗尽后把最后一次故障按
/// 瞬时故障上抛（原始诊断信息与尝试次数保留在故障内）。
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    service: &'static str,
    mut op: F,
) -> Result<T, UpstreamFault>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamFault>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(fault) => {
                attempt += 1;
                if policy.should_retry(fault.kind, attempt) {
                    let delay = policy.calculate_delay(attempt - 1);
                    warn!(
                        service,
                        code = %fault.code,
                        kind = %fault.kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retryable upstream fault, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                if fault.kind.is_retryable() {
                    warn!(
                        service,
                        code = %fault.code,
                        attempts = attempt,
                        "retry budget exhausted"
                    );
                    return Err(fault.exhausted(attempt));
                }
                return Err(fault);
            }
        }
    }
}
