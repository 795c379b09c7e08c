//! 出站请求限速
//!
//! 所有工作者共享一个限速器，每次出站调用前获取放行额度。
//! 实现为互斥保护的下一时隙时钟：持锁仅用于领取时隙，等待在锁外。

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// `requests_per_second` 不为正时限速器退化为直通
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// 等到属于本次调用的时隙
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let wake = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let wake = (*next).max(now);
            *next = wake + self.min_interval;
            wake
        };
        tokio::time::sleep_until(wake).await;
    }
}
