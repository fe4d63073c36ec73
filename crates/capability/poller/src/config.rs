//! 轮询器参数与重连退避。

use std::time::Duration;

/// 轮询器与监督器参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// 首次重连等待
    pub reconnect_backoff: Duration,
    /// 重连等待上限
    pub reconnect_backoff_max: Duration,
    /// 看门狗检查周期
    pub watchdog_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(5),
            reconnect_backoff_max: Duration::from_secs(60),
            watchdog_interval: Duration::from_secs(5),
        }
    }
}

/// 指数退避：每次失败翻倍直到上限，连接成功后复位。
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new(config.reconnect_backoff, config.reconnect_backoff_max)
    }

    /// 本次等待时长，并推进到下一档。
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_ceiling_and_resets() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(5), Duration::from_secs(30));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn ceiling_below_base_is_raised() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}
