use std::time::Duration;

use pipeline_core::config::{JitterStrategy, StagePolicyConfig};

/// 延迟上限，防止极端配置下的指数爆炸
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// 单个阶段的重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 单次尝试的超时时间
    pub timeout: Duration,
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 基础重试间隔
    pub base_delay: Duration,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 抖动策略
    pub jitter: JitterStrategy,
    /// 单次延迟上限
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// 计算第 `attempt` 次失败后的退避延迟（attempt 从 1 开始）。
    ///
    /// 指数部分为 `base_delay * multiplier^(attempt-1)`；Full抖动时
    /// 实际延迟在 [0, 指数延迟] 内均匀随机。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let exponential = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = exponential.min(self.max_delay.as_secs_f64());

        let final_secs = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => rand::random::<f64>() * capped,
        };

        Duration::from_secs_f64(final_secs)
    }
}

impl From<&StagePolicyConfig> for RetryPolicy {
    fn from(config: &StagePolicyConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_seconds),
            max_attempts: config.max_attempts,
            base_delay: Duration::from_secs_f64(config.base_delay_seconds),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_secs: f64, multiplier: f64, jitter: JitterStrategy) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            base_delay: Duration::from_secs_f64(base_secs),
            backoff_multiplier: multiplier,
            jitter,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    #[test]
    fn test_no_jitter_is_deterministic_exponential() {
        let policy = policy(3.0, 1.5, JitterStrategy::None);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs_f64(3.0));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs_f64(4.5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs_f64(6.75));
    }

    #[test]
    fn test_full_jitter_within_bounds() {
        // base 5s、倍数2、Full抖动时第k次的延迟必须落在 [0, 5*2^(k-1)]
        let policy = policy(5.0, 2.0, JitterStrategy::Full);
        for attempt in 1..=3u32 {
            let upper = 5.0 * 2.0_f64.powi(attempt as i32 - 1);
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt).as_secs_f64();
                assert!(
                    (0.0..=upper).contains(&delay),
                    "attempt {attempt}: delay {delay} out of [0, {upper}]"
                );
            }
        }
    }

    #[test]
    fn test_delay_capped_at_max() {
        let mut policy = policy(100.0, 10.0, JitterStrategy::None);
        policy.max_delay = Duration::from_secs(120);
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(120));
    }

    #[test]
    fn test_from_stage_policy_config() {
        let config = StagePolicyConfig {
            timeout_seconds: 60,
            max_attempts: 3,
            base_delay_seconds: 5.0,
            backoff_multiplier: 2.0,
            jitter: JitterStrategy::Full,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.timeout, Duration::from_secs(60));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.jitter, JitterStrategy::Full);
    }
}
