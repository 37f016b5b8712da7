// 重试策略
//
// 瞬时错误指数退避重试，不可重试错误立即失败

use crate::remote::{TransportError, TransportErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 初始退避延迟（毫秒）
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// 最大退避延迟（毫秒）
pub const MAX_BACKOFF_MS: u64 = 5000;

/// 限流时的额外等待时间（毫秒）
pub const RATE_LIMIT_BACKOFF_MS: u64 = 10000;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 瞬时错误最大重试次数
    pub max_retries: u32,
    /// 初始退避延迟（毫秒）
    pub initial_backoff_ms: u64,
    /// 最大退避延迟（毫秒）
    pub max_backoff_ms: u64,
    /// 限流时的最小等待时间（毫秒）
    pub rate_limit_backoff_ms: u64,
    /// 不可重试错误的立即尝试次数（1 表示不再尝试）
    pub non_transient_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            rate_limit_backoff_ms: RATE_LIMIT_BACKOFF_MS,
            non_transient_attempts: 1,
        }
    }
}

/// 单次失败后的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待后重试
    Backoff(Duration),
    /// 立即重试
    Immediate,
    /// 放弃，整个会话失败
    GiveUp,
}

impl RetryPolicy {
    /// 计算指数退避延迟
    ///
    /// # 延迟序列（默认配置）
    /// - retry_count=0: 100ms
    /// - retry_count=1: 200ms
    /// - retry_count=2: 400ms
    /// - retry_count=3: 800ms
    /// - 最大: 5000ms
    pub fn backoff_delay(&self, retry_count: u32, kind: TransportErrorKind) -> Duration {
        let factor = 2u64.saturating_pow(retry_count);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);

        // 限流时使用更长的等待时间
        let delay = if kind == TransportErrorKind::RateLimited {
            delay.max(self.rate_limit_backoff_ms)
        } else {
            delay
        };
        Duration::from_millis(delay)
    }

    /// 根据失败次数和错误类型决定下一步
    ///
    /// # 参数
    /// * `failures` - 该分片截至本次（含）的失败次数
    /// * `error` - 本次传输错误
    pub fn decide(&self, failures: u32, error: &TransportError) -> RetryDecision {
        if error.transient() {
            if failures > self.max_retries {
                RetryDecision::GiveUp
            } else {
                RetryDecision::Backoff(self.backoff_delay(failures - 1, error.kind))
            }
        } else if failures < self.non_transient_attempts {
            RetryDecision::Immediate
        } else {
            RetryDecision::GiveUp
        }
    }
}
