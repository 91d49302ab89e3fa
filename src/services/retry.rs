//! 指数退避重试
//!
//! 只有被归类为瞬时故障的错误（限流、服务端错误）才会重试，
//! 业务性错误一律立即向上传播。

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::error::AppResult;

/// 重试策略：总尝试次数与退避参数
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次调用）
    pub max_retries: usize,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 60.0,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries as usize,
            base_delay_secs: config.retry_base_delay_secs,
            max_delay_secs: config.retry_max_delay_secs,
            exponential_base: config.retry_exponential_base,
        }
    }

    /// 第 attempt 次失败后的等待时长（attempt 从 0 计）
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let delay = self.base_delay_secs * self.exponential_base.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay_secs).max(0.0))
    }

    /// 执行一个可重试操作直到成功、耗尽次数或遇到不可重试错误
    ///
    /// 闭包每次调用都会重新构造 future，调用方负责在闭包内克隆所需参数。
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempts = self.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt + 1 >= attempts {
                        warn!("⚠️ {} 已达最大尝试次数 ({}): {}", operation_name, attempts, e);
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "⚠️ {} 第 {}/{} 次尝试失败，{:.1} 秒后重试: {}",
                        operation_name,
                        attempt + 1,
                        attempts,
                        delay.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
