//! 命名信号量池
//!
//! 每类外部依赖一个命名池，限制同类远程调用的并发数量。
//! 许可在 await 点等待，拿到后随守卫对象的释放自动归还。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::Config;

/// 文本生成调用的池名
pub const POOL_OPENAI_TEXT: &str = "openai_text";
/// 语音合成调用的池名
pub const POOL_OPENAI_TTS: &str = "openai_tts";
/// Anki 写回调用的池名
pub const POOL_ANKI_BATCH: &str = "anki_batch";

/// 命名信号量池
pub struct SemaphorePool {
    semaphores: HashMap<String, Arc<Semaphore>>,
}

impl SemaphorePool {
    pub fn new(limits: HashMap<String, usize>) -> Self {
        let semaphores = limits
            .into_iter()
            .map(|(name, limit)| (name, Arc::new(Semaphore::new(limit))))
            .collect();
        Self { semaphores }
    }

    /// 按配置注册三个标准池
    pub fn from_config(config: &Config) -> Self {
        Self::new(HashMap::from([
            (POOL_OPENAI_TEXT.to_string(), config.text_concurrency),
            (POOL_OPENAI_TTS.to_string(), config.tts_concurrency),
            (POOL_ANKI_BATCH.to_string(), config.anki_concurrency),
        ]))
    }

    /// 获取指定池的许可，池满时挂起等待
    ///
    /// # Panics
    ///
    /// 请求未注册的池名会直接 panic：池名写错属于编程错误，必须尽早暴露
    /// 而不是静默放行。
    pub async fn acquire(&self, name: &str) -> OwnedSemaphorePermit {
        let semaphore = self
            .semaphores
            .get(name)
            .unwrap_or_else(|| panic!("未注册的信号量池: {}", name));

        semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("信号量池不会被关闭")
    }
}
