//! 处理进度跟踪
//!
//! 供并发任务共享的计数器，每处理 10 条或全部完成时输出一次进度日志。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tracing::info;

/// 进度跟踪器
pub struct ProgressTracker {
    total: usize,
    processed: AtomicUsize,
    errors: AtomicUsize,
    start: Instant,
    description: String,
}

impl ProgressTracker {
    pub fn new(total: usize, description: impl Into<String>) -> Self {
        Self {
            total,
            processed: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            start: Instant::now(),
            description: description.into(),
        }
    }

    /// 记录一条处理完成
    pub fn update(&self, success: bool) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if !success {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        if processed % 10 == 0 || processed == self.total {
            self.log_progress(processed);
        }
    }

    fn log_progress(&self, processed: usize) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            processed as f64 / elapsed
        } else {
            0.0
        };
        let percent = processed as f64 / self.total.max(1) as f64 * 100.0;

        info!(
            "📊 {}: {}/{} ({:.1}%) 失败: {} 速率: {:.1}/秒",
            self.description,
            processed,
            self.total,
            percent,
            self.errors.load(Ordering::SeqCst),
            rate
        );
    }

    /// 输出最终统计
    pub fn finish(&self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        info!(
            "✅ {} 完成: {}/{}，耗时 {:.1} 秒，失败 {}",
            self.description,
            self.processed.load(Ordering::SeqCst),
            self.total,
            elapsed,
            self.errors.load(Ordering::SeqCst)
        );
    }

    pub fn processed_count(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}
