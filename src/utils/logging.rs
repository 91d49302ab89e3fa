/// 日志工具模块
///
/// 提供日志初始化和输出格式化的辅助函数
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化全局日志
///
/// 级别通过 RUST_LOG 环境变量控制，未设置时默认 info。
pub fn init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_short_passthrough() {
        assert_eq!(truncate_text("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_text_counts_chars_not_bytes() {
        assert_eq!(truncate_text("一二三四五六", 3), "一二三...");
    }
}
