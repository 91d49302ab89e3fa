//! 文本处理工具

use std::sync::OnceLock;

use regex::Regex;

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();

/// 把任意文本转成安全的文件名
///
/// 文件系统敏感字符替换为下划线，连续空白折叠为单个下划线，
/// 截断到指定长度后转为小写。
pub fn safe_filename(text: &str, max_length: usize) -> String {
    let unsafe_chars =
        UNSAFE_CHARS.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("无效的正则表达式"));
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("无效的正则表达式"));

    let replaced = unsafe_chars.replace_all(text, "_");
    let collapsed = whitespace.replace_all(replaced.trim(), "_");

    collapsed
        .chars()
        .take(max_length)
        .collect::<String>()
        .to_lowercase()
}

/// 从文本中提取 JSON 对象片段
///
/// 取第一个 `{` 到最后一个 `}` 之间的内容，容忍模型在 JSON 外
/// 包裹 markdown 代码块或说明文字。找不到完整对象时返回 None。
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename_replaces_and_lowercases() {
        assert_eq!(safe_filename("Hello World", 50), "hello_world");
        assert_eq!(safe_filename("a/b\\c:d", 50), "a_b_c_d");
        assert_eq!(safe_filename("  spaced   out  ", 50), "spaced_out");
    }

    #[test]
    fn test_safe_filename_truncates_by_chars() {
        let long = "word ".repeat(30);
        let name = safe_filename(&long, 10);
        assert_eq!(name.chars().count(), 10);
    }

    #[test]
    fn test_extract_json_block_from_fenced_output() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_block(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_block_plain_and_missing() {
        assert_eq!(extract_json_block("{\"a\": 1}"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block("} reversed {"), None);
    }
}
