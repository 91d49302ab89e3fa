//! 缓存键的规范化构造
//!
//! 同一逻辑输入必须得到完全相同的键：各组成部分统一转小写，
//! 连续空白折叠为单个下划线，再以下划线拼接。

/// 规范化键的单个组成部分
fn normalize_part(part: &str) -> String {
    part.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// 处理结果缓存的指纹：笔记 ID + 单词 + 例句
pub fn processing_key(note_id: i64, word: &str, sentence: &str) -> String {
    format!(
        "{}_{}_{}",
        note_id,
        normalize_part(word),
        normalize_part(sentence)
    )
}

/// 生成缓存的键：单词 + 例句
pub fn generation_key(word: &str, sentence: &str) -> String {
    format!("{}_{}", normalize_part(word), normalize_part(sentence))
}

/// 词频缓存的键：优先词典原形，退回单词本身
pub fn frequency_key(word: &str, lemma: Option<&str>) -> String {
    lemma
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(word)
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_key_is_deterministic() {
        let a = processing_key(1690123456789, "run", "He runs every morning.");
        let b = processing_key(1690123456789, "run", "He runs every morning.");
        assert_eq!(a, b);
    }

    #[test]
    fn test_processing_key_normalizes_case_and_whitespace() {
        let a = processing_key(42, "Run", "He  runs\tevery morning.");
        let b = processing_key(42, "run", "he runs every morning.");
        assert_eq!(a, b);
        assert_eq!(a, "42_run_he_runs_every_morning.");
    }

    #[test]
    fn test_different_inputs_differ() {
        let base = processing_key(1, "run", "He runs.");
        assert_ne!(base, processing_key(2, "run", "He runs."));
        assert_ne!(base, processing_key(1, "walk", "He runs."));
        assert_ne!(base, processing_key(1, "run", "He walks."));
    }

    #[test]
    fn test_generation_key_ignores_note_identity() {
        let a = generation_key("run", "He runs every morning.");
        let b = generation_key("RUN", "He runs every  morning.");
        assert_eq!(a, b);
        assert_eq!(a, "run_he_runs_every_morning.");
    }

    #[test]
    fn test_frequency_key_prefers_lemma() {
        assert_eq!(frequency_key("Running", Some("Run")), "run");
        assert_eq!(frequency_key("Running", Some("  ")), "running");
        assert_eq!(frequency_key("Running", None), "running");
    }
}
