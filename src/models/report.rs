use super::note::ProcessingOutcome;
use super::note_type::FieldMode;

/// 单个字段的校验问题
#[derive(Debug, Clone)]
pub struct FieldIssue {
    pub note_id: i64,
    pub field_name: String,
    /// 字段的期望模式；模型不匹配这类非字段问题为 None
    pub expected_mode: Option<FieldMode>,
    pub current_value: String,
    pub message: String,
}

/// 一批笔记的校验报告
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub total_notes: usize,
    pub valid_notes: usize,
    pub invalid_notes: usize,
    pub errors: Vec<FieldIssue>,
}

/// 预览中的单条笔记样本
#[derive(Debug, Clone)]
pub struct NoteSample {
    pub note_id: i64,
    /// 部分字段的 (字段名, 截断后的值)，按字段名排序
    pub fields: Vec<(String, String)>,
}

/// 牌组处理前的预览
#[derive(Debug, Clone)]
pub struct DeckPreview {
    pub deck_name: String,
    pub note_type: String,
    pub total_notes: usize,
    pub samples: Vec<NoteSample>,
    pub validation: ValidationReport,
}

/// 一次牌组处理的汇总报告
#[derive(Debug, Clone)]
pub struct DeckReport {
    pub deck_name: String,
    pub note_type: String,
    /// 查询到的笔记总数
    pub total_notes: usize,
    /// 校验不通过被跳过的数量
    pub skipped_invalid: usize,
    /// 实际进入处理流程的数量
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 成功中命中处理缓存的数量
    pub from_cache: usize,
    pub elapsed_secs: f64,
    pub dry_run: bool,
    /// 整体状态说明（试运行、校验中止等场景）
    pub status: Option<String>,
    pub outcomes: Vec<ProcessingOutcome>,
}

impl DeckReport {
    /// 从处理结果汇总报告
    pub fn summarize(
        deck_name: impl Into<String>,
        note_type: impl Into<String>,
        total_notes: usize,
        skipped_invalid: usize,
        outcomes: Vec<ProcessingOutcome>,
        elapsed_secs: f64,
    ) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        let from_cache = outcomes.iter().filter(|o| o.is_from_cache()).count();

        Self {
            deck_name: deck_name.into(),
            note_type: note_type.into(),
            total_notes,
            skipped_invalid,
            attempted: outcomes.len(),
            succeeded,
            failed,
            from_cache,
            elapsed_secs,
            dry_run: false,
            status: None,
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_summarize_counts() {
        let outcomes = vec![
            ProcessingOutcome::succeeded(1, HashMap::new(), None),
            ProcessingOutcome::from_cache(2),
            ProcessingOutcome::failed(3, "生成失败"),
        ];
        let report = DeckReport::summarize("English", "ForkLapisForEnglsih", 5, 2, outcomes, 1.5);

        assert_eq!(report.total_notes, 5);
        assert_eq!(report.skipped_invalid, 2);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.from_cache, 1);
        assert!(!report.dry_run);
    }
}
