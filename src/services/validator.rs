//! 笔记校验
//!
//! 处理前检查每条笔记是否符合其笔记类型配置：
//! INPUT 字段必须已填写，GENERATE 字段必须为空，SKIP 字段不做检查。

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::{AnkiNote, FieldIssue, FieldMode, NoteTypeConfig, ValidationReport};
use crate::utils::logging::truncate_text;

/// 基于笔记类型注册表的校验器
pub struct NoteValidator {
    note_types: HashMap<String, NoteTypeConfig>,
}

impl NoteValidator {
    pub fn new(note_types: HashMap<String, NoteTypeConfig>) -> Self {
        Self { note_types }
    }

    pub fn get(&self, name: &str) -> Option<&NoteTypeConfig> {
        self.note_types.get(name)
    }

    /// 已注册的笔记类型名，按名称排序
    pub fn supported_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.note_types.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn require(&self, note_type: &str) -> AppResult<&NoteTypeConfig> {
        self.note_types
            .get(note_type)
            .ok_or_else(|| AppError::unknown_note_type(note_type, self.supported_names()))
    }

    /// 校验单条笔记，返回全部问题
    ///
    /// 模型名不匹配时直接返回这一个问题，不再继续检查字段。
    pub fn validate_note(&self, note: &AnkiNote, config: &NoteTypeConfig) -> Vec<FieldIssue> {
        if note.model_name != config.name {
            return vec![FieldIssue {
                note_id: note.note_id,
                field_name: "模型".to_string(),
                expected_mode: None,
                current_value: note.model_name.clone(),
                message: format!(
                    "笔记模型为 '{}'，与配置 '{}' 不符",
                    note.model_name, config.name
                ),
            }];
        }

        let mut field_names: Vec<&String> = config.fields.keys().collect();
        field_names.sort_unstable();

        let mut issues = Vec::new();
        for field_name in field_names {
            let spec = &config.fields[field_name];
            let value = note
                .fields
                .get(field_name)
                .map(String::as_str)
                .unwrap_or("");
            let trimmed = value.trim();

            match spec.mode {
                FieldMode::Input => {
                    if trimmed.is_empty() {
                        issues.push(FieldIssue {
                            note_id: note.note_id,
                            field_name: field_name.clone(),
                            expected_mode: Some(FieldMode::Input),
                            current_value: String::new(),
                            message: "输入字段处理前必须已填写".to_string(),
                        });
                    }
                }
                FieldMode::Generate => {
                    if !trimmed.is_empty() {
                        issues.push(FieldIssue {
                            note_id: note.note_id,
                            field_name: field_name.clone(),
                            expected_mode: Some(FieldMode::Generate),
                            current_value: truncate_text(value, 100),
                            message: "生成字段已有内容，处理前必须为空".to_string(),
                        });
                    }
                }
                FieldMode::Skip => {}
            }
        }
        issues
    }

    /// 校验一批笔记并汇总成报告
    pub fn validate_notes(
        &self,
        notes: &[AnkiNote],
        note_type: &str,
    ) -> AppResult<ValidationReport> {
        let config = self.require(note_type)?;

        let mut errors = Vec::new();
        let mut invalid_notes = 0;
        for note in notes {
            let issues = self.validate_note(note, config);
            if !issues.is_empty() {
                invalid_notes += 1;
                errors.extend(issues);
            }
        }

        Ok(ValidationReport {
            total_notes: notes.len(),
            valid_notes: notes.len() - invalid_notes,
            invalid_notes,
            errors,
        })
    }

    /// 拆分出可处理的笔记，不合格的记入报告
    pub fn filter_valid(
        &self,
        notes: Vec<AnkiNote>,
        note_type: &str,
    ) -> AppResult<(Vec<AnkiNote>, ValidationReport)> {
        let config = self.require(note_type)?;
        let total_notes = notes.len();

        let mut valid = Vec::with_capacity(total_notes);
        let mut errors = Vec::new();
        for note in notes {
            let issues = self.validate_note(&note, config);
            if issues.is_empty() {
                valid.push(note);
            } else {
                warn!(
                    "⚠️ 笔记 {} 校验不通过，共 {} 个问题",
                    note.note_id,
                    issues.len()
                );
                errors.extend(issues);
            }
        }

        let report = ValidationReport {
            total_notes,
            valid_notes: valid.len(),
            invalid_notes: total_notes - valid.len(),
            errors,
        };
        Ok((valid, report))
    }

    /// 判断一批笔记是否可以直接开始处理
    pub fn check_processing_readiness(
        &self,
        notes: &[AnkiNote],
        note_type: &str,
    ) -> AppResult<(bool, String)> {
        if notes.is_empty() {
            return Ok((false, "没有需要处理的笔记".to_string()));
        }

        let report = self.validate_notes(notes, note_type)?;
        if report.invalid_notes == 0 {
            Ok((true, format!("全部 {} 条笔记均可处理", report.total_notes)))
        } else {
            Ok((
                false,
                format!(
                    "{}/{} 条笔记存在校验问题，共 {} 个",
                    report.invalid_notes,
                    report.total_notes,
                    report.errors.len()
                ),
            ))
        }
    }

    /// 检查 Anki 中的实际字段是否覆盖配置要求的全部字段
    ///
    /// 返回 (是否兼容, 缺失的字段名列表)。
    pub fn check_compatibility(
        &self,
        anki_field_names: &[String],
        note_type: &str,
    ) -> AppResult<(bool, Vec<String>)> {
        let config = self.require(note_type)?;

        let available: HashSet<&str> = anki_field_names.iter().map(String::as_str).collect();
        let mut missing: Vec<String> = config
            .fields
            .keys()
            .filter(|name| !available.contains(name.as_str()))
            .cloned()
            .collect();
        missing.sort_unstable();

        Ok((missing.is_empty(), missing))
    }

    /// 把校验报告渲染成适合终端展示的多行文本
    pub fn format_report(report: &ValidationReport) -> String {
        let mut out = String::new();
        out.push_str("=== 笔记校验报告 ===\n");
        out.push_str(&format!("总计: {} 条\n", report.total_notes));

        let percent = if report.total_notes > 0 {
            report.valid_notes as f64 / report.total_notes as f64 * 100.0
        } else {
            0.0
        };
        out.push_str(&format!(
            "通过: {} 条 ({:.1}%)\n",
            report.valid_notes, percent
        ));
        out.push_str(&format!("不通过: {} 条\n", report.invalid_notes));

        if report.errors.is_empty() {
            return out;
        }

        let mut by_note: BTreeMap<i64, Vec<&FieldIssue>> = BTreeMap::new();
        for issue in &report.errors {
            by_note.entry(issue.note_id).or_default().push(issue);
        }

        out.push_str("\n问题明细:\n");
        for (note_id, issues) in by_note {
            out.push_str(&format!("  笔记 {}:\n", note_id));
            for issue in issues {
                let mode_tag = issue
                    .expected_mode
                    .map(|mode| format!("[{}] ", mode))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "    - {}{}: {}",
                    mode_tag, issue.field_name, issue.message
                ));
                if !issue.current_value.is_empty() {
                    out.push_str(&format!(" (当前值: {})", issue.current_value));
                }
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldSpec;

    fn test_config() -> NoteTypeConfig {
        NoteTypeConfig {
            name: "TestVocab".to_string(),
            fields: HashMap::from([
                ("Word".to_string(), FieldSpec::input()),
                ("Context".to_string(), FieldSpec::input()),
                ("Meaning".to_string(), FieldSpec::generate_from("definition")),
                ("Memo".to_string(), FieldSpec::skip()),
            ]),
            llm_prompt: String::new(),
            word_field: "Word".to_string(),
            sentence_field: "Context".to_string(),
            audio_field: None,
            freq_field: None,
        }
    }

    fn validator() -> NoteValidator {
        let config = test_config();
        NoteValidator::new(HashMap::from([(config.name.clone(), config)]))
    }

    fn make_note(note_id: i64, fields: Vec<(&str, &str)>) -> AnkiNote {
        AnkiNote {
            note_id,
            model_name: "TestVocab".to_string(),
            deck_name: "测试".to_string(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_unknown_note_type_is_error() {
        let v = validator();
        let notes = vec![make_note(1, vec![("Word", "cat")])];

        let result = v.validate_notes(&notes, "没有这个类型");
        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("没有这个类型"));
        assert!(message.contains("TestVocab"));
    }

    #[test]
    fn test_model_mismatch_stops_field_checks() {
        let v = validator();
        let config = test_config();
        let mut note = make_note(7, vec![]);
        note.model_name = "别的模型".to_string();

        let issues = v.validate_note(&note, &config);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].expected_mode, None);
        assert!(issues[0].message.contains("别的模型"));
    }

    #[test]
    fn test_input_and_generate_rules() {
        let v = validator();
        let config = test_config();
        let note = make_note(
            3,
            vec![
                ("Word", "   "),
                ("Context", "He runs."),
                ("Meaning", "已有释义"),
                ("Memo", "随便什么内容"),
            ],
        );

        let issues = v.validate_note(&note, &config);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].field_name, "Meaning");
        assert_eq!(issues[0].expected_mode, Some(FieldMode::Generate));
        assert_eq!(issues[0].current_value, "已有释义");
        assert_eq!(issues[1].field_name, "Word");
        assert_eq!(issues[1].expected_mode, Some(FieldMode::Input));
    }

    #[test]
    fn test_missing_field_counts_as_empty() {
        let v = validator();
        let config = test_config();
        let note = make_note(4, vec![("Word", "cat")]);

        let issues = v.validate_note(&note, &config);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field_name, "Context");
    }

    #[test]
    fn test_valid_note_has_no_issues() {
        let v = validator();
        let config = test_config();
        let note = make_note(
            5,
            vec![("Word", "cat"), ("Context", "The cat sleeps."), ("Meaning", "  ")],
        );

        assert!(v.validate_note(&note, &config).is_empty());
    }

    #[test]
    fn test_filter_valid_splits_batch() {
        let v = validator();
        let notes = vec![
            make_note(1, vec![("Word", "cat"), ("Context", "The cat sleeps.")]),
            make_note(2, vec![("Word", ""), ("Context", "No word here.")]),
            make_note(3, vec![("Word", "dog"), ("Context", "The dog barks.")]),
        ];

        let (valid, report) = v.filter_valid(notes, "TestVocab").unwrap();
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].note_id, 1);
        assert_eq!(valid[1].note_id, 3);
        assert_eq!(report.total_notes, 3);
        assert_eq!(report.invalid_notes, 1);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_readiness_messages() {
        let v = validator();

        let (ready, message) = v.check_processing_readiness(&[], "TestVocab").unwrap();
        assert!(!ready);
        assert!(message.contains("没有需要处理的笔记"));

        let good = vec![make_note(1, vec![("Word", "cat"), ("Context", "ok")])];
        let (ready, message) = v.check_processing_readiness(&good, "TestVocab").unwrap();
        assert!(ready);
        assert!(message.contains("全部 1 条"));

        let mixed = vec![
            make_note(1, vec![("Word", "cat"), ("Context", "ok")]),
            make_note(2, vec![("Word", ""), ("Context", "ok")]),
        ];
        let (ready, message) = v.check_processing_readiness(&mixed, "TestVocab").unwrap();
        assert!(!ready);
        assert!(message.contains("1/2"));
    }

    #[test]
    fn test_compatibility_reports_missing_fields() {
        let v = validator();
        let anki_fields = vec!["Word".to_string(), "Context".to_string()];

        let (compatible, missing) = v.check_compatibility(&anki_fields, "TestVocab").unwrap();
        assert!(!compatible);
        assert_eq!(missing, vec!["Meaning".to_string(), "Memo".to_string()]);

        let full: Vec<String> = ["Word", "Context", "Meaning", "Memo", "Extra"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (compatible, missing) = v.check_compatibility(&full, "TestVocab").unwrap();
        assert!(compatible);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_format_report_lists_issues() {
        let v = validator();
        let notes = vec![
            make_note(1, vec![("Word", "cat"), ("Context", "ok")]),
            make_note(2, vec![("Word", ""), ("Context", "ok"), ("Meaning", "旧内容")]),
        ];
        let report = v.validate_notes(&notes, "TestVocab").unwrap();
        let text = NoteValidator::format_report(&report);

        assert!(text.contains("总计: 2 条"));
        assert!(text.contains("通过: 1 条 (50.0%)"));
        assert!(text.contains("笔记 2:"));
        assert!(text.contains("[INPUT] Word"));
        assert!(text.contains("[GENERATE] Meaning"));
        assert!(text.contains("当前值: 旧内容"));
    }
}
