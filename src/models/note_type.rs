use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::prompts;

/// 字段的处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    /// 输入字段：处理前必须非空
    Input,
    /// 生成字段：处理前必须为空，由本工具填充
    Generate,
    /// 跳过字段：处理过程不读不写
    Skip,
}

impl fmt::Display for FieldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMode::Input => write!(f, "INPUT"),
            FieldMode::Generate => write!(f, "GENERATE"),
            FieldMode::Skip => write!(f, "SKIP"),
        }
    }
}

/// 单个字段的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub mode: FieldMode,
    /// 对应 LLM 返回 JSON 中的键；音频和词频等特殊字段不设置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn input() -> Self {
        Self {
            mode: FieldMode::Input,
            llm_key: None,
            description: None,
        }
    }

    pub fn skip() -> Self {
        Self {
            mode: FieldMode::Skip,
            llm_key: None,
            description: None,
        }
    }

    /// 生成字段，内容来自 LLM 返回的指定键
    pub fn generate_from(llm_key: &str) -> Self {
        Self {
            mode: FieldMode::Generate,
            llm_key: Some(llm_key.to_string()),
            description: None,
        }
    }

    /// 生成字段，内容由专门流程填充（音频、词频）
    pub fn generate() -> Self {
        Self {
            mode: FieldMode::Generate,
            llm_key: None,
            description: None,
        }
    }
}

/// 笔记类型配置
///
/// 描述某个 Anki 笔记类型的字段处理方式，以及单词、例句、音频、
/// 词频这些特殊字段各自对应的字段名。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteTypeConfig {
    /// 笔记类型名，须与 Anki 中的模型名一致
    pub name: String,
    /// 字段名 → 字段配置
    pub fields: HashMap<String, FieldSpec>,
    /// 自定义系统提示词，留空则使用内置提示词
    #[serde(default)]
    pub llm_prompt: String,
    /// 单词所在的输入字段
    #[serde(default = "default_word_field")]
    pub word_field: String,
    /// 例句所在的输入字段
    #[serde(default = "default_sentence_field")]
    pub sentence_field: String,
    /// 音频文件写入的字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_field: Option<String>,
    /// 词频排序写入的字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq_field: Option<String>,
}

fn default_word_field() -> String {
    "Expression".to_string()
}

fn default_sentence_field() -> String {
    "Sentence".to_string()
}

impl NoteTypeConfig {
    /// 生效的系统提示词
    pub fn resolved_prompt(&self) -> String {
        if self.llm_prompt.is_empty() {
            prompts::system_prompt()
        } else {
            self.llm_prompt.clone()
        }
    }

    /// 指定模式的字段名，按名称排序保证输出稳定
    pub fn fields_with_mode(&self, mode: FieldMode) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, spec)| spec.mode == mode)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn input_fields(&self) -> Vec<&str> {
        self.fields_with_mode(FieldMode::Input)
    }

    pub fn generate_fields(&self) -> Vec<&str> {
        self.fields_with_mode(FieldMode::Generate)
    }

    pub fn skip_fields(&self) -> Vec<&str> {
        self.fields_with_mode(FieldMode::Skip)
    }
}

/// 内置笔记类型配置
pub fn builtin_note_types() -> HashMap<String, NoteTypeConfig> {
    let fork_lapis = NoteTypeConfig {
        name: "ForkLapisForEnglsih".to_string(),
        fields: HashMap::from([
            ("Expression".to_string(), FieldSpec::input()),
            ("Sentence".to_string(), FieldSpec::input()),
            ("MainDefinition".to_string(), FieldSpec::generate_from("definition")),
            ("MainDefinitionRU".to_string(), FieldSpec::generate_from("definition_ru")),
            ("ExpressionAudio".to_string(), FieldSpec::generate()),
            ("SentenceAudio".to_string(), FieldSpec::skip()),
            ("Picture".to_string(), FieldSpec::skip()),
            ("IPA".to_string(), FieldSpec::generate_from("ipa")),
            ("FreqSort".to_string(), FieldSpec::generate()),
            ("Collocations".to_string(), FieldSpec::generate_from("collocations")),
            ("Synonyms".to_string(), FieldSpec::generate_from("synonyms")),
            ("Antonyms".to_string(), FieldSpec::generate_from("antonyms")),
            ("RelatedForms".to_string(), FieldSpec::generate_from("related_forms")),
            ("E.g.".to_string(), FieldSpec::generate_from("examples")),
            ("MiscInfo".to_string(), FieldSpec::skip()),
            ("DefinitionPicture".to_string(), FieldSpec::skip()),
            ("SelectionText".to_string(), FieldSpec::skip()),
            ("Hint".to_string(), FieldSpec::generate_from("hint")),
            ("IsWordAndSentenceCard".to_string(), FieldSpec::skip()),
            ("IsClickCard".to_string(), FieldSpec::skip()),
            ("IsSentenceCard".to_string(), FieldSpec::skip()),
        ]),
        llm_prompt: prompts::system_prompt(),
        word_field: "Expression".to_string(),
        sentence_field: "Sentence".to_string(),
        audio_field: Some("ExpressionAudio".to_string()),
        freq_field: Some("FreqSort".to_string()),
    };

    HashMap::from([(fork_lapis.name.clone(), fork_lapis)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_fork_lapis_layout() {
        let types = builtin_note_types();
        let config = types.get("ForkLapisForEnglsih").unwrap();

        assert_eq!(config.input_fields(), vec!["Expression", "Sentence"]);
        assert_eq!(config.word_field, "Expression");
        assert_eq!(config.sentence_field, "Sentence");
        assert_eq!(config.audio_field.as_deref(), Some("ExpressionAudio"));
        assert_eq!(config.freq_field.as_deref(), Some("FreqSort"));

        let generate = config.generate_fields();
        assert_eq!(generate.len(), 11);
        assert!(generate.contains(&"MainDefinition"));
        assert!(generate.contains(&"E.g."));

        assert_eq!(config.skip_fields().len(), 8);
        assert!(!config.resolved_prompt().is_empty());
    }

    #[test]
    fn test_field_mode_display() {
        assert_eq!(FieldMode::Input.to_string(), "INPUT");
        assert_eq!(FieldMode::Generate.to_string(), "GENERATE");
        assert_eq!(FieldMode::Skip.to_string(), "SKIP");
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_text = r#"
name = "SimpleVocab"
word_field = "Word"
sentence_field = "Context"
audio_field = "WordAudio"

[fields.Word]
mode = "INPUT"

[fields.Context]
mode = "INPUT"

[fields.Meaning]
mode = "GENERATE"
llm_key = "definition"

[fields.WordAudio]
mode = "GENERATE"

[fields.Notes]
mode = "SKIP"
"#;
        let config: NoteTypeConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.name, "SimpleVocab");
        assert_eq!(config.word_field, "Word");
        assert_eq!(config.sentence_field, "Context");
        assert_eq!(config.audio_field.as_deref(), Some("WordAudio"));
        assert_eq!(config.freq_field, None);
        assert_eq!(config.fields["Meaning"].llm_key.as_deref(), Some("definition"));
        assert_eq!(config.fields["Notes"].mode, FieldMode::Skip);
        assert!(config.llm_prompt.is_empty());
    }
}
