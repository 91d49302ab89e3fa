use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Anki 笔记
///
/// 字段映射已扁平化为 字段名 → 字段值，AnkiConnect 响应中的 order 信息不保留。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnkiNote {
    /// 笔记 ID
    pub note_id: i64,
    /// 笔记类型（模型）名称
    pub model_name: String,
    /// 所属牌组名称（notesInfo 通常不返回，允许为空）
    #[serde(default)]
    pub deck_name: String,
    /// 字段名 → 字段值
    pub fields: HashMap<String, String>,
    /// 当前标签列表
    #[serde(default)]
    pub tags: Vec<String>,
}

/// LLM 生成的词汇数据
///
/// 所有字段必须出现在模型返回的 JSON 中，缺失任何键都视为无效响应。
/// 字段值允许为空字符串（模型对不确定的字段应返回空串）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmWordData {
    /// 英文释义
    pub definition: String,
    /// 俄文释义
    pub definition_ru: String,
    /// IPA 音标
    pub ipa: String,
    /// 词典原形
    pub lemma: String,
    /// 常见搭配
    pub collocations: String,
    /// 同义词
    pub synonyms: String,
    /// 反义词
    pub antonyms: String,
    /// 同根词与词形变化
    pub related_forms: String,
    /// 例句对话
    pub examples: String,
    /// 俄文语境提示
    pub hint: String,
    /// 建议标签（写回前需经白名单过滤）
    pub tags: Vec<String>,
}

impl LlmWordData {
    /// 按生成键取对应属性值，未知键返回 None
    pub fn get(&self, llm_key: &str) -> Option<&str> {
        match llm_key {
            "definition" => Some(&self.definition),
            "definition_ru" => Some(&self.definition_ru),
            "ipa" => Some(&self.ipa),
            "lemma" => Some(&self.lemma),
            "collocations" => Some(&self.collocations),
            "synonyms" => Some(&self.synonyms),
            "antonyms" => Some(&self.antonyms),
            "related_forms" => Some(&self.related_forms),
            "examples" => Some(&self.examples),
            "hint" => Some(&self.hint),
            _ => None,
        }
    }

    /// 非空的词典原形，供词频查询使用
    pub fn lemma_opt(&self) -> Option<&str> {
        let lemma = self.lemma.trim();
        if lemma.is_empty() {
            None
        } else {
            Some(lemma)
        }
    }
}

/// 单条笔记的处理记录，持久化在处理结果缓存中
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub note_id: i64,
    pub success: bool,
    /// Unix 时间戳（秒，小数部分为毫秒）
    pub created_at: f64,
}

/// 命中处理缓存时的状态说明
pub const STATUS_FROM_CACHE: &str = "已处理（命中缓存）";

/// 单条笔记的处理结果
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub note_id: i64,
    pub success: bool,
    /// 人类可读的状态或失败原因
    pub status: Option<String>,
    /// 实际写回的字段
    pub updated_fields: HashMap<String, String>,
    /// 生成的音频文件名
    pub audio_file: Option<String>,
}

impl ProcessingOutcome {
    pub fn succeeded(
        note_id: i64,
        updated_fields: HashMap<String, String>,
        audio_file: Option<String>,
    ) -> Self {
        Self {
            note_id,
            success: true,
            status: None,
            updated_fields,
            audio_file,
        }
    }

    pub fn from_cache(note_id: i64) -> Self {
        Self {
            note_id,
            success: true,
            status: Some(STATUS_FROM_CACHE.to_string()),
            updated_fields: HashMap::new(),
            audio_file: None,
        }
    }

    pub fn failed(note_id: i64, reason: impl Into<String>) -> Self {
        Self {
            note_id,
            success: false,
            status: Some(reason.into()),
            updated_fields: HashMap::new(),
            audio_file: None,
        }
    }

    /// 是否为命中处理缓存的结果
    pub fn is_from_cache(&self) -> bool {
        self.success && self.status.as_deref() == Some(STATUS_FROM_CACHE)
    }
}
