//! 单条笔记处理流程 - 流程层
//!
//! 核心职责：定义"一条笔记"的完整处理流程
//!
//! 流程顺序：
//! 1. 提取输入（单词、例句）
//! 2. 处理缓存检查（已成功处理过的直接跳过）
//! 3. 生成词汇数据（生成缓存 → LLM）
//! 4. 语音合成并上传媒体文件（失败只降级，不中断）
//! 5. 词频查询
//! 6. 写回字段
//! 7. 标签合并与处理记录
//!
//! 流程本身不触发任何批量行为，由编排层负责并发展开。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::clients::{NoteStore, SpeechSynthesizer, WordDataGenerator};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{AnkiNote, LlmWordData, NoteTypeConfig, ProcessingOutcome};
use crate::prompts;
use crate::services::{
    FrequencyService, SemaphorePool, POOL_ANKI_BATCH, POOL_OPENAI_TEXT, POOL_OPENAI_TTS,
};
use crate::workflow::note_ctx::NoteCtx;

/// 影响单条流程走向的处理选项
#[derive(Debug, Clone, Default)]
pub struct ProcessingOptions {
    /// 强制重新生成的环节（all / llm / openai）
    pub force_regenerate: Vec<String>,
    pub skip_audio: bool,
    pub skip_frequency: bool,
}

impl ProcessingOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            force_regenerate: config.force_regenerate.clone(),
            skip_audio: config.skip_audio,
            skip_frequency: config.skip_frequency,
        }
    }

    /// 是否无视处理记录强制重做
    fn force_all(&self) -> bool {
        self.force_regenerate.iter().any(|t| t == "all")
    }

    /// 是否无视生成缓存重新调用模型
    fn force_generation(&self) -> bool {
        self.force_regenerate
            .iter()
            .any(|t| t == "all" || t == "llm" || t == "openai")
    }
}

/// 笔记处理流程
///
/// - 编排一条笔记从输入提取到写回的全过程
/// - 远程调用前先获取对应信号量池的许可
/// - 只依赖能力接缝（trait），不关心具体客户端实现
pub struct NoteFlow {
    store: Arc<dyn NoteStore>,
    generator: Arc<dyn WordDataGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: Arc<CacheStore>,
    freq: Arc<FrequencyService>,
    pool: Arc<SemaphorePool>,
    options: ProcessingOptions,
}

impl NoteFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn NoteStore>,
        generator: Arc<dyn WordDataGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        cache: Arc<CacheStore>,
        freq: Arc<FrequencyService>,
        pool: Arc<SemaphorePool>,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            store,
            generator,
            synthesizer,
            cache,
            freq,
            pool,
            options,
        }
    }

    /// 处理一条笔记，任何内部错误都转化为失败结果而不向上传播
    pub async fn run(
        &self,
        note: &AnkiNote,
        config: &NoteTypeConfig,
        ctx: &NoteCtx,
    ) -> ProcessingOutcome {
        match self.process(note, config, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{} ❌ 处理失败: {}", ctx, e);
                ProcessingOutcome::failed(ctx.note_id, e.to_string())
            }
        }
    }

    async fn process(
        &self,
        note: &AnkiNote,
        config: &NoteTypeConfig,
        ctx: &NoteCtx,
    ) -> AppResult<ProcessingOutcome> {
        // ========== 步骤 1: 提取输入 ==========
        let (word, sentence) = match extract_input(note, config) {
            Some(input) => input,
            None => {
                warn!("{} ⚠️ 缺少输入数据，无法处理", ctx);
                return Ok(ProcessingOutcome::failed(ctx.note_id, "缺少输入数据"));
            }
        };

        // ========== 步骤 2: 处理缓存检查 ==========
        if !self.options.force_all() && self.cache.is_processed(ctx.note_id, &word, &sentence) {
            debug!("{} 已成功处理过，跳过", ctx);
            return Ok(ProcessingOutcome::from_cache(ctx.note_id));
        }

        info!("{} 开始处理: {}", ctx, word);

        // ========== 步骤 3: 生成词汇数据 ==========
        let data = match self.generate_word_data(&word, &sentence, config, ctx).await? {
            Some(data) => data,
            None => {
                return Ok(ProcessingOutcome::failed(ctx.note_id, "生成单词数据失败"));
            }
        };

        // ========== 步骤 4: 语音合成与上传 ==========
        let audio_file = if !self.options.skip_audio && config.audio_field.is_some() {
            self.generate_audio(&word, ctx).await
        } else {
            None
        };

        // ========== 步骤 5: 词频查询 ==========
        let freq_rank = if !self.options.skip_frequency && config.freq_field.is_some() {
            Some(self.frequency_rank(&word, data.lemma_opt()))
        } else {
            None
        };

        // ========== 步骤 6: 写回字段 ==========
        let updates =
            build_field_updates(config, &data, audio_file.as_deref(), freq_rank.as_deref());
        {
            let _permit = self.pool.acquire(POOL_ANKI_BATCH).await;
            self.store.update_note_fields(ctx.note_id, &updates).await?;
        }

        // ========== 步骤 7: 标签与处理记录 ==========
        self.update_tags(note, &data, ctx).await;
        self.cache.record_processed(ctx.note_id, &word, &sentence, true);

        info!("{} ✅ 处理完成，更新 {} 个字段", ctx, updates.len());
        Ok(ProcessingOutcome::succeeded(
            ctx.note_id,
            updates,
            audio_file,
        ))
    }

    /// 获取词汇数据：优先生成缓存，未命中或强制时调用模型
    async fn generate_word_data(
        &self,
        word: &str,
        sentence: &str,
        config: &NoteTypeConfig,
        ctx: &NoteCtx,
    ) -> AppResult<Option<LlmWordData>> {
        if !self.options.force_generation() {
            if let Some(cached) = self.cache.get_generated(word, sentence) {
                debug!("{} 命中生成缓存", ctx);
                return Ok(Some(cached));
            }
        }

        let prompt = config.resolved_prompt();
        let data = {
            let _permit = self.pool.acquire(POOL_OPENAI_TEXT).await;
            self.generator
                .generate_word_data(word, sentence, &prompt)
                .await?
        };

        if let Some(data) = &data {
            self.cache.put_generated(word, sentence, data);
        }
        Ok(data)
    }

    /// 合成语音并上传到 Anki 媒体库，返回实际存储的文件名
    ///
    /// 任何一步失败都只记录警告并返回 None，不让孤立的 `[sound:]`
    /// 引用写进字段。
    async fn generate_audio(&self, word: &str, ctx: &NoteCtx) -> Option<String> {
        let path = {
            let _permit = self.pool.acquire(POOL_OPENAI_TTS).await;
            match self.synthesizer.synthesize(word, ctx.note_id).await {
                Ok(Some(path)) => path,
                Ok(None) => return None,
                Err(e) => {
                    warn!("{} ⚠️ 语音合成失败，本条跳过音频: {}", ctx, e);
                    return None;
                }
            }
        };

        let filename = path.file_name()?.to_string_lossy().to_string();
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) => {
                warn!("{} ⚠️ 读取音频文件失败，本条跳过音频: {}", ctx, e);
                return None;
            }
        };

        let _permit = self.pool.acquire(POOL_ANKI_BATCH).await;
        match self.store.store_media_file(&filename, &data).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!("{} ⚠️ 音频上传失败，本条跳过音频: {}", ctx, e);
                None
            }
        }
    }

    /// 查询词频排名，带缓存
    fn frequency_rank(&self, word: &str, lemma: Option<&str>) -> String {
        if let Some(cached) = self.cache.get_freq(word, lemma) {
            return cached;
        }

        let rank = self.freq.rank(word, lemma);
        self.cache.put_freq(word, lemma, &rank);
        rank
    }

    /// 合并模型建议的标签并写回，失败只警告
    async fn update_tags(&self, note: &AnkiNote, data: &LlmWordData, ctx: &NoteCtx) {
        let filtered = prompts::filter_allowed_tags(&data.tags);
        if filtered.is_empty() {
            return;
        }

        let merged = merge_tags(&note.tags, &filtered);
        if merged == note.tags {
            return;
        }

        let _permit = self.pool.acquire(POOL_ANKI_BATCH).await;
        if let Err(e) = self.store.update_note_tags(ctx.note_id, &merged).await {
            warn!("{} ⚠️ 更新标签失败: {}", ctx, e);
        }
    }
}

/// 从笔记中提取单词和例句
///
/// 单词字段为空视为无输入；例句字段缺失或为空时退回单词本身。
fn extract_input(note: &AnkiNote, config: &NoteTypeConfig) -> Option<(String, String)> {
    let word = note.fields.get(&config.word_field)?.trim().to_string();
    if word.is_empty() {
        return None;
    }

    let sentence = note
        .fields
        .get(&config.sentence_field)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| word.clone());

    Some((word, sentence))
}

/// 构建要写回的字段更新
///
/// 只写 GENERATE 字段；音频和词频字段有值才写，模型字段跳过空值，
/// 避免把已有内容覆盖成空字符串。
fn build_field_updates(
    config: &NoteTypeConfig,
    data: &LlmWordData,
    audio_file: Option<&str>,
    freq_rank: Option<&str>,
) -> HashMap<String, String> {
    let mut updates = HashMap::new();

    for field_name in config.generate_fields() {
        if Some(field_name) == config.audio_field.as_deref() {
            if let Some(filename) = audio_file {
                updates.insert(field_name.to_string(), format!("[sound:{}]", filename));
            }
            continue;
        }

        if Some(field_name) == config.freq_field.as_deref() {
            if let Some(rank) = freq_rank {
                updates.insert(field_name.to_string(), rank.to_string());
            }
            continue;
        }

        let spec = &config.fields[field_name];
        if let Some(llm_key) = &spec.llm_key {
            if let Some(value) = data.get(llm_key) {
                if !value.is_empty() {
                    updates.insert(field_name.to_string(), value.to_string());
                }
            }
        }
    }

    updates
}

/// 在已有标签基础上并入新标签，保持原有顺序并去重
fn merge_tags(existing: &[String], new_tags: &[String]) -> Vec<String> {
    let mut merged = existing.to_vec();
    for tag in new_tags {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
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
                ("Sound".to_string(), FieldSpec::generate()),
                ("Rank".to_string(), FieldSpec::generate()),
                ("Memo".to_string(), FieldSpec::skip()),
            ]),
            llm_prompt: String::new(),
            word_field: "Word".to_string(),
            sentence_field: "Context".to_string(),
            audio_field: Some("Sound".to_string()),
            freq_field: Some("Rank".to_string()),
        }
    }

    fn test_data() -> LlmWordData {
        LlmWordData {
            definition: "to move quickly".to_string(),
            definition_ru: "бежать".to_string(),
            ipa: "/rʌn/".to_string(),
            lemma: "run".to_string(),
            collocations: String::new(),
            synonyms: String::new(),
            antonyms: String::new(),
            related_forms: String::new(),
            examples: String::new(),
            hint: String::new(),
            tags: vec!["B1".to_string(), "verb".to_string()],
        }
    }

    fn make_note(fields: Vec<(&str, &str)>) -> AnkiNote {
        AnkiNote {
            note_id: 1,
            model_name: "TestVocab".to_string(),
            deck_name: String::new(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_extract_input_trims_and_falls_back() {
        let config = test_config();

        let note = make_note(vec![("Word", "  run  "), ("Context", " He runs. ")]);
        let (word, sentence) = extract_input(&note, &config).unwrap();
        assert_eq!(word, "run");
        assert_eq!(sentence, "He runs.");

        // 例句为空时退回单词
        let note = make_note(vec![("Word", "run"), ("Context", "   ")]);
        let (word, sentence) = extract_input(&note, &config).unwrap();
        assert_eq!(word, "run");
        assert_eq!(sentence, "run");

        // 单词为空则无输入
        let note = make_note(vec![("Word", ""), ("Context", "x")]);
        assert!(extract_input(&note, &config).is_none());

        // 单词字段整个缺失同样无输入
        let note = make_note(vec![("Context", "x")]);
        assert!(extract_input(&note, &config).is_none());
    }

    #[test]
    fn test_build_field_updates_full() {
        let config = test_config();
        let data = test_data();

        let updates = build_field_updates(&config, &data, Some("run_1.mp3"), Some("120"));
        assert_eq!(updates["Meaning"], "to move quickly");
        assert_eq!(updates["Sound"], "[sound:run_1.mp3]");
        assert_eq!(updates["Rank"], "120");
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn test_build_field_updates_omits_missing_parts() {
        let config = test_config();
        let data = test_data();

        // 无音频、无词频时对应字段不写回
        let updates = build_field_updates(&config, &data, None, None);
        assert_eq!(updates.len(), 1);
        assert!(updates.contains_key("Meaning"));

        // 模型字段为空串时不写回
        let mut empty_data = test_data();
        empty_data.definition = String::new();
        let updates = build_field_updates(&config, &empty_data, None, None);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_merge_tags_unions_without_duplicates() {
        let existing = vec!["verb".to_string(), "старый".to_string()];
        let new_tags = vec!["B1".to_string(), "verb".to_string()];

        let merged = merge_tags(&existing, &new_tags);
        assert_eq!(
            merged,
            vec![
                "verb".to_string(),
                "старый".to_string(),
                "B1".to_string()
            ]
        );
    }
}
