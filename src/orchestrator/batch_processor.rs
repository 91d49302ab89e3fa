//! 批量笔记处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责牌组级批量处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：加载缓存、连接外部服务、注册笔记类型
//! 2. **批量拉取**：查询牌组笔记并缓存原始数据（`Vec<AnkiNote>`）
//! 3. **处理前校验**：委托 NoteValidator 过滤不合格的笔记
//! 4. **并发展开**：为每条笔记派生独立任务，由信号量池限制远程调用并发
//! 5. **资源管理**：持有客户端与缓存，确保生命周期正确
//! 6. **全局统计**：汇总处理结果并写回缓存
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单条笔记的细节
//! - **资源所有者**：唯一持有客户端和缓存的模块
//! - **并发安全**：通过 SemaphorePool 和 tokio::spawn 实现并发
//! - **向下委托**：委托 workflow::NoteFlow 处理单条笔记

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::cache::CacheStore;
use crate::clients::{AnkiClient, LlmClient, NoteStore, VoiceClient};
use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError};
use crate::models::{
    builtin_note_types, load_note_types_dir, AnkiNote, DeckPreview, DeckReport, NoteSample,
    NoteTypeConfig, ProcessingOutcome,
};
use crate::services::{FrequencyService, NoteValidator, SemaphorePool};
use crate::utils::logging::truncate_text;
use crate::utils::ProgressTracker;
use crate::workflow::{NoteCtx, NoteFlow, ProcessingOptions};

/// 预览时展示的笔记样本数量
const PREVIEW_SAMPLES: usize = 5;
/// 每条样本展示的字段数量
const SAMPLE_FIELDS: usize = 3;

/// 应用主结构
pub struct App {
    config: Config,
    anki: Arc<AnkiClient>,
    cache: Arc<CacheStore>,
    validator: NoteValidator,
    flow: Arc<NoteFlow>,
}

impl App {
    /// 初始化应用
    ///
    /// AnkiConnect 和文本模型连接失败视为致命错误；语音接口连接失败
    /// 只降级为本次运行跳过音频合成。
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        if config.openai_api_key.is_empty() {
            return Err(AppError::Config(ConfigError::MissingApiKey));
        }

        // 缓存
        let cache = Arc::new(CacheStore::new(&config.cache_dir)?);
        cache.load().await;
        if config.max_cache_age_days > 0 {
            cache.evict_older_than(config.max_cache_age_days).await;
        }

        // 外部服务连接检查
        let anki = Arc::new(AnkiClient::new(&config)?);
        anki.check_connection().await?;

        let llm = Arc::new(LlmClient::new(&config));
        llm.check_connection().await?;

        let voice = Arc::new(VoiceClient::new(&config, cache.audio_dir())?);
        let mut options = ProcessingOptions::from_config(&config);
        if !options.skip_audio {
            if let Err(e) = voice.check_connection().await {
                warn!("⚠️ 语音接口连接失败，本次运行跳过音频合成: {}", e);
                options.skip_audio = true;
            }
        }

        // 笔记类型注册表：内置配置打底，配置目录中的同名配置覆盖内置
        let mut note_types = builtin_note_types();
        if !config.note_types_dir.is_empty() {
            match load_note_types_dir(&config.note_types_dir).await {
                Ok(configs) => {
                    for note_type in configs {
                        note_types.insert(note_type.name.clone(), note_type);
                    }
                }
                Err(e) => warn!("⚠️ 加载笔记类型配置目录失败: {}", e),
            }
        }
        info!("已注册 {} 个笔记类型", note_types.len());

        let freq = Arc::new(FrequencyService::new(&config.freq_dict_path));
        let pool = Arc::new(SemaphorePool::from_config(&config));
        let validator = NoteValidator::new(note_types);

        let flow = Arc::new(NoteFlow::new(
            anki.clone(),
            llm,
            voice,
            cache.clone(),
            freq,
            pool,
            options,
        ));

        Ok(Self {
            config,
            anki,
            cache,
            validator,
            flow,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn validator(&self) -> &NoteValidator {
        &self.validator
    }

    // ========== Anki 元数据查询 ==========

    pub async fn deck_names(&self) -> AppResult<Vec<String>> {
        self.anki.deck_names().await
    }

    pub async fn model_names(&self) -> AppResult<Vec<String>> {
        self.anki.model_names().await
    }

    pub async fn model_field_names(&self, model_name: &str) -> AppResult<Vec<String>> {
        self.anki.model_field_names(model_name).await
    }

    // ========== 牌组处理 ==========

    /// 拉取牌组中指定类型的全部笔记，并写入笔记缓存
    async fn fetch_notes(&self, deck_name: &str, note_type: &str) -> AppResult<Vec<AnkiNote>> {
        let note_ids = self.anki.find_notes(deck_name, note_type).await?;
        let mut notes = self.anki.notes_info(&note_ids).await?;

        // notesInfo 不返回牌组名，这里补上
        for note in &mut notes {
            if note.deck_name.is_empty() {
                note.deck_name = deck_name.to_string();
            }
        }

        self.cache.put_notes(&notes);
        self.cache.flush_notes().await;
        Ok(notes)
    }

    /// 处理前预览：样本笔记 + 校验报告
    pub async fn preview_deck(&self, deck_name: &str, note_type: &str) -> AppResult<DeckPreview> {
        let notes = self.fetch_notes(deck_name, note_type).await?;
        let validation = self.validator.validate_notes(&notes, note_type)?;
        let samples = notes.iter().take(PREVIEW_SAMPLES).map(note_sample).collect();

        Ok(DeckPreview {
            deck_name: deck_name.to_string(),
            note_type: note_type.to_string(),
            total_notes: notes.len(),
            samples,
            validation,
        })
    }

    /// 处理一个牌组的全部笔记
    ///
    /// 校验不通过的笔记默认跳过；配置要求不跳过时整批中止并在报告的
    /// status 中说明原因。试运行只做拉取和校验，不进入处理流程。
    pub async fn process_deck(&self, deck_name: &str, note_type: &str) -> AppResult<DeckReport> {
        let note_config = self
            .validator
            .get(note_type)
            .ok_or_else(|| {
                AppError::unknown_note_type(note_type, self.validator.supported_names())
            })?
            .clone();

        let started = Instant::now();
        log_deck_start(deck_name, note_type);

        let notes = self.fetch_notes(deck_name, note_type).await?;
        let total_notes = notes.len();

        let (ready, message) = self.validator.check_processing_readiness(&notes, note_type)?;
        if ready {
            info!("🔍 {}", message);
        } else {
            warn!("⚠️ {}", message);
        }

        let (valid, validation) = self.validator.filter_valid(notes, note_type)?;

        // 存在不合格笔记且不允许跳过时中止（试运行除外）
        if validation.invalid_notes > 0 && !self.config.skip_invalid_notes && !self.config.dry_run {
            warn!("⚠️ 存在校验不通过的笔记且未允许跳过，处理中止");
            let mut report = DeckReport::summarize(
                deck_name,
                note_type,
                total_notes,
                validation.invalid_notes,
                Vec::new(),
                started.elapsed().as_secs_f64(),
            );
            report.status = Some(format!("处理中止: {}", message));
            return Ok(report);
        }

        if valid.is_empty() {
            let mut report = DeckReport::summarize(
                deck_name,
                note_type,
                total_notes,
                validation.invalid_notes,
                Vec::new(),
                started.elapsed().as_secs_f64(),
            );
            report.dry_run = self.config.dry_run;
            report.status = Some(message);
            return Ok(report);
        }

        if self.config.dry_run {
            info!("💡 试运行模式：校验完成，不写回任何修改");
            let mut report = DeckReport::summarize(
                deck_name,
                note_type,
                total_notes,
                validation.invalid_notes,
                Vec::new(),
                started.elapsed().as_secs_f64(),
            );
            report.dry_run = true;
            report.status = Some("试运行：已完成校验，未写回任何修改".to_string());
            return Ok(report);
        }

        log_processing_start(valid.len(), &self.config);
        let outcomes = process_notes(self.flow.clone(), valid, &note_config).await;

        // 处理结束后把各缓存表落盘
        self.cache.flush_all().await;

        let mut report = DeckReport::summarize(
            deck_name,
            note_type,
            total_notes,
            validation.invalid_notes,
            outcomes,
            started.elapsed().as_secs_f64(),
        );
        if validation.invalid_notes > 0 {
            report.status = Some(format!(
                "跳过了 {} 条校验不通过的笔记",
                validation.invalid_notes
            ));
        }

        log_deck_complete(&report);
        Ok(report)
    }
}

/// 并发处理一批笔记
///
/// 一次性为所有笔记派生任务，远程调用的并发由流程内部的信号量池
/// 约束。单个任务 panic 只影响该条笔记，计为失败结果。
pub async fn process_notes(
    flow: Arc<NoteFlow>,
    notes: Vec<AnkiNote>,
    config: &NoteTypeConfig,
) -> Vec<ProcessingOutcome> {
    let total = notes.len();
    let progress = Arc::new(ProgressTracker::new(total, "笔记处理"));
    let mut handles = Vec::with_capacity(total);

    for (index, note) in notes.into_iter().enumerate() {
        let note_id = note.note_id;
        let flow = flow.clone();
        let config = config.clone();
        let progress = progress.clone();
        let ctx = NoteCtx::new(note_id, index + 1, total);

        let handle = tokio::spawn(async move {
            let outcome = flow.run(&note, &config, &ctx).await;
            progress.update(outcome.success);
            outcome
        });
        handles.push((note_id, handle));
    }

    let mut outcomes = Vec::with_capacity(total);
    for (note_id, handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!("[笔记 {}] 任务执行失败: {}", note_id, e);
                outcomes.push(ProcessingOutcome::failed(
                    note_id,
                    format!("任务执行失败: {}", e),
                ));
            }
        }
    }

    progress.finish();
    outcomes
}

/// 生成预览样本：按名称排序取前几个字段，字段值截断
fn note_sample(note: &AnkiNote) -> NoteSample {
    let mut names: Vec<&String> = note.fields.keys().collect();
    names.sort_unstable();

    let fields = names
        .into_iter()
        .take(SAMPLE_FIELDS)
        .map(|name| (name.clone(), truncate_text(&note.fields[name], 50)))
        .collect();

    NoteSample {
        note_id: note.note_id,
        fields,
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 Anki 笔记批量增强工具启动");
    info!(
        "📊 并发配置: 文本 {} / 语音 {} / Anki {}",
        config.text_concurrency, config.tts_concurrency, config.anki_concurrency
    );
    if config.dry_run {
        info!("💡 试运行模式：不会写回任何修改");
    }
    info!("{}", "=".repeat(60));
}

fn log_deck_start(deck_name: &str, note_type: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理牌组: {}", deck_name);
    info!("📄 笔记类型: {}", note_type);
    info!("{}", "=".repeat(60));
}

fn log_processing_start(total: usize, config: &Config) {
    info!("✓ 待处理笔记: {} 条", total);
    info!(
        "📋 并发上限: 文本 {} / 语音 {} / Anki {}",
        config.text_concurrency, config.tts_concurrency, config.anki_concurrency
    );
}

fn log_deck_complete(report: &DeckReport) {
    info!("\n{}", "=".repeat(60));
    info!("📊 牌组处理完成: {}", report.deck_name);
    info!(
        "✅ 成功: {}/{} (缓存命中 {})",
        report.succeeded, report.attempted, report.from_cache
    );
    info!("❌ 失败: {}", report.failed);
    if report.skipped_invalid > 0 {
        info!("⚠️ 跳过校验不通过: {}", report.skipped_invalid);
    }
    info!("耗时: {:.1} 秒", report.elapsed_secs);
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_note_sample_sorts_and_truncates() {
        let note = AnkiNote {
            note_id: 42,
            model_name: "ForkLapisForEnglsih".to_string(),
            deck_name: "English".to_string(),
            fields: HashMap::from([
                ("Sentence".to_string(), "不在前三个字段里".to_string()),
                ("Expression".to_string(), "run".to_string()),
                ("Hint".to_string(), "п".repeat(80)),
                ("IPA".to_string(), "/rʌn/".to_string()),
            ]),
            tags: Vec::new(),
        };

        let sample = note_sample(&note);
        assert_eq!(sample.note_id, 42);
        assert_eq!(sample.fields.len(), 3);
        assert_eq!(sample.fields[0].0, "Expression");
        assert_eq!(sample.fields[1].0, "Hint");
        assert_eq!(sample.fields[2].0, "IPA");
        assert_eq!(sample.fields[0].1, "run");
        assert!(sample.fields[1].1.ends_with("..."));
        assert_eq!(sample.fields[1].1.chars().count(), 53);
    }
}
