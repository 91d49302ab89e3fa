//! 外部服务客户端
//!
//! 每个客户端封装一个远程依赖的全部调用逻辑，并在内部处理重试。
//! 三个 trait 是流程层与外部世界之间的接缝，测试时可以替换为内存实现。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{AnkiNote, LlmWordData};

pub mod anki_client;
pub mod llm_client;
pub mod voice_client;

pub use anki_client::AnkiClient;
pub use llm_client::LlmClient;
pub use voice_client::VoiceClient;

/// 笔记存取后端
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// 查找指定牌组中指定类型的全部笔记 ID
    async fn find_notes(&self, deck: &str, note_type: &str) -> AppResult<Vec<i64>>;

    /// 批量获取笔记详情，单批失败只影响该批
    async fn notes_info(&self, note_ids: &[i64]) -> AppResult<Vec<AnkiNote>>;

    /// 更新笔记字段
    async fn update_note_fields(
        &self,
        note_id: i64,
        fields: &HashMap<String, String>,
    ) -> AppResult<()>;

    /// 覆盖笔记的标签列表
    async fn update_note_tags(&self, note_id: i64, tags: &[String]) -> AppResult<()>;

    /// 上传媒体文件，返回实际存储的文件名
    async fn store_media_file(&self, filename: &str, data: &[u8]) -> AppResult<String>;
}

/// 单词数据生成器
#[async_trait]
pub trait WordDataGenerator: Send + Sync {
    /// 为单词和例句生成词汇数据
    ///
    /// 返回 Ok(None) 表示模型响应无法解析为有效数据。
    async fn generate_word_data(
        &self,
        word: &str,
        sentence: &str,
        system_prompt: &str,
    ) -> AppResult<Option<LlmWordData>>;
}

/// 语音合成器
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// 合成语音并保存到本地，返回音频文件路径
    ///
    /// 文本为空时返回 Ok(None)。
    async fn synthesize(&self, text: &str, note_id: i64) -> AppResult<Option<PathBuf>>;

    /// 音频文件所在目录
    fn audio_dir(&self) -> &Path;
}
