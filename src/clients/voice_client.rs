//! OpenAI 语音合成客户端
//!
//! 直接调用 /audio/speech 接口获取 MP3 字节流并落盘。同一文本加
//! 笔记 ID 生成确定的文件名，已存在的非空文件直接复用，不再请求。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use tokio::fs;
use tracing::{debug, info};

use crate::clients::{async_trait, SpeechSynthesizer};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::RetryPolicy;
use crate::utils::logging::truncate_text;
use crate::utils::text::safe_filename;

/// OpenAI TTS 的输入长度上限（字符）
const MAX_TTS_INPUT_CHARS: usize = 4000;

/// 文件名中文本部分的最大长度
const FILENAME_TEXT_LEN: usize = 50;

/// 语音合成客户端
pub struct VoiceClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
    audio_dir: PathBuf,
    retry: RetryPolicy,
}

impl VoiceClient {
    pub fn new(config: &Config, audio_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.openai_timeout_secs))
            .build()
            .map_err(AppError::http_client_build)?;

        let base_url = if config.openai_base_url.is_empty() {
            "https://api.openai.com/v1".to_string()
        } else {
            config.openai_base_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            http_client,
            api_key: config.openai_api_key.clone(),
            base_url,
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            audio_dir: audio_dir.into(),
            retry: RetryPolicy::from_config(config),
        })
    }

    /// 单次 TTS 调用，返回 MP3 字节
    async fn request_speech(&self, text: &str) -> AppResult<Vec<u8>> {
        let url = format!("{}/audio/speech", self.base_url);
        let payload = json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "mp3",
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(AppError::tts_request_failed)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::tts_http_status(
                status.as_u16(),
                truncate_text(&detail, 200),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(AppError::tts_request_failed)?;
        Ok(bytes.to_vec())
    }

    /// 检查语音接口可用性：合成一小段测试音频并验证大小
    pub async fn check_connection(&self) -> AppResult<()> {
        let audio = self.request_speech("test").await?;
        if audio.len() <= 100 {
            return Err(AppError::Other(format!(
                "语音接口响应异常，仅返回 {} 字节",
                audio.len()
            )));
        }

        info!(
            "✅ OpenAI 语音接口连接正常，模型 {} 音色 {}",
            self.model, self.voice
        );
        Ok(())
    }
}

/// 文本加笔记 ID 的确定性音频文件名
fn audio_filename(text: &str, note_id: i64) -> String {
    format!("{}_{}.mp3", safe_filename(text, FILENAME_TEXT_LEN), note_id)
}

#[async_trait]
impl SpeechSynthesizer for VoiceClient {
    async fn synthesize(&self, text: &str, note_id: i64) -> AppResult<Option<PathBuf>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("语音合成文本为空，跳过（笔记 {}）", note_id);
            return Ok(None);
        }

        let filename = audio_filename(trimmed, note_id);
        let path = self.audio_dir.join(&filename);

        if let Ok(meta) = fs::metadata(&path).await {
            if meta.len() > 0 {
                debug!("🎵 语音文件已存在，复用: {}", filename);
                return Ok(Some(path));
            }
        }

        let input: String = trimmed.chars().take(MAX_TTS_INPUT_CHARS).collect();
        let audio = self
            .retry
            .run("语音合成", || self.request_speech(&input))
            .await?;

        fs::write(&path, &audio)
            .await
            .map_err(|e| AppError::tts_write_failed(&path, e))?;

        debug!("🎵 语音已合成: {} ({} 字节)", filename, audio.len());
        Ok(Some(path))
    }

    fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }
}
