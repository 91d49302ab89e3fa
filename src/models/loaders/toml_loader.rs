use crate::models::note_type::NoteTypeConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载笔记类型配置
///
/// 文件格式示例：
///
/// ```toml
/// name = "SimpleVocab"
/// word_field = "Word"
/// sentence_field = "Context"
/// audio_field = "WordAudio"
///
/// [fields.Word]
/// mode = "INPUT"
///
/// [fields.Meaning]
/// mode = "GENERATE"
/// llm_key = "definition"
/// ```
pub async fn load_note_type(toml_file_path: &Path) -> Result<NoteTypeConfig> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let config: NoteTypeConfig = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    Ok(config)
}

/// 从文件夹中加载所有 TOML 格式的笔记类型配置
///
/// 单个文件解析失败只记录警告，不影响其余文件。
pub async fn load_note_types_dir(folder_path: &str) -> Result<Vec<NoteTypeConfig>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("笔记类型配置目录不存在: {}", folder_path);
    }

    let mut configs = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            tracing::info!(
                "正在加载: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );

            match load_note_type(&path).await {
                Ok(config) => {
                    tracing::info!("成功加载笔记类型: {}", config.name);
                    configs.push(config);
                }
                Err(e) => {
                    tracing::warn!("加载文件失败 {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(configs)
}
