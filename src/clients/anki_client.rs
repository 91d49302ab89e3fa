//! AnkiConnect 客户端
//!
//! 封装与本机 Anki 实例的全部交互，协议为 AnkiConnect 的 JSON-RPC 风格
//! HTTP 接口。所有请求在客户端内部按重试策略自动重试瞬时故障。

use std::collections::HashMap;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::clients::{async_trait, NoteStore};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::AnkiNote;
use crate::services::RetryPolicy;

/// AnkiConnect 协议版本
const ANKI_CONNECT_VERSION: u64 = 6;

/// AnkiConnect 响应外层结构
#[derive(Debug, Deserialize)]
struct AnkiResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// AnkiConnect 客户端
pub struct AnkiClient {
    http_client: reqwest::Client,
    url: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl AnkiClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.anki_timeout_secs))
            .build()
            .map_err(AppError::http_client_build)?;

        Ok(Self {
            http_client,
            url: config.anki_url.clone(),
            batch_size: config.anki_batch_size.max(1),
            retry: RetryPolicy::from_config(config),
        })
    }

    /// 单次 AnkiConnect 调用
    async fn request_raw(&self, action: &str, params: Value) -> AppResult<Value> {
        let payload = json!({
            "action": action,
            "version": ANKI_CONNECT_VERSION,
            "params": params,
        });

        let response = self
            .http_client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AppError::anki_connection_failed(&self.url, e)
                } else {
                    AppError::anki_request_failed(action, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::anki_http_status(action, status.as_u16()));
        }

        let body: AnkiResponse = response
            .json()
            .await
            .map_err(|e| AppError::anki_request_failed(action, e))?;

        if let Some(message) = body.error {
            return Err(AppError::anki_api_error(action, message));
        }

        Ok(body.result)
    }

    /// 带重试的 AnkiConnect 调用
    async fn request(&self, action: &str, params: Value) -> AppResult<Value> {
        self.retry
            .run(action, || self.request_raw(action, params.clone()))
            .await
    }

    /// 检查连接并返回 AnkiConnect 协议版本
    pub async fn check_connection(&self) -> AppResult<u64> {
        let result = self.request_raw("version", json!({})).await?;
        let version = result.as_u64().ok_or_else(|| {
            AppError::anki_invalid_response("version", format!("非数字版本号: {}", result))
        })?;

        info!("✅ 已连接 AnkiConnect，协议版本 {}", version);
        Ok(version)
    }

    /// 全部牌组名
    pub async fn deck_names(&self) -> AppResult<Vec<String>> {
        let result = self.request("deckNames", json!({})).await?;
        serde_json::from_value(result)
            .map_err(|e| AppError::anki_invalid_response("deckNames", e.to_string()))
    }

    /// 全部笔记类型（模型）名
    pub async fn model_names(&self) -> AppResult<Vec<String>> {
        let result = self.request("modelNames", json!({})).await?;
        serde_json::from_value(result)
            .map_err(|e| AppError::anki_invalid_response("modelNames", e.to_string()))
    }

    /// 指定笔记类型的字段名列表
    pub async fn model_field_names(&self, model_name: &str) -> AppResult<Vec<String>> {
        let result = self
            .request("modelFieldNames", json!({ "modelName": model_name }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| AppError::anki_invalid_response("modelFieldNames", e.to_string()))
    }
}

/// 牌组加笔记类型的查询串
fn search_query(deck: &str, note_type: &str) -> String {
    format!("deck:\"{}\" note:\"{}\"", deck, note_type)
}

/// 把 notesInfo 的单条响应解析为笔记，字段值取 value，order 丢弃
///
/// 已删除的笔记在响应中是空对象，解析为 None 由调用方跳过。
fn parse_note_info(value: &Value) -> Option<AnkiNote> {
    let note_id = value.get("noteId")?.as_i64()?;
    let model_name = value
        .get("modelName")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let deck_name = value
        .get("deckName")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let tags = value
        .get("tags")
        .and_then(|t| serde_json::from_value(t.clone()).ok())
        .unwrap_or_default();

    let mut fields = HashMap::new();
    if let Some(map) = value.get("fields").and_then(Value::as_object) {
        for (name, info) in map {
            let text = info.get("value").and_then(Value::as_str).unwrap_or("");
            fields.insert(name.clone(), text.to_string());
        }
    }

    Some(AnkiNote {
        note_id,
        model_name,
        deck_name,
        fields,
        tags,
    })
}

#[async_trait]
impl NoteStore for AnkiClient {
    async fn find_notes(&self, deck: &str, note_type: &str) -> AppResult<Vec<i64>> {
        let query = search_query(deck, note_type);
        debug!("查询笔记: {}", query);

        let result = self.request("findNotes", json!({ "query": query })).await?;
        let ids: Vec<i64> = serde_json::from_value(result)
            .map_err(|e| AppError::anki_invalid_response("findNotes", e.to_string()))?;

        info!("🔍 找到 {} 条笔记", ids.len());
        Ok(ids)
    }

    async fn notes_info(&self, note_ids: &[i64]) -> AppResult<Vec<AnkiNote>> {
        if note_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut notes = Vec::with_capacity(note_ids.len());
        for chunk in note_ids.chunks(self.batch_size) {
            let result = match self.request("notesInfo", json!({ "notes": chunk })).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("⚠️ 获取笔记详情失败，跳过 {} 条: {}", chunk.len(), e);
                    continue;
                }
            };

            let items = result.as_array().cloned().unwrap_or_default();
            for item in &items {
                match parse_note_info(item) {
                    Some(note) => notes.push(note),
                    None => debug!("跳过无法解析的笔记条目"),
                }
            }
        }

        debug!("已获取 {} 条笔记详情", notes.len());
        Ok(notes)
    }

    async fn update_note_fields(
        &self,
        note_id: i64,
        fields: &HashMap<String, String>,
    ) -> AppResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        self.request(
            "updateNoteFields",
            json!({
                "note": {
                    "id": note_id,
                    "fields": fields,
                }
            }),
        )
        .await?;

        debug!("已更新笔记 {} 的 {} 个字段", note_id, fields.len());
        Ok(())
    }

    async fn update_note_tags(&self, note_id: i64, tags: &[String]) -> AppResult<()> {
        self.request(
            "updateNote",
            json!({
                "note": {
                    "id": note_id,
                    "tags": tags,
                }
            }),
        )
        .await?;

        debug!("已更新笔记 {} 的标签: {:?}", note_id, tags);
        Ok(())
    }

    async fn store_media_file(&self, filename: &str, data: &[u8]) -> AppResult<String> {
        let encoded = general_purpose::STANDARD.encode(data);
        let result = self
            .request(
                "storeMediaFile",
                json!({
                    "filename": filename,
                    "data": encoded,
                }),
            )
            .await?;

        // storeMediaFile 遇到重名会改名存储，以返回值为准
        let stored = result.as_str().unwrap_or(filename).to_string();
        debug!("🎵 媒体文件已上传: {}", stored);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_quotes_names() {
        assert_eq!(
            search_query("My English", "ForkLapisForEnglsih"),
            "deck:\"My English\" note:\"ForkLapisForEnglsih\""
        );
    }

    #[test]
    fn test_parse_note_info_flattens_fields() {
        let raw = json!({
            "noteId": 1502298033753_i64,
            "modelName": "ForkLapisForEnglsih",
            "deckName": "English",
            "tags": ["B2", "verb"],
            "fields": {
                "Expression": {"value": "run", "order": 0},
                "Sentence": {"value": "He runs every morning.", "order": 1},
                "MainDefinition": {"value": "", "order": 2},
            }
        });

        let note = parse_note_info(&raw).unwrap();
        assert_eq!(note.note_id, 1502298033753);
        assert_eq!(note.model_name, "ForkLapisForEnglsih");
        assert_eq!(note.deck_name, "English");
        assert_eq!(note.tags, vec!["B2".to_string(), "verb".to_string()]);
        assert_eq!(note.fields["Expression"], "run");
        assert_eq!(note.fields["MainDefinition"], "");
    }

    #[test]
    fn test_parse_note_info_rejects_empty_entry() {
        // 已删除的笔记返回空对象
        assert!(parse_note_info(&json!({})).is_none());
        assert!(parse_note_info(&json!({"modelName": "X"})).is_none());
    }

    #[test]
    fn test_parse_note_info_tolerates_missing_optional_parts() {
        let raw = json!({"noteId": 42});
        let note = parse_note_info(&raw).unwrap();
        assert_eq!(note.note_id, 42);
        assert!(note.model_name.is_empty());
        assert!(note.fields.is_empty());
        assert!(note.tags.is_empty());
    }

    /// 需要本机运行 Anki 并安装 AnkiConnect 插件
    #[tokio::test]
    #[ignore]
    async fn test_check_connection_live() {
        let _ = tracing_subscriber::fmt::try_init();

        let client = AnkiClient::new(&Config::default()).unwrap();
        let version = client.check_connection().await.unwrap();
        println!("AnkiConnect 版本: {}", version);
        assert!(version >= 6);

        let decks = client.deck_names().await.unwrap();
        println!("共 {} 个牌组:", decks.len());
        for deck in &decks {
            println!("  - {}", deck);
        }
    }
}
