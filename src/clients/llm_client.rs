//! OpenAI 文本生成客户端
//!
//! 使用 `async-openai` 调用 Chat Completions 接口，兼容任何
//! OpenAI 协议的服务。模型被要求返回纯 JSON，解析失败不算请求
//! 错误，按"本条生成失败"处理。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use tracing::{debug, info, warn};

use crate::clients::{async_trait, WordDataGenerator};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::LlmWordData;
use crate::prompts;
use crate::services::RetryPolicy;
use crate::utils::logging::truncate_text;
use crate::utils::text::extract_json_block;

/// 文本生成客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
        if !config.openai_base_url.is_empty() {
            openai_config = openai_config.with_api_base(&config.openai_base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            model_name: config.text_model.clone(),
            retry: RetryPolicy::from_config(config),
        }
    }

    /// 单次 Chat Completions 调用，返回去除首尾空白的内容
    async fn request_completion(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> AppResult<String> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;
        let messages = vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(2048u32)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::llm_empty_content(&self.model_name))?;

        Ok(content.trim().to_string())
    }

    /// 检查文本接口可用性
    pub async fn check_connection(&self) -> AppResult<()> {
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content("ping")
            .build()?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .max_tokens(5u32)
            .build()?;

        self.client.chat().create(request).await?;
        info!("✅ OpenAI 文本接口连接正常，模型 {}", self.model_name);
        Ok(())
    }
}

/// 从模型返回的文本中解析词汇数据
///
/// 容忍 markdown 代码块等包裹，但 JSON 本身必须包含全部必需键。
fn parse_word_data(content: &str) -> Option<LlmWordData> {
    let json_text = extract_json_block(content)?;
    match serde_json::from_str(json_text) {
        Ok(data) => Some(data),
        Err(e) => {
            debug!("词汇数据 JSON 解析失败: {}", e);
            None
        }
    }
}

#[async_trait]
impl WordDataGenerator for LlmClient {
    async fn generate_word_data(
        &self,
        word: &str,
        sentence: &str,
        system_prompt: &str,
    ) -> AppResult<Option<LlmWordData>> {
        debug!("调用模型 {} 生成单词数据: {}", self.model_name, word);

        let user_message = prompts::user_prompt(word, sentence);
        let content = self
            .retry
            .run("生成单词数据", || {
                self.request_completion(system_prompt, &user_message)
            })
            .await?;

        match parse_word_data(&content) {
            Some(data) => Ok(Some(data)),
            None => {
                warn!(
                    "⚠️ 模型返回内容无法解析为单词数据 ({}): {}",
                    word,
                    truncate_text(&content, 200)
                );
                Ok(None)
            }
        }
    }
}
