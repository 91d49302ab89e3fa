use std::fmt;
use std::path::PathBuf;

use async_openai::error::OpenAIError;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// AnkiConnect 调用错误
    Anki(AnkiError),
    /// LLM 服务错误
    Llm(LlmError),
    /// 语音合成错误
    Tts(TtsError),
    /// 本地缓存错误
    Cache(CacheError),
    /// 业务逻辑错误
    Business(BusinessError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Anki(e) => write!(f, "Anki错误: {}", e),
            AppError::Llm(e) => write!(f, "LLM错误: {}", e),
            AppError::Tts(e) => write!(f, "语音合成错误: {}", e),
            AppError::Cache(e) => write!(f, "缓存错误: {}", e),
            AppError::Business(e) => write!(f, "业务错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Anki(e) => Some(e),
            AppError::Llm(e) => Some(e),
            AppError::Tts(e) => Some(e),
            AppError::Cache(e) => Some(e),
            AppError::Business(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

// ========== 重试分类 ==========

/// 错误的重试分类
///
/// 重试执行器据此判断一次失败是否值得重试。分类只依赖结构化信息
/// （HTTP 状态码、API 错误对象的 type 字段），不解析人类可读的错误文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// 对端限流（HTTP 429 或同义的 API 错误类型）
    RateLimited,
    /// 服务端或传输层故障（HTTP 5xx、超时、连接失败）
    ServerError,
    /// 其余错误，重试无意义
    Other,
}

impl RetryClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RetryClass::Other)
    }
}

/// 按 HTTP 状态码分类
fn classify_status(status: u16) -> RetryClass {
    match status {
        429 => RetryClass::RateLimited,
        500..=599 => RetryClass::ServerError,
        _ => RetryClass::Other,
    }
}

/// 按 OpenAI API 错误对象的 `type` 字段分类
///
/// 不同服务商的取值略有差异，这里覆盖常见的限流与服务端故障取值。
fn classify_api_type(error_type: Option<&str>) -> RetryClass {
    match error_type {
        Some("rate_limit_error") | Some("requests") | Some("tokens") => RetryClass::RateLimited,
        Some("server_error") | Some("service_unavailable") | Some("overloaded_error") => {
            RetryClass::ServerError
        }
        _ => RetryClass::Other,
    }
}

impl AppError {
    /// 返回该错误的重试分类
    pub fn retry_class(&self) -> RetryClass {
        match self {
            AppError::Anki(e) => e.retry_class(),
            AppError::Llm(e) => e.retry_class(),
            AppError::Tts(e) => e.retry_class(),
            _ => RetryClass::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class().is_retryable()
    }
}

// ========== AnkiConnect 错误 ==========

/// AnkiConnect 调用错误
#[derive(Debug)]
pub enum AnkiError {
    /// 无法连接到 AnkiConnect 服务
    ConnectionFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求发送失败（超时、连接中断等传输层故障）
    RequestFailed {
        action: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 服务返回异常 HTTP 状态码
    HttpStatus { action: String, status: u16 },
    /// 服务在响应体中返回了错误信息
    ApiError { action: String, message: String },
    /// 响应结构不符合预期
    InvalidResponse { action: String, detail: String },
}

impl fmt::Display for AnkiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnkiError::ConnectionFailed { url, .. } => {
                write!(f, "无法连接到 AnkiConnect ({})", url)
            }
            AnkiError::RequestFailed { action, .. } => {
                write!(f, "请求失败 (action={})", action)
            }
            AnkiError::HttpStatus { action, status } => {
                write!(f, "返回异常状态码 (action={}, status={})", action, status)
            }
            AnkiError::ApiError { action, message } => {
                write!(f, "服务返回错误 (action={}): {}", action, message)
            }
            AnkiError::InvalidResponse { action, detail } => {
                write!(f, "响应格式异常 (action={}): {}", action, detail)
            }
        }
    }
}

impl std::error::Error for AnkiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnkiError::ConnectionFailed { source, .. }
            | AnkiError::RequestFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl AnkiError {
    fn retry_class(&self) -> RetryClass {
        match self {
            AnkiError::ConnectionFailed { .. } | AnkiError::RequestFailed { .. } => {
                RetryClass::ServerError
            }
            AnkiError::HttpStatus { status, .. } => classify_status(*status),
            _ => RetryClass::Other,
        }
    }
}

// ========== LLM 错误 ==========

/// LLM 文本生成错误
#[derive(Debug)]
pub enum LlmError {
    /// 请求 LLM 服务失败，分类在转换时根据结构化信息确定
    Api {
        class: RetryClass,
        message: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求成功但模型未返回任何内容
    EmptyContent { model: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Api { message, .. } => write!(f, "请求失败: {}", message),
            LlmError::EmptyContent { model } => {
                write!(f, "模型返回空内容 (model={})", model)
            }
        }
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LlmError::Api { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl LlmError {
    fn retry_class(&self) -> RetryClass {
        match self {
            LlmError::Api { class, .. } => *class,
            _ => RetryClass::Other,
        }
    }
}

// ========== 语音合成错误 ==========

/// 语音合成错误
#[derive(Debug)]
pub enum TtsError {
    /// 请求发送失败（超时、连接中断等传输层故障）
    RequestFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 服务返回异常 HTTP 状态码
    HttpStatus { status: u16, detail: String },
    /// 音频文件写入本地失败
    WriteFailed {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for TtsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtsError::RequestFailed { .. } => write!(f, "请求失败"),
            TtsError::HttpStatus { status, detail } => {
                write!(f, "返回异常状态码 (status={}): {}", status, detail)
            }
            TtsError::WriteFailed { path, .. } => {
                write!(f, "音频文件写入失败 ({})", path.display())
            }
        }
    }
}

impl std::error::Error for TtsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TtsError::RequestFailed { source } | TtsError::WriteFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl TtsError {
    fn retry_class(&self) -> RetryClass {
        match self {
            TtsError::RequestFailed { .. } => RetryClass::ServerError,
            TtsError::HttpStatus { status, .. } => classify_status(*status),
            _ => RetryClass::Other,
        }
    }
}

// ========== 缓存错误 ==========

/// 本地缓存错误
#[derive(Debug)]
pub enum CacheError {
    /// 缓存目录或缓存文件的 IO 操作失败
    Io {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io { path, .. } => write!(f, "IO 操作失败 ({})", path.display()),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== 业务逻辑错误 ==========

/// 业务逻辑错误
#[derive(Debug)]
pub enum BusinessError {
    /// 请求处理的笔记类型没有对应的配置
    UnknownNoteType { name: String, supported: Vec<String> },
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusinessError::UnknownNoteType { name, supported } => {
                write!(f, "不支持的笔记类型: {} (可用: {})", name, supported.join(", "))
            }
        }
    }
}

impl std::error::Error for BusinessError {}

// ========== 配置错误 ==========

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 缺少 OpenAI API 密钥
    MissingApiKey,
    /// HTTP 客户端初始化失败
    HttpClientBuild {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingApiKey => {
                write!(f, "缺少 OPENAI_API_KEY 环境变量，无法调用 OpenAI 服务")
            }
            ConfigError::HttpClientBuild { .. } => write!(f, "HTTP 客户端初始化失败"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::HttpClientBuild { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========

impl From<OpenAIError> for AppError {
    fn from(err: OpenAIError) -> Self {
        let class = match &err {
            OpenAIError::ApiError(api) => classify_api_type(api.r#type.as_deref()),
            OpenAIError::Reqwest(_) => RetryClass::ServerError,
            _ => RetryClass::Other,
        };
        AppError::Llm(LlmError::Api {
            class,
            message: err.to_string(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    pub fn anki_connection_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Anki(AnkiError::ConnectionFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    pub fn anki_request_failed(
        action: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Anki(AnkiError::RequestFailed {
            action: action.into(),
            source: Box::new(source),
        })
    }

    pub fn anki_http_status(action: impl Into<String>, status: u16) -> Self {
        AppError::Anki(AnkiError::HttpStatus {
            action: action.into(),
            status,
        })
    }

    pub fn anki_api_error(action: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Anki(AnkiError::ApiError {
            action: action.into(),
            message: message.into(),
        })
    }

    pub fn anki_invalid_response(action: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::Anki(AnkiError::InvalidResponse {
            action: action.into(),
            detail: detail.into(),
        })
    }

    pub fn llm_empty_content(model: impl Into<String>) -> Self {
        AppError::Llm(LlmError::EmptyContent {
            model: model.into(),
        })
    }

    pub fn tts_request_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Tts(TtsError::RequestFailed {
            source: Box::new(source),
        })
    }

    pub fn tts_http_status(status: u16, detail: impl Into<String>) -> Self {
        AppError::Tts(TtsError::HttpStatus {
            status,
            detail: detail.into(),
        })
    }

    pub fn tts_write_failed(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Tts(TtsError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    pub fn cache_io(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Cache(CacheError::Io {
            path: path.into(),
            source: Box::new(source),
        })
    }

    pub fn unknown_note_type(name: impl Into<String>, supported: Vec<String>) -> Self {
        AppError::Business(BusinessError::UnknownNoteType {
            name: name.into(),
            supported,
        })
    }

    pub fn http_client_build(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Config(ConfigError::HttpClientBuild {
            source: Box::new(source),
        })
    }
}

/// 应用统一 Result 类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(429), RetryClass::RateLimited);
        assert_eq!(classify_status(500), RetryClass::ServerError);
        assert_eq!(classify_status(503), RetryClass::ServerError);
        assert_eq!(classify_status(400), RetryClass::Other);
        assert_eq!(classify_status(404), RetryClass::Other);
    }

    #[test]
    fn test_api_type_classification() {
        assert_eq!(classify_api_type(Some("rate_limit_error")), RetryClass::RateLimited);
        assert_eq!(classify_api_type(Some("server_error")), RetryClass::ServerError);
        assert_eq!(classify_api_type(Some("invalid_request_error")), RetryClass::Other);
        assert_eq!(classify_api_type(None), RetryClass::Other);
    }

    #[test]
    fn test_retry_class_of_anki_errors() {
        let err = AppError::anki_http_status("findNotes", 429);
        assert_eq!(err.retry_class(), RetryClass::RateLimited);
        assert!(err.is_retryable());

        let err = AppError::anki_http_status("findNotes", 500);
        assert_eq!(err.retry_class(), RetryClass::ServerError);

        let err = AppError::anki_api_error("findNotes", "deck not found");
        assert_eq!(err.retry_class(), RetryClass::Other);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_business_errors_are_not_retryable() {
        let err = AppError::unknown_note_type("Basic", vec!["ForkLapisForEnglsih".to_string()]);
        assert_eq!(err.retry_class(), RetryClass::Other);
    }

    #[test]
    fn test_display_contains_context() {
        let err = AppError::anki_api_error("updateNoteFields", "note was not found");
        let text = err.to_string();
        assert!(text.contains("updateNoteFields"));
        assert!(text.contains("note was not found"));
    }
}
