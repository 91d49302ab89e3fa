/// 应用配置
///
/// 所有配置项均可通过环境变量覆盖，未设置时使用默认值。
#[derive(Clone, Debug)]
pub struct Config {
    // ========== AnkiConnect ==========
    /// AnkiConnect 服务地址
    pub anki_url: String,
    /// AnkiConnect 请求超时（秒）
    pub anki_timeout_secs: u64,
    /// notesInfo 请求的分批大小
    pub anki_batch_size: usize,

    // ========== OpenAI ==========
    /// OpenAI API 密钥（必填）
    pub openai_api_key: String,
    /// OpenAI API 基础地址
    pub openai_base_url: String,
    /// OpenAI 请求超时（秒）
    pub openai_timeout_secs: u64,
    /// 文本生成模型
    pub text_model: String,
    /// 语音合成模型
    pub tts_model: String,
    /// 语音合成音色
    pub tts_voice: String,

    // ========== 缓存 ==========
    /// 缓存目录
    pub cache_dir: String,
    /// 本地词频词典路径（留空则禁用本地词典）
    pub freq_dict_path: String,
    /// 笔记类型 TOML 配置目录（留空则只使用内置配置）
    pub note_types_dir: String,
    /// 处理记录的最大保留天数，超过后在启动时清理
    pub max_cache_age_days: i64,

    // ========== 处理行为 ==========
    /// 试运行：只校验和统计，不写回 Anki
    pub dry_run: bool,
    /// 强制重新生成的环节（all / llm / openai，逗号分隔）
    pub force_regenerate: Vec<String>,
    /// 跳过音频合成
    pub skip_audio: bool,
    /// 跳过词频查询
    pub skip_frequency: bool,
    /// 跳过校验不通过的笔记（false 则整批中止）
    pub skip_invalid_notes: bool,

    // ========== 并发与重试 ==========
    /// 文本生成的最大并发数
    pub text_concurrency: usize,
    /// 语音合成的最大并发数
    pub tts_concurrency: usize,
    /// Anki 写回的最大并发数
    pub anki_concurrency: usize,
    /// 单次远程调用的最大尝试次数
    pub max_retries: u32,
    /// 重试基础延迟（秒）
    pub retry_base_delay_secs: f64,
    /// 重试延迟上限（秒）
    pub retry_max_delay_secs: f64,
    /// 重试延迟的指数底数
    pub retry_exponential_base: f64,

    // ========== 运行目标 ==========
    /// 目标牌组名（留空则进入交互式选择）
    pub deck_name: String,
    /// 目标笔记类型名（留空则进入交互式选择）
    pub note_type: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anki_url: "http://127.0.0.1:8765".to_string(),
            anki_timeout_secs: 30,
            anki_batch_size: 50,

            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_timeout_secs: 60,
            text_model: "gpt-4-turbo-preview".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),

            cache_dir: "cache".to_string(),
            freq_dict_path: String::new(),
            note_types_dir: String::new(),
            max_cache_age_days: 30,

            dry_run: false,
            force_regenerate: Vec::new(),
            skip_audio: false,
            skip_frequency: false,
            skip_invalid_notes: true,

            text_concurrency: 10,
            tts_concurrency: 5,
            anki_concurrency: 50,
            max_retries: 3,
            retry_base_delay_secs: 1.0,
            retry_max_delay_secs: 60.0,
            retry_exponential_base: 2.0,

            deck_name: String::new(),
            note_type: String::new(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let default = Config::default();

        Config {
            anki_url: std::env::var("ANKI_CONNECT_URL").unwrap_or(default.anki_url),
            anki_timeout_secs: env_parse("ANKI_TIMEOUT_SECS", default.anki_timeout_secs),
            anki_batch_size: env_parse("ANKI_BATCH_SIZE", default.anki_batch_size),

            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(default.openai_api_key),
            openai_base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(default.openai_base_url),
            openai_timeout_secs: env_parse("OPENAI_TIMEOUT_SECS", default.openai_timeout_secs),
            text_model: std::env::var("OPENAI_TEXT_MODEL").unwrap_or(default.text_model),
            tts_model: std::env::var("OPENAI_TTS_MODEL").unwrap_or(default.tts_model),
            tts_voice: std::env::var("OPENAI_TTS_VOICE").unwrap_or(default.tts_voice),

            cache_dir: std::env::var("CACHE_DIR").unwrap_or(default.cache_dir),
            freq_dict_path: std::env::var("FREQ_DICT_PATH").unwrap_or(default.freq_dict_path),
            note_types_dir: std::env::var("NOTE_TYPES_DIR").unwrap_or(default.note_types_dir),
            max_cache_age_days: env_parse("CACHE_MAX_AGE_DAYS", default.max_cache_age_days),

            dry_run: env_flag("DRY_RUN", default.dry_run),
            force_regenerate: env_list("FORCE_REGENERATE"),
            skip_audio: env_flag("SKIP_AUDIO", default.skip_audio),
            skip_frequency: env_flag("SKIP_FREQUENCY", default.skip_frequency),
            skip_invalid_notes: env_flag("SKIP_INVALID_NOTES", default.skip_invalid_notes),

            text_concurrency: env_parse("TEXT_CONCURRENCY", default.text_concurrency),
            tts_concurrency: env_parse("TTS_CONCURRENCY", default.tts_concurrency),
            anki_concurrency: env_parse("ANKI_CONCURRENCY", default.anki_concurrency),
            max_retries: env_parse("MAX_RETRIES", default.max_retries),
            retry_base_delay_secs: env_parse("RETRY_BASE_DELAY", default.retry_base_delay_secs),
            retry_max_delay_secs: env_parse("RETRY_MAX_DELAY", default.retry_max_delay_secs),
            retry_exponential_base: env_parse(
                "RETRY_EXPONENTIAL_BASE",
                default.retry_exponential_base,
            ),

            deck_name: std::env::var("DECK_NAME").unwrap_or(default.deck_name),
            note_type: std::env::var("NOTE_TYPE").unwrap_or(default.note_type),
        }
    }
}

/// 读取并解析数值型环境变量，解析失败时回退默认值
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 读取布尔型环境变量，接受 1/true/yes/on（不区分大小写）
fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// 读取逗号分隔的列表型环境变量，各项去除空白并转为小写
fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
