//! # Anki Enricher
//!
//! 一个批量增强 Anki 英语单词笔记的 Rust 应用程序：调用 LLM 生成释义、
//! 合成单词发音、查询词频，并把结果写回 Anki。全程幂等，可安全中断重跑。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 封装外部服务调用，内部处理重试
//! - `AnkiClient` - AnkiConnect 协议客户端（查询、写回、媒体上传）
//! - `LlmClient` - OpenAI 兼容的文本生成客户端
//! - `VoiceClient` - OpenAI 兼容的语音合成客户端
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，与具体流程无关
//! - `NoteValidator` - 按笔记类型配置校验笔记
//! - `RetryPolicy` - 指数退避重试策略
//! - `SemaphorePool` - 命名信号量池，限制远程调用并发
//! - `FrequencyService` - 本地词频词典查询
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一条笔记"的完整处理流程
//! - `NoteCtx` - 上下文封装（note_id + 进度序号）
//! - `NoteFlow` - 流程编排（缓存检查 → 生成 → 语音 → 词频 → 写回）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 牌组级批量处理，管理资源和并发
//!
//! ## 模块结构

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod prompts;

pub mod clients;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use cache::{CacheKind, CacheStats, CacheStore};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{AnkiNote, DeckReport, LlmWordData, NoteTypeConfig, ProcessingOutcome};
pub use orchestrator::{process_notes, App};
pub use workflow::{NoteCtx, NoteFlow, ProcessingOptions};
