//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量笔记处理器
//! - 管理应用生命周期（初始化、连接检查、缓存落盘）
//! - 批量拉取牌组笔记（Vec<AnkiNote>）
//! - 处理前校验与预览
//! - 并发展开单条笔记任务（SemaphorePool）
//! - 输出牌组级统计报告
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<AnkiNote>)
//!     ↓
//! workflow::NoteFlow (处理单条 AnkiNote)
//!     ↓
//! services (能力层：validator / retry / limiter / freq)
//!     ↓
//! clients (外部服务：AnkiConnect / LLM / TTS)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，NoteFlow 管单条
//! 2. **资源隔离**：只有编排层持有客户端和缓存的所有权
//! 3. **向下依赖**：编排层 → workflow → services → clients
//! 4. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod batch_processor;

// 重新导出主要类型
pub use batch_processor::{process_notes, App};
