//! 笔记处理上下文
//!
//! 封装"我正在处理这一批里的第几条笔记"这一信息

use std::fmt::Display;

/// 笔记处理上下文
#[derive(Debug, Clone)]
pub struct NoteCtx {
    /// 笔记 ID
    pub note_id: i64,

    /// 在本批中的序号（从 1 开始，仅用于日志显示）
    pub index: usize,

    /// 本批笔记总数
    pub total: usize,
}

impl NoteCtx {
    pub fn new(note_id: i64, index: usize, total: usize) -> Self {
        Self {
            note_id,
            index,
            total,
        }
    }
}

impl Display for NoteCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[笔记 {} ({}/{})]", self.note_id, self.index, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        let ctx = NoteCtx::new(1502298033753, 3, 20);
        assert_eq!(ctx.to_string(), "[笔记 1502298033753 (3/20)]");
    }
}
