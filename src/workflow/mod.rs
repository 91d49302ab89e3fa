pub mod note_ctx;
pub mod note_flow;

pub use note_ctx::NoteCtx;
pub use note_flow::{NoteFlow, ProcessingOptions};
