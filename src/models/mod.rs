pub mod loaders;
pub mod note;
pub mod note_type;
pub mod report;

pub use loaders::{load_note_type, load_note_types_dir};
pub use note::{AnkiNote, LlmWordData, ProcessingOutcome, ProcessingRecord, STATUS_FROM_CACHE};
pub use note_type::{builtin_note_types, FieldMode, FieldSpec, NoteTypeConfig};
pub use report::{DeckPreview, DeckReport, FieldIssue, NoteSample, ValidationReport};
