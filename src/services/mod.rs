pub mod freq;
pub mod limiter;
pub mod retry;
pub mod validator;

pub use freq::{FrequencyService, DEFAULT_RANK};
pub use limiter::{SemaphorePool, POOL_ANKI_BATCH, POOL_OPENAI_TEXT, POOL_OPENAI_TTS};
pub use retry::RetryPolicy;
pub use validator::NoteValidator;
