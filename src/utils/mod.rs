pub mod logging;
pub mod progress;
pub mod text;

pub use progress::ProgressTracker;
