pub mod toml_loader;

pub use toml_loader::{load_note_type, load_note_types_dir};
