pub mod redact;
pub mod text;
pub mod user_paths;
