//! Shell history ingestion: lines are scanned from the history file,
//! assembled into commands, gated against the watermark and handed to a
//! store-side sink that decides what gets persisted.

pub mod classifier;
pub mod ingest;
pub mod parser;
pub mod scanner;

pub use classifier::ImportStats;
pub use ingest::{run_import_pass, IngestAborted};
pub use parser::sanitize_command;
pub use scanner::resolve_history_path;
