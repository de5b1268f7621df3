use std::path::PathBuf;
use thiserror::Error;

use crate::model::CommandStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("history source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve history file: home directory not found")]
    NoHomeDir,

    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("no commands selected")]
    EmptySelection,

    #[error("command #{0} not found")]
    CommandNotFound(i64),

    #[error("cannot move command #{id} from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: CommandStatus,
        to: CommandStatus,
    },

    #[error("lint check failed: {0}")]
    Lint(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit code used by the CLI when this error reaches `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CommandNotFound(_) => 3,
            Error::SourceUnavailable { .. } | Error::NoHomeDir => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
