//! Semdex error types.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SemdexError>;

/// Where inside `insert_batch` a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Validate,
    Begin,
    Write,
    Commit,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::Begin => "begin",
            Self::Write => "write",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SemdexError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Batch insert failed during {stage}{}: {cause}", fmt_index(.index))]
    BatchInsert {
        stage: BatchStage,
        index: Option<usize>,
        #[source]
        cause: Box<SemdexError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Entity extraction error: {0}")]
    EntityExtraction(String),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn fmt_index(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" at chunk {i}"),
        None => String::new(),
    }
}

impl SemdexError {
    /// Wrap a failure from the batch path with the stage it happened in.
    pub fn batch(stage: BatchStage, index: Option<usize>, cause: SemdexError) -> Self {
        Self::BatchInsert {
            stage,
            index,
            cause: Box::new(cause),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
