use std::path::PathBuf;

use thiserror::Error;

/// Main error type for CodeLens operations
#[derive(Error, Debug)]
pub enum CodeLensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("Unsupported language for file: {}", .0.display())]
    UnsupportedLanguage(PathBuf),

    #[error("Unknown root entity: {0}")]
    UnknownRoot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),
}

pub type Result<T> = std::result::Result<T, CodeLensError>;
