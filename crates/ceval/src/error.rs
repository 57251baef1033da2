//! Evaluation error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CevalError {
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type CevalResult<T> = Result<T, CevalError>;
