//! Analysis error types

use ceval::CevalError;
use game_tree::TreeError;
use thiserror::Error;

/// Rejections from the rules engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Illegal drop: {0}")]
    IllegalDrop(String),

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Variant not supported: {0}")]
    VariantUnsupported(String),
}

pub type RulesResult<T> = Result<T, RulesError>;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Evaluation error: {0}")]
    Ceval(#[from] CevalError),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
