//! Tree error types

use thiserror::Error;

use crate::path::{Path, Ply};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Path not found: {0}")]
    PathNotFound(Path),

    #[error("Cannot build a tree from an empty move history")]
    EmptyHistory,

    #[error("No variation {variation} at ply {ply}")]
    NoSuchVariation { ply: Ply, variation: usize },

    #[error("Path does not address a variation: {0}")]
    NotAVariation(Path),

    #[error("Invalid path syntax: {0}")]
    InvalidPath(String),
}

pub type TreeResult<T> = Result<T, TreeError>;
