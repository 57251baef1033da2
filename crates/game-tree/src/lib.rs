//! Branching move tree for game analysis.
//!
//! Nodes are owned recursively by their parent and addressed from the outside
//! only through [`Path`] values, which are re-resolved against the live tree on
//! every use. Nothing here performs I/O.

pub mod error;
pub mod eval;
pub mod navigator;
pub mod node;
pub mod path;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use eval::{ClientEval, PvData, Score, ServerEval};
pub use navigator::Navigator;
pub use node::{Color, Comment, Dests, Glyph, Node, NodeId, Opening, SituationData, TreePart};
pub use path::{Path, PathStep, Ply};
pub use tree::GameTree;
