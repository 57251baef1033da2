//! Tree node and its flat serialization

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::eval::{ClientEval, ServerEval};
use crate::path::Ply;

/// Legal destinations keyed by origin square, e.g. `"e2" -> ["e3", "e4"]`.
pub type Dests = BTreeMap<String, Vec<String>>;

/// Stable node identity. Assigned at creation, never reused within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// Side to move once `ply` half-moves have been played.
    pub fn to_move_at(ply: Ply) -> Self {
        if ply % 2 == 0 {
            Color::White
        } else {
            Color::Black
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    pub eco: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub by: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glyph {
    pub name: String,
    pub symbol: String,
}

/// One ply of the game.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub ply: Ply,
    /// Move that led here, coordinate notation. `None` at the root.
    pub uci: Option<String>,
    /// Same move, algebraic notation.
    pub san: Option<String>,
    pub fen: String,
    /// Filled lazily by the rules engine.
    pub dests: Option<Dests>,
    pub drops: Option<Vec<String>>,
    pub check: bool,
    /// Filled lazily by the rules engine.
    pub end: Option<bool>,
    /// Side to move in this position.
    pub player: Color,
    pub opening: Option<Opening>,
    pub comments: Vec<Comment>,
    pub glyphs: Vec<Glyph>,
    /// Remaining clock in centiseconds.
    pub clock: Option<u32>,
    pub ceval: Option<ClientEval>,
    pub eval: Option<ServerEval>,
    #[serde(skip)]
    pub(crate) children: Vec<Node>,
}

impl Node {
    /// Child 0 is the mainline continuation, 1.. are variations.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn mainline_child(&self) -> Option<&Node> {
        self.children.first()
    }

    /// Whether the position is over: the rules engine's end flag when known,
    /// otherwise a checking move notated as mate.
    pub fn is_game_over(&self) -> bool {
        match self.end {
            Some(end) => end,
            None => self.check && self.san.as_deref().is_some_and(|san| san.ends_with('#')),
        }
    }

    pub(crate) fn from_situation(id: NodeId, data: SituationData) -> Self {
        Self {
            id,
            ply: data.ply,
            uci: data.uci,
            san: data.san,
            fen: data.fen,
            dests: data.dests,
            drops: data.drops,
            check: data.check,
            end: data.end,
            player: data.player,
            opening: None,
            comments: Vec::new(),
            glyphs: Vec::new(),
            clock: None,
            ceval: None,
            eval: None,
            children: Vec::new(),
        }
    }

    /// Apply lazily computed rules-engine fields. Move fields are left alone.
    pub fn fill_situation(&mut self, data: &SituationData) {
        if data.dests.is_some() {
            self.dests = data.dests.clone();
        }
        if data.drops.is_some() {
            self.drops = data.drops.clone();
        }
        if data.end.is_some() {
            self.end = data.end;
        }
        self.check = data.check;
    }
}

/// Position facts returned by the rules engine for a new or existing node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationData {
    pub ply: Ply,
    pub fen: String,
    #[serde(default)]
    pub uci: Option<String>,
    #[serde(default)]
    pub san: Option<String>,
    #[serde(default)]
    pub dests: Option<Dests>,
    #[serde(default)]
    pub drops: Option<Vec<String>>,
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub end: Option<bool>,
    pub player: Color,
}

/// Flat history entry as delivered by the game server.
///
/// A history is an ordered list of parts; each part becomes the mainline child
/// of the previous one. Its own `children` are alternative continuations that
/// arrive already nested and end up as variations after the mainline child.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreePart {
    pub ply: Ply,
    #[serde(default)]
    pub uci: Option<String>,
    #[serde(default)]
    pub san: Option<String>,
    pub fen: String,
    #[serde(default)]
    pub dests: Option<Dests>,
    #[serde(default)]
    pub drops: Option<Vec<String>>,
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub end: Option<bool>,
    #[serde(default)]
    pub opening: Option<Opening>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub glyphs: Vec<Glyph>,
    #[serde(default)]
    pub clock: Option<u32>,
    #[serde(default)]
    pub eval: Option<ServerEval>,
    #[serde(default)]
    pub children: Vec<TreePart>,
}
