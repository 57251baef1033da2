//! Cursor over the move tree.
//!
//! The navigator only ever holds a [`Path`] plus the node ids it resolved to;
//! every read goes back through the tree, so a structural edit can never leave
//! it pointing at a detached node.

use crate::error::TreeResult;
use crate::node::{Node, NodeId};
use crate::path::{Path, PathStep, Ply};
use crate::tree::GameTree;

#[derive(Debug, Clone)]
pub struct Navigator {
    path: Path,
    node_ids: Vec<NodeId>,
    on_mainline: bool,
}

impl Navigator {
    /// A cursor on the tree root.
    pub fn new(tree: &GameTree) -> Self {
        Self {
            path: Path::root(),
            node_ids: vec![tree.root().id],
            on_mainline: true,
        }
    }

    /// Resolve `path` and make it current, stored in canonical form. On
    /// failure the cursor is left where it was.
    pub fn set_path(&mut self, tree: &GameTree, path: &Path) -> TreeResult<()> {
        let list = tree.resolve_path(path)?;
        self.path = tree.path_from_nodes(&list).unwrap_or_else(|| path.clone());
        self.node_ids = list.iter().map(|n| n.id).collect();
        self.on_mainline = self.path.is_mainline();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn tail_id(&self) -> NodeId {
        self.node_ids.last().copied().unwrap_or(NodeId(0))
    }

    pub fn on_mainline(&self) -> bool {
        self.on_mainline
    }

    pub fn node<'t>(&self, tree: &'t GameTree) -> TreeResult<&'t Node> {
        tree.node_at(&self.path)
    }

    pub fn node_list<'t>(&self, tree: &'t GameTree) -> TreeResult<Vec<&'t Node>> {
        tree.resolve_path(&self.path)
    }

    pub fn can_go_forward(&self, tree: &GameTree) -> bool {
        self.node(tree)
            .map(|node| node.mainline_child().is_some())
            .unwrap_or(false)
    }

    /// Path one ply further along the current branch, if there is a move.
    pub fn next_path(&self, tree: &GameTree) -> Option<Path> {
        if !self.can_go_forward(tree) {
            return None;
        }
        let mut path = self.path.clone();
        match path.last_mut() {
            Some(last) => last.ply += 1,
            None => path.push(PathStep::main(tree.first_ply() + 1)),
        }
        Some(path)
    }

    /// Path one ply back. Leaving a variation from its first shown ply lands
    /// one ply before the branch point on the parent line.
    pub fn prev_path(&self, tree: &GameTree) -> Option<Path> {
        let mut path = self.path.clone();
        let len = path.len();
        match len {
            0 => None,
            1 => {
                let last = path.last_mut()?;
                if last.ply <= tree.first_ply() {
                    return None;
                }
                last.ply -= 1;
                Some(path)
            }
            _ => {
                let branch_ply = path.steps()[len - 2].ply;
                let last = path.last_mut()?;
                if last.ply > branch_ply {
                    last.ply -= 1;
                } else {
                    path.pop();
                    let tail = path.last_mut()?;
                    tail.variation = None;
                    if tail.ply > 1 {
                        tail.ply -= 1;
                    }
                }
                Some(path)
            }
        }
    }

    pub fn step_forward(&mut self, tree: &GameTree) -> bool {
        match self.next_path(tree) {
            Some(path) => self.set_path(tree, &path).is_ok(),
            None => false,
        }
    }

    pub fn step_backward(&mut self, tree: &GameTree) -> bool {
        match self.prev_path(tree) {
            Some(path) => self.set_path(tree, &path).is_ok(),
            None => false,
        }
    }

    /// Path to the mainline node at `ply`.
    pub fn main_path(ply: Ply) -> Path {
        Path::mainline(ply)
    }

    /// Mainline path for a zero-based move-list index in a game that started
    /// `started_at_turn` plies in.
    pub fn index_path(index: Ply, started_at_turn: Ply) -> Path {
        Path::mainline(index + 1 + started_at_turn)
    }

    pub fn first_path(tree: &GameTree) -> Path {
        Path::mainline(tree.first_ply())
    }

    pub fn last_path(tree: &GameTree) -> Path {
        Path::mainline(tree.last_ply())
    }
}
