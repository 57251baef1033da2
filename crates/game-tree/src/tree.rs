//! The move tree: construction, path resolution and structural edits.

use crate::error::{TreeError, TreeResult};
use crate::node::{Color, Node, NodeId, SituationData, TreePart};
use crate::path::{Path, PathStep, Ply};

/// Owns the node graph. Child 0 of every node is its mainline continuation;
/// every structural edit keeps it that way.
#[derive(Debug, Clone)]
pub struct GameTree {
    root: Node,
    next_id: u32,
}

impl GameTree {
    /// Build the nested tree from the server's flat history.
    pub fn reconstruct(parts: Vec<TreePart>) -> TreeResult<Self> {
        let mut next_id = 0;
        let mut nodes: Vec<Node> = parts
            .into_iter()
            .map(|part| node_from_part(part, &mut next_id))
            .collect();

        let mut tail = nodes.pop().ok_or(TreeError::EmptyHistory)?;
        while let Some(mut node) = nodes.pop() {
            node.children.insert(0, tail);
            tail = node;
        }

        Ok(Self {
            root: tail,
            next_id,
        })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn first_ply(&self) -> Ply {
        self.root.ply
    }

    pub fn last_ply(&self) -> Ply {
        let mut node = &self.root;
        while let Some(child) = node.mainline_child() {
            node = child;
        }
        node.ply
    }

    /// Nodes from the root to the target of `path`, inclusive.
    pub fn resolve_path(&self, path: &Path) -> TreeResult<Vec<&Node>> {
        let route = self.route(path)?;
        let mut list = Vec::with_capacity(route.len() + 1);
        let mut node = &self.root;
        list.push(node);
        for &idx in &route {
            node = &node.children[idx];
            list.push(node);
        }
        Ok(list)
    }

    pub fn node_list(&self, path: &Path) -> TreeResult<Vec<&Node>> {
        self.resolve_path(path)
    }

    pub fn node_at(&self, path: &Path) -> TreeResult<&Node> {
        let route = self.route(path)?;
        let mut node = &self.root;
        for &idx in &route {
            node = &node.children[idx];
        }
        Ok(node)
    }

    /// Walk child 0 from the root.
    pub fn mainline_node_list(&self) -> Vec<&Node> {
        let mut list = vec![&self.root];
        let mut node = &self.root;
        while let Some(child) = node.mainline_child() {
            list.push(child);
            node = child;
        }
        list
    }

    pub fn path_is_mainline(&self, path: &Path) -> bool {
        path.is_mainline() && self.route(path).is_ok()
    }

    /// Canonical path for a root-to-target node list, or `None` when the list
    /// is not a chain of parent/child links starting at the root.
    pub fn path_from_nodes(&self, nodes: &[&Node]) -> Option<Path> {
        let (first, rest) = nodes.split_first()?;
        if first.id != self.root.id {
            return None;
        }
        let mut path = Path::root();
        let mut parent = *first;
        for child in rest {
            let idx = parent.children.iter().position(|c| c.id == child.id)?;
            extend_path(&mut path, child.ply, idx);
            parent = child;
        }
        Some(path)
    }

    /// Current canonical path of the node with `id`, if it is still in the tree.
    pub fn path_of(&self, id: NodeId) -> Option<Path> {
        let mut route = Vec::new();
        if find_route(&self.root, id, &mut route) {
            Some(self.path_from_route(&route))
        } else {
            None
        }
    }

    /// True when the target of `outer` lies on the way to (or is) the target
    /// of `inner`.
    pub fn path_contains(&self, outer: &Path, inner: &Path) -> bool {
        match (self.node_at(outer), self.resolve_path(inner)) {
            (Ok(target), Ok(list)) => list.iter().any(|n| n.id == target.id),
            _ => false,
        }
    }

    /// Insert a move below the node at `at`. Re-entering a move that already
    /// exists there returns the existing child's path instead of duplicating.
    pub fn add_node(&mut self, mut data: SituationData, at: &Path) -> TreeResult<Path> {
        let mut route = self.route(at)?;
        let id = NodeId(self.next_id);
        let parent = self
            .node_at_route_mut(&route)
            .ok_or_else(|| TreeError::PathNotFound(at.clone()))?;

        let existing = parent
            .children
            .iter()
            .position(|c| c.uci.is_some() && c.uci == data.uci);

        match existing {
            Some(idx) => route.push(idx),
            None => {
                data.ply = parent.ply + 1;
                data.player = Color::to_move_at(data.ply);
                parent.children.push(Node::from_situation(id, data));
                route.push(parent.children.len() - 1);
                self.next_id += 1;
            }
        }

        Ok(self.path_from_route(&route))
    }

    /// Remove mainline variation `variation` branching at `ply`.
    pub fn delete_variation(&mut self, ply: Ply, variation: usize) -> TreeResult<()> {
        let parent_route = self.mainline_route_to(ply.saturating_sub(1))?;
        self.remove_child(&parent_route, ply, variation).map(|_| ())
    }

    /// Promote mainline variation `variation` branching at `ply` to mainline.
    pub fn promote_variation(&mut self, ply: Ply, variation: usize) -> TreeResult<()> {
        let parent_route = self.mainline_route_to(ply.saturating_sub(1))?;
        self.move_child_to_front(&parent_route, ply, variation)
    }

    /// Remove the variation whose first node is addressed by `path`, at any
    /// nesting depth. Returns the path of the node it branched from.
    pub fn delete_variation_at(&mut self, path: &Path) -> TreeResult<Path> {
        let (parent_route, ply, variation) = self.variation_route(path)?;
        self.remove_child(&parent_route, ply, variation)?;
        Ok(self.path_from_route(&parent_route))
    }

    /// Make the variation addressed by `path` the mainline of its parent; the
    /// previous mainline and the other siblings shift down one slot.
    pub fn promote_variation_at(&mut self, path: &Path) -> TreeResult<()> {
        let (parent_route, ply, variation) = self.variation_route(path)?;
        self.move_child_to_front(&parent_route, ply, variation)
    }

    /// Best-effort in-place mutation. Returns false, without touching
    /// anything, when `path` no longer resolves.
    pub fn update_at_path<F>(&mut self, path: &Path, mutator: F) -> bool
    where
        F: FnOnce(&mut Node),
    {
        let Ok(route) = self.route(path) else {
            return false;
        };
        match self.node_at_route_mut(&route) {
            Some(node) => {
                mutator(node);
                true
            }
            None => false,
        }
    }

    /// Store lazily computed rules-engine facts on the node at `path`.
    pub fn fill_situation(&mut self, path: &Path, data: &SituationData) -> bool {
        self.update_at_path(path, |node| node.fill_situation(data))
    }

    /// Path to the last node of `mainline` prefix satisfying `pred`.
    pub fn take_path_while<F>(mainline: &[&Node], pred: F) -> Path
    where
        F: Fn(&Node) -> bool,
    {
        let last = mainline.iter().skip(1).take_while(|n| pred(n)).last();
        match last {
            Some(node) => Path::mainline(node.ply),
            None => Path::root(),
        }
    }

    // ---- internals ----

    /// Child indices from the root to the target of `path`.
    fn route(&self, path: &Path) -> TreeResult<Vec<usize>> {
        let not_found = || TreeError::PathNotFound(path.clone());
        let mut route = Vec::new();
        let mut node = &self.root;

        for step in path.steps() {
            while node.ply + 1 < step.ply {
                node = node.children.first().ok_or_else(not_found)?;
                route.push(0);
            }
            if step.variation.is_none() && node.ply == step.ply {
                continue;
            }
            let idx = step.variation.unwrap_or(0);
            match node.children.get(idx) {
                Some(child) if child.ply == step.ply => {
                    node = child;
                    route.push(idx);
                }
                _ => return Err(not_found()),
            }
        }
        Ok(route)
    }

    fn node_at_route_mut(&mut self, route: &[usize]) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for &idx in route {
            node = node.children.get_mut(idx)?;
        }
        Some(node)
    }

    fn path_from_route(&self, route: &[usize]) -> Path {
        let mut path = Path::root();
        let mut node = &self.root;
        for &idx in route {
            node = &node.children[idx];
            extend_path(&mut path, node.ply, idx);
        }
        path
    }

    fn mainline_route_to(&self, ply: Ply) -> TreeResult<Vec<usize>> {
        let mut route = Vec::new();
        let mut node = &self.root;
        while node.ply < ply {
            node = node
                .mainline_child()
                .ok_or_else(|| TreeError::PathNotFound(Path::mainline(ply)))?;
            route.push(0);
        }
        if node.ply == ply {
            Ok(route)
        } else {
            Err(TreeError::PathNotFound(Path::mainline(ply)))
        }
    }

    /// Parent route, ply and child index of the variation entered by the last
    /// variation step of `path`.
    fn variation_route(&self, path: &Path) -> TreeResult<(Vec<usize>, Ply, usize)> {
        let step_idx = path
            .last_variation_step()
            .ok_or_else(|| TreeError::NotAVariation(path.clone()))?;
        let step = path.steps()[step_idx];
        let mut route = self.route(&path.prefix(step_idx))?;
        match route.pop() {
            Some(idx) if idx > 0 => Ok((route, step.ply, idx)),
            _ => Err(TreeError::NotAVariation(path.clone())),
        }
    }

    fn remove_child(&mut self, parent_route: &[usize], ply: Ply, variation: usize) -> TreeResult<Node> {
        let parent = self
            .node_at_route_mut(parent_route)
            .ok_or(TreeError::NoSuchVariation { ply, variation })?;
        if variation == 0 || variation >= parent.children.len() {
            return Err(TreeError::NoSuchVariation { ply, variation });
        }
        Ok(parent.children.remove(variation))
    }

    fn move_child_to_front(&mut self, parent_route: &[usize], ply: Ply, variation: usize) -> TreeResult<()> {
        let child = self.remove_child(parent_route, ply, variation)?;
        if let Some(parent) = self.node_at_route_mut(parent_route) {
            parent.children.insert(0, child);
        }
        Ok(())
    }
}

/// Append one parent-to-child link to a canonical path.
fn extend_path(path: &mut Path, child_ply: Ply, idx: usize) {
    if idx == 0 {
        match path.last_mut() {
            Some(last) if last.variation.is_none() => last.ply = child_ply,
            _ => path.push(PathStep::main(child_ply)),
        }
    } else {
        match path.last_mut() {
            Some(last) if last.variation.is_none() => *last = PathStep::variation(child_ply, idx),
            _ => path.push(PathStep::variation(child_ply, idx)),
        }
        path.push(PathStep::main(child_ply));
    }
}

fn find_route(node: &Node, id: NodeId, route: &mut Vec<usize>) -> bool {
    if node.id == id {
        return true;
    }
    for (idx, child) in node.children.iter().enumerate() {
        route.push(idx);
        if find_route(child, id, route) {
            return true;
        }
        route.pop();
    }
    false
}

fn node_from_part(part: TreePart, next_id: &mut u32) -> Node {
    let id = NodeId(*next_id);
    *next_id += 1;
    let children = part
        .children
        .into_iter()
        .map(|child| node_from_part(child, next_id))
        .collect();

    Node {
        id,
        ply: part.ply,
        uci: part.uci,
        san: part.san,
        fen: part.fen,
        dests: part.dests,
        drops: part.drops,
        check: part.check,
        end: part.end,
        player: Color::to_move_at(part.ply),
        opening: part.opening,
        comments: part.comments,
        glyphs: part.glyphs,
        clock: part.clock,
        ceval: None,
        eval: part.eval,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(ply: Ply, uci: &str) -> TreePart {
        TreePart {
            ply,
            uci: (!uci.is_empty()).then(|| uci.to_string()),
            fen: format!("fen-{ply}-{uci}"),
            ..Default::default()
        }
    }

    fn situation(uci: &str) -> SituationData {
        SituationData {
            ply: 0,
            fen: format!("fen-{uci}"),
            uci: Some(uci.to_string()),
            san: None,
            dests: None,
            drops: None,
            check: false,
            end: None,
            player: Color::White,
        }
    }

    /// root(0) - e2e4(1) - e7e5(2) - g1f3(3), with c7c5 as a variation at ply 2
    fn sample_tree() -> GameTree {
        let mut ply1 = part(1, "e2e4");
        ply1.children.push(part(2, "c7c5"));
        GameTree::reconstruct(vec![part(0, ""), ply1, part(2, "e7e5"), part(3, "g1f3")]).unwrap()
    }

    #[test]
    fn test_reconstruct_nests_mainline_first() {
        let tree = sample_tree();
        let ply1 = tree.root().mainline_child().unwrap();
        assert_eq!(ply1.children().len(), 2);
        assert_eq!(ply1.children()[0].uci.as_deref(), Some("e7e5"));
        assert_eq!(ply1.children()[1].uci.as_deref(), Some("c7c5"));
        assert_eq!(tree.last_ply(), 3);
        assert_eq!(tree.first_ply(), 0);
    }

    #[test]
    fn test_reconstruct_rejects_empty_history() {
        assert_eq!(GameTree::reconstruct(vec![]).unwrap_err(), TreeError::EmptyHistory);
    }

    #[test]
    fn test_resolve_mainline_and_variation() {
        let tree = sample_tree();

        let main = tree.resolve_path(&Path::mainline(3)).unwrap();
        assert_eq!(main.len(), 4);
        assert_eq!(main[3].uci.as_deref(), Some("g1f3"));

        let var = Path::from_steps(vec![PathStep::variation(2, 1), PathStep::main(2)]);
        let list = tree.resolve_path(&var).unwrap();
        assert_eq!(list.last().unwrap().uci.as_deref(), Some("c7c5"));

        assert!(tree.resolve_path(&Path::mainline(9)).is_err());
        let bad = Path::from_steps(vec![PathStep::variation(2, 4)]);
        assert!(matches!(tree.resolve_path(&bad), Err(TreeError::PathNotFound(_))));
    }

    #[test]
    fn test_path_round_trip() {
        let mut tree = sample_tree();
        let var = Path::from_steps(vec![PathStep::variation(2, 1), PathStep::main(2)]);
        let deeper = tree.add_node(situation("g1f3"), &var).unwrap();
        let nested = tree.add_node(situation("b1c3"), &var).unwrap();

        for path in [Path::root(), Path::mainline(2), var, deeper, nested] {
            let list = tree.resolve_path(&path).unwrap();
            assert_eq!(tree.path_from_nodes(&list), Some(path));
        }
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut tree = sample_tree();
        let at = Path::mainline(1);

        let first = tree.add_node(situation("d7d5"), &at).unwrap();
        let second = tree.add_node(situation("d7d5"), &at).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_string(), "2:2/2");
        assert_eq!(tree.node_at(&at).unwrap().children().len(), 3);
    }

    #[test]
    fn test_add_node_existing_mainline_move() {
        let mut tree = sample_tree();
        let path = tree.add_node(situation("e7e5"), &Path::mainline(1)).unwrap();
        assert_eq!(path, Path::mainline(2));
    }

    #[test]
    fn test_add_node_at_end_extends_mainline() {
        let mut tree = sample_tree();
        let path = tree.add_node(situation("b8c6"), &Path::mainline(3)).unwrap();
        assert_eq!(path, Path::mainline(4));
        assert_eq!(tree.last_ply(), 4);
        assert_eq!(tree.node_at(&path).unwrap().player, Color::White);
    }

    #[test]
    fn test_promote_and_delete() {
        let mut tree = sample_tree();
        tree.add_node(situation("d7d5"), &Path::mainline(1)).unwrap();

        tree.promote_variation(2, 2).unwrap();
        let mainline = tree.mainline_node_list();
        assert_eq!(mainline[2].uci.as_deref(), Some("d7d5"));
        let ply1 = tree.node_at(&Path::mainline(1)).unwrap();
        let order: Vec<_> = ply1.children().iter().map(|c| c.uci.clone().unwrap()).collect();
        assert_eq!(order, vec!["d7d5", "e7e5", "c7c5"]);

        tree.delete_variation(2, 1).unwrap();
        let ply1 = tree.node_at(&Path::mainline(1)).unwrap();
        let order: Vec<_> = ply1.children().iter().map(|c| c.uci.clone().unwrap()).collect();
        assert_eq!(order, vec!["d7d5", "c7c5"]);
        assert_eq!(tree.mainline_node_list()[2].uci.as_deref(), Some("d7d5"));
    }

    #[test]
    fn test_delete_rejects_mainline_slot() {
        let mut tree = sample_tree();
        assert_eq!(
            tree.delete_variation(2, 0),
            Err(TreeError::NoSuchVariation { ply: 2, variation: 0 })
        );
        assert!(tree.delete_variation(2, 5).is_err());
    }

    #[test]
    fn test_nested_variation_edits() {
        let mut tree = sample_tree();
        let var = Path::from_steps(vec![PathStep::variation(2, 1), PathStep::main(2)]);
        tree.add_node(situation("g1f3"), &var).unwrap();
        let nested = tree.add_node(situation("b1c3"), &var).unwrap();
        assert_eq!(nested.to_string(), "2:1/3:1/3");

        tree.promote_variation_at(&nested).unwrap();
        let c5 = tree.node_at(&var).unwrap();
        assert_eq!(c5.children()[0].uci.as_deref(), Some("b1c3"));

        let sidelined: Path = "2:1/3:1/3".parse().unwrap();
        let parent = tree.delete_variation_at(&sidelined).unwrap();
        assert_eq!(parent, var);
        assert_eq!(tree.node_at(&var).unwrap().children().len(), 1);

        assert!(matches!(
            tree.delete_variation_at(&Path::mainline(2)),
            Err(TreeError::NotAVariation(_))
        ));
    }

    #[test]
    fn test_update_at_path_is_best_effort() {
        let mut tree = sample_tree();
        assert!(tree.update_at_path(&Path::mainline(2), |n| n.check = true));
        assert!(tree.node_at(&Path::mainline(2)).unwrap().check);

        let gone: Path = "2:1/2".parse().unwrap();
        let mut filled = situation("c7c5");
        filled.dests = Some(Default::default());
        filled.end = Some(false);
        assert!(tree.fill_situation(&gone, &filled));
        assert_eq!(tree.node_at(&gone).unwrap().end, Some(false));

        tree.delete_variation(2, 1).unwrap();
        assert!(!tree.update_at_path(&gone, |n| n.check = true));
        assert!(!tree.fill_situation(&gone, &filled));
    }

    #[test]
    fn test_path_of_follows_structural_edits() {
        let mut tree = sample_tree();
        let var: Path = "2:1/2".parse().unwrap();
        let id = tree.node_at(&var).unwrap().id;

        tree.promote_variation(2, 1).unwrap();
        assert_eq!(tree.path_of(id), Some(Path::mainline(2)));

        tree.delete_variation(2, 1).unwrap();
        assert_eq!(tree.path_of(id), Some(Path::mainline(2)));
        assert!(tree.path_contains(&Path::mainline(1), &Path::mainline(2)));
        assert!(!tree.path_contains(&Path::mainline(2), &Path::mainline(1)));
    }

    #[test]
    fn test_take_path_while() {
        let tree = sample_tree();
        let mainline = tree.mainline_node_list();
        assert_eq!(GameTree::take_path_while(&mainline, |n| n.ply <= 2), Path::mainline(2));
        assert_eq!(GameTree::take_path_while(&mainline, |n| n.ply <= 0), Path::root());
        assert_eq!(GameTree::take_path_while(&mainline, |_| true), Path::mainline(3));
    }
}
