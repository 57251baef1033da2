//! Move tree and cursor behaviour over real game positions.

mod common;

use analysis::{ShakmatyRules, Variant};
use game_tree::{GameTree, Navigator, Path, PathStep, SituationData};

fn play(tree: &GameTree, at: &Path, uci: &str) -> SituationData {
    let fen = tree.node_at(at).unwrap().fen.clone();
    ShakmatyRules.play_sync(Variant::Standard, &fen, uci).unwrap()
}

/// Root, 1. e4, and three answers at ply 2: e5 (mainline), c5, e6.
fn branching_tree() -> GameTree {
    let mut tree = GameTree::reconstruct(common::parts(&["e2e4", "e7e5"])).unwrap();
    let at = Path::mainline(1);
    for uci in ["c7c5", "e7e6"] {
        let data = play(&tree, &at, uci);
        tree.add_node(data, &at).unwrap();
    }
    tree
}

fn sans_at(tree: &GameTree, path: &Path) -> Vec<String> {
    tree.node_at(path)
        .unwrap()
        .children()
        .iter()
        .map(|c| c.san.clone().unwrap())
        .collect()
}

#[test]
fn test_promote_then_delete_sidelined_variation() {
    let mut tree = branching_tree();
    assert_eq!(sans_at(&tree, &Path::mainline(1)), vec!["e5", "c5", "e6"]);

    tree.promote_variation(2, 2).unwrap();
    let mainline = tree.mainline_node_list();
    assert_eq!(mainline[2].san.as_deref(), Some("e6"));
    assert_eq!(sans_at(&tree, &Path::mainline(1)), vec!["e6", "e5", "c5"]);

    tree.delete_variation(2, 1).unwrap();
    assert_eq!(sans_at(&tree, &Path::mainline(1)), vec!["e6", "c5"]);
    let mainline = tree.mainline_node_list();
    assert_eq!(mainline.len(), 3);
    assert_eq!(mainline[2].san.as_deref(), Some("e6"));
}

#[test]
fn test_every_path_round_trips() {
    let mut tree = branching_tree();
    let c5: Path = "2:1/2".parse().unwrap();
    let nf3 = tree.add_node(play(&tree, &c5, "g1f3"), &c5).unwrap();
    let nc3 = tree.add_node(play(&tree, &c5, "b1c3"), &c5).unwrap();
    let d6 = tree.add_node(play(&tree, &nc3, "d7d6"), &nc3).unwrap();

    let paths = [
        Path::root(),
        Path::mainline(1),
        Path::mainline(2),
        c5,
        "2:2/2".parse().unwrap(),
        nf3,
        nc3,
        d6.clone(),
    ];
    for path in paths {
        let list = tree.resolve_path(&path).unwrap();
        assert_eq!(tree.path_from_nodes(&list).as_ref(), Some(&path), "{path}");
    }
    assert_eq!(d6.to_string(), "2:1/3:1/4");
}

#[test]
fn test_add_node_twice_keeps_one_child() {
    let mut tree = branching_tree();
    let at = Path::mainline(1);
    let data = play(&tree, &at, "c7c5");
    let first = tree.add_node(data.clone(), &at).unwrap();
    let second = tree.add_node(data, &at).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, Path::from_steps(vec![PathStep::variation(2, 1), PathStep::main(2)]));
    assert_eq!(tree.node_at(&at).unwrap().children().len(), 3);
}

#[test]
fn test_navigator_walks_in_and_out_of_variation() {
    let mut tree = branching_tree();
    let e6: Path = "2:2/2".parse().unwrap();
    let after = tree.add_node(play(&tree, &e6, "d2d4"), &e6).unwrap();
    assert_eq!(after.to_string(), "2:2/3");

    let mut nav = Navigator::new(&tree);
    nav.set_path(&tree, &e6).unwrap();
    assert!(!nav.on_mainline());

    assert!(nav.step_forward(&tree));
    assert_eq!(nav.node(&tree).unwrap().san.as_deref(), Some("d4"));
    assert!(!nav.step_forward(&tree));

    assert!(nav.step_backward(&tree));
    assert_eq!(nav.path(), &e6);
    assert!(nav.step_backward(&tree));
    assert_eq!(nav.path(), &Path::mainline(1));
    assert!(nav.on_mainline());
}

#[test]
fn test_cursor_survives_promotion_by_node_id() {
    let mut tree = branching_tree();
    let c5: Path = "2:1/2".parse().unwrap();
    let id = tree.node_at(&c5).unwrap().id;

    tree.promote_variation_at(&c5).unwrap();
    let renamed = tree.path_of(id).unwrap();
    assert_eq!(renamed, Path::mainline(2));
    assert_eq!(tree.node_at(&renamed).unwrap().san.as_deref(), Some("c5"));
    assert!(tree.resolve_path(&c5).is_ok());
    assert_eq!(tree.node_at(&c5).unwrap().san.as_deref(), Some("e5"));
}
