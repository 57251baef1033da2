//! Analysis session controller.
//!
//! Owns the tree and the cursor and runs on a single task. Engine results,
//! rules-engine answers and debounce timers all come back as [`Event`]s and
//! are applied in [`AnalysisCoordinator::tick`], so tree reads and writes
//! never race. Engine results carry the path they were requested for and are
//! dropped once it is no longer the active one. Rules-engine answers carry the
//! id of the node that asked, so they land on that node even after a
//! structural edit renamed its path.

use std::future::pending;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ceval::{CevalSettings, EngineLauncher, EvalEmit, EvalPool, SettingsStore, Work};
use game_tree::{GameTree, Navigator, Node, NodeId, Path, Ply, SituationData, TreePart};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisResult, RulesError, RulesResult};
use crate::rules::RulesEngine;
use crate::variant::Variant;

const CEVAL_BUFFER: usize = 64;

/// Receives redraw notifications. Reads state back from the coordinator.
pub trait Presenter: Send + 'static {
    fn redraw(&self);
}

/// Everything needed to open an analysis session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionData {
    #[serde(default = "default_variant")]
    pub variant: String,
    pub tree_parts: Vec<TreePart>,
    /// Plies played before the first recorded move.
    #[serde(default)]
    pub started_at_turn: Ply,
    /// Ply to open on; defaults depend on whether the game is live.
    #[serde(default)]
    pub initial_ply: Option<Ply>,
    /// Game still being played by this user.
    #[serde(default)]
    pub live: bool,
}

fn default_variant() -> String {
    Variant::Standard.key().to_string()
}

#[derive(Debug)]
enum Event {
    Ceval(EvalEmit),
    CevalReady,
    StartCeval,
    FetchSituation,
    Moved {
        from: NodeId,
        result: RulesResult<SituationData>,
    },
    Situation {
        node: NodeId,
        fen: String,
        result: RulesResult<SituationData>,
    },
    BestSan {
        node: NodeId,
        best: String,
        result: RulesResult<SituationData>,
    },
}

/// A single pending timer. Scheduling again replaces the pending one.
struct Debounce {
    delay: Duration,
    pending: Option<Pin<Box<Sleep>>>,
}

impl Debounce {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    fn schedule(&mut self) {
        self.pending = Some(Box::pin(sleep(self.delay)));
    }

    fn cancel(&mut self) {
        self.pending = None;
    }

    /// Resolves when the pending timer fires; never resolves when idle.
    async fn fired(&mut self) {
        match self.pending.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.pending = None;
            }
            None => pending().await,
        }
    }
}

pub struct AnalysisCoordinator<R: RulesEngine, L: EngineLauncher, P: Presenter> {
    tree: GameTree,
    nav: Navigator,
    variant: Variant,
    started_at_turn: Ply,
    rules: Arc<R>,
    pool: Arc<EvalPool<L>>,
    settings: SettingsStore,
    presenter: P,
    ceval_tx: mpsc::Sender<EvalEmit>,
    ceval_rx: mpsc::Receiver<EvalEmit>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    ceval_timer: Debounce,
    situation_timer: Debounce,
    initialising: Arc<AtomicBool>,
    replaying: bool,
}

impl<R: RulesEngine, L: EngineLauncher, P: Presenter> AnalysisCoordinator<R, L, P> {
    /// Open a session. Fails for unsupported variants or an empty history.
    pub async fn new(
        session: SessionData,
        config: &AnalysisConfig,
        rules: R,
        launcher: L,
        presenter: P,
    ) -> AnalysisResult<Self> {
        let variant: Variant = session.variant.parse()?;
        let tree = GameTree::reconstruct(session.tree_parts)?;

        let settings = SettingsStore::new(&config.settings_path);
        let stored = settings.load().await;
        let allowed = !session.live && variant.analysable();
        let pool = EvalPool::new(config.pool.clone(), launcher, allowed, stored.enable_ceval);

        let init_ply = session.initial_ply.unwrap_or(if session.live {
            tree.last_ply()
        } else {
            tree.first_ply()
        });
        let initial = GameTree::take_path_while(&tree.mainline_node_list(), |n| n.ply <= init_ply);
        let mut nav = Navigator::new(&tree);
        nav.set_path(&tree, &initial)?;

        let (ceval_tx, ceval_rx) = mpsc::channel(CEVAL_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        info!(%variant, allowed, path = %nav.path(), "Analysis session opened");

        let mut coordinator = Self {
            tree,
            nav,
            variant,
            started_at_turn: session.started_at_turn,
            rules: Arc::new(rules),
            pool: Arc::new(pool),
            settings,
            presenter,
            ceval_tx,
            ceval_rx,
            events_tx,
            events_rx,
            ceval_timer: Debounce::new(config.ceval_debounce),
            situation_timer: Debounce::new(config.situation_debounce),
            initialising: Arc::new(AtomicBool::new(false)),
            replaying: false,
        };
        if coordinator.needs_situation() {
            coordinator.situation_timer.schedule();
        }
        Ok(coordinator)
    }

    // ---- state ----

    pub fn tree(&self) -> &GameTree {
        &self.tree
    }

    pub fn path(&self) -> &Path {
        self.nav.path()
    }

    pub fn navigator(&self) -> &Navigator {
        &self.nav
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn node(&self) -> Option<&Node> {
        self.nav.node(&self.tree).ok()
    }

    pub fn ceval_allowed(&self) -> bool {
        self.pool.allowed()
    }

    pub fn ceval_enabled(&self) -> bool {
        self.pool.enabled()
    }

    pub fn is_game_over(&self) -> bool {
        self.node().is_some_and(Node::is_game_over)
    }

    pub fn can_use_ceval(&self) -> bool {
        !self.is_game_over()
    }

    /// True while a fast-forward or rewind is running.
    pub fn replaying(&self) -> bool {
        self.replaying
    }

    // ---- engine lifecycle ----

    /// Bring the worker set up in the background; evaluation of the current
    /// path starts once it is ready.
    pub fn init_ceval(&self) {
        if !self.pool.enabled() {
            return;
        }
        if self.pool.is_ready() {
            self.start_ceval();
        } else {
            self.spawn_init();
        }
    }

    /// At most one initialisation in flight. A failed one is retried by the
    /// next evaluation request.
    fn spawn_init(&self) {
        if self.initialising.swap(true, Ordering::SeqCst) {
            return;
        }
        let pool = Arc::clone(&self.pool);
        let events = self.events_tx.clone();
        let initialising = Arc::clone(&self.initialising);
        tokio::spawn(async move {
            let outcome = pool.init().await;
            initialising.store(false, Ordering::SeqCst);
            match outcome {
                Ok(()) => {
                    let _ = events.send(Event::CevalReady);
                }
                Err(e) => warn!(error = %e, "Evaluation unavailable"),
            }
        });
    }

    fn start_ceval(&self) {
        if !self.pool.enabled() || !self.can_use_ceval() {
            return;
        }
        if !self.pool.is_ready() {
            self.spawn_init();
            return;
        }
        let Ok(nodes) = self.nav.node_list(&self.tree) else {
            return;
        };
        if let Some(work) = Work::from_nodes(&nodes, self.nav.path().clone()) {
            self.pool.start(work, self.ceval_tx.clone());
        }
    }

    /// Stop, flip and persist the evaluation preference, then resume on the
    /// current path when switched on. Returns once the preference is stored.
    pub async fn toggle_ceval(&mut self) {
        if !self.pool.allowed() {
            return;
        }
        self.ceval_timer.cancel();
        let enabled = self.pool.toggle();
        let settings = CevalSettings {
            enable_ceval: enabled,
        };
        if let Err(e) = self.settings.save(&settings).await {
            warn!(error = %e, "Failed to persist evaluation setting");
        }
        info!(enabled, "Evaluation toggled");
        if enabled {
            self.init_ceval();
        }
        self.presenter.redraw();
    }

    /// Stop evaluation and quit every engine.
    pub async fn shutdown(&mut self) {
        self.ceval_timer.cancel();
        self.situation_timer.cancel();
        self.pool.shutdown().await;
    }

    // ---- navigation ----

    /// Make `path` current. Unresolvable paths are ignored.
    pub fn jump(&mut self, path: &Path) {
        if let Err(e) = self.nav.set_path(&self.tree, path) {
            debug!(error = %e, "Jump ignored");
            return;
        }
        self.pool.stop();
        self.ceval_timer.schedule();
        if self.needs_situation() {
            self.situation_timer.schedule();
        }
        self.presenter.redraw();
    }

    pub fn jump_to_main(&mut self, ply: Ply) {
        self.jump(&Navigator::main_path(ply));
    }

    pub fn jump_to_index(&mut self, index: Ply) {
        self.jump(&Navigator::index_path(index, self.started_at_turn));
    }

    pub fn first(&mut self) {
        self.jump(&Navigator::first_path(&self.tree));
    }

    pub fn last(&mut self) {
        self.jump(&Navigator::last_path(&self.tree));
    }

    /// Step forward along the current branch. False at its end.
    pub fn next(&mut self) -> bool {
        match self.nav.next_path(&self.tree) {
            Some(path) => {
                self.jump(&path);
                true
            }
            None => false,
        }
    }

    /// Step backward. False at the first ply.
    pub fn prev(&mut self) -> bool {
        match self.nav.prev_path(&self.tree) {
            Some(path) => {
                self.jump(&path);
                true
            }
            None => false,
        }
    }

    /// One step of a fast-forward. Stops replaying at the end of the branch.
    pub fn fastforward(&mut self) -> bool {
        self.replaying = true;
        let more = self.next();
        if !more {
            self.replaying = false;
        }
        more
    }

    pub fn stop_fastforward(&mut self) {
        self.replaying = false;
        self.next();
    }

    /// One step of a rewind. Stops replaying at the first ply.
    pub fn rewind(&mut self) -> bool {
        self.replaying = true;
        let more = self.prev();
        if !more {
            self.replaying = false;
        }
        more
    }

    pub fn stop_rewind(&mut self) {
        self.replaying = false;
        self.prev();
    }

    // ---- user input ----

    /// Ask the rules engine to play `orig`-`dest` on the current node.
    pub fn user_move(&mut self, orig: &str, dest: &str, promotion: Option<char>) {
        let uci = match promotion {
            Some(role) => format!("{orig}{dest}{}", role.to_ascii_lowercase()),
            None => format!("{orig}{dest}"),
        };
        self.send_play(uci);
    }

    /// Ask the rules engine to drop `role` on `square`. Drops outside the
    /// node's known drop squares are reverted without asking.
    pub fn user_drop(&mut self, role: char, square: &str) {
        let known_bad = self
            .node()
            .and_then(|n| n.drops.as_ref())
            .is_some_and(|drops| !drops.iter().any(|d| d == square));
        if known_bad {
            debug!(square, "Drop outside allowed squares");
            self.revert();
            return;
        }
        self.send_play(format!("{}@{square}", role.to_ascii_uppercase()));
    }

    fn send_play(&self, uci: String) {
        let Some(node) = self.node() else {
            return;
        };
        let fen = node.fen.clone();
        let from = node.id;
        let rules = Arc::clone(&self.rules);
        let events = self.events_tx.clone();
        let variant = self.variant;
        tokio::spawn(async move {
            let result = rules.play(variant, &fen, &uci).await;
            let _ = events.send(Event::Moved { from, result });
        });
    }

    fn revert(&mut self) {
        let path = self.nav.path().clone();
        self.jump(&path);
    }

    // ---- structural edits ----

    /// Delete the variation whose first node `path` addresses. A cursor
    /// inside it moves to the node the variation branched from.
    pub fn delete_variation(&mut self, path: &Path) -> AnalysisResult<()> {
        let active = self.nav.tail_id();
        let inside = self.tree.path_contains(path, self.nav.path());
        let parent = self.tree.delete_variation_at(path)?;
        info!(%path, "Variation deleted");

        if inside {
            self.jump(&parent);
        } else {
            self.follow_node(active);
        }
        Ok(())
    }

    /// Promote the variation whose first node `path` addresses.
    pub fn promote_variation(&mut self, path: &Path) -> AnalysisResult<()> {
        let active = self.nav.tail_id();
        let inside = self.tree.path_contains(path, self.nav.path());
        self.tree.promote_variation_at(path)?;
        info!(%path, "Variation promoted");

        if inside {
            if let Some(renamed) = self.tree.path_of(active) {
                self.jump(&renamed);
            }
        } else {
            self.follow_node(active);
        }
        Ok(())
    }

    /// Re-derive the cursor path after an edit that kept its node. A renamed
    /// path restarts evaluation under the new name.
    fn follow_node(&mut self, id: NodeId) {
        let before = self.nav.path().clone();
        let path = self.tree.path_of(id).unwrap_or_else(Path::root);
        if let Err(e) = self.nav.set_path(&self.tree, &path) {
            warn!(error = %e, "Cursor repair failed");
        }
        if self.nav.path() != &before {
            debug!(from = %before, to = %self.nav.path(), "Cursor renamed");
            self.pool.stop();
            self.ceval_timer.schedule();
        }
        self.presenter.redraw();
    }

    // ---- event loop ----

    /// Wait for the next engine result, rules answer or timer and apply it.
    /// Cancel safe.
    pub async fn tick(&mut self) {
        let event = tokio::select! {
            Some(emit) = self.ceval_rx.recv() => Event::Ceval(emit),
            Some(event) = self.events_rx.recv() => event,
            _ = self.ceval_timer.fired() => Event::StartCeval,
            _ = self.situation_timer.fired() => Event::FetchSituation,
        };
        self.handle(event);
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Ceval(emit) => self.on_ceval(emit),
            Event::CevalReady => self.start_ceval(),
            Event::StartCeval => self.start_ceval(),
            Event::FetchSituation => self.fetch_situation(),
            Event::Moved { from, result } => self.on_moved(from, result),
            Event::Situation { node, fen, result } => self.on_situation(node, &fen, result),
            Event::BestSan { node, best, result } => self.on_best_san(node, best, result),
        }
    }

    fn on_ceval(&mut self, emit: EvalEmit) {
        if !self.pool.accept(&emit) || &emit.path != self.nav.path() {
            debug!(path = %emit.path, depth = emit.ceval.depth, "Stale evaluation dropped");
            return;
        }

        let incoming = emit.ceval;
        let mut lookup = None;
        let mut applied = false;
        let updated = self.tree.update_at_path(&emit.path, |node| {
            let previous_best = match node.ceval.as_mut() {
                Some(stored) if stored.depth >= incoming.depth => return,
                Some(stored) => {
                    let previous = stored.best.clone();
                    stored.merge(incoming);
                    previous
                }
                None => {
                    node.ceval = Some(incoming);
                    None
                }
            };
            applied = true;

            let Some(stored) = node.ceval.as_mut() else {
                return;
            };
            if stored.best == previous_best {
                return;
            }
            stored.best_san = None;
            if let Some(best) = stored.best.clone() {
                if best.contains('@') {
                    stored.best_san = Some(best);
                } else {
                    lookup = Some((node.fen.clone(), best));
                }
            }
        });
        if !updated || !applied {
            return;
        }

        if let Some((fen, best)) = lookup {
            let rules = Arc::clone(&self.rules);
            let events = self.events_tx.clone();
            let variant = self.variant;
            let node = self.nav.tail_id();
            tokio::spawn(async move {
                let result = rules.play(variant, &fen, &best).await;
                let _ = events.send(Event::BestSan { node, best, result });
            });
        }
        self.presenter.redraw();
    }

    fn on_best_san(&mut self, node: NodeId, best: String, result: RulesResult<SituationData>) {
        if node != self.nav.tail_id() {
            debug!(best, "Stale best move notation dropped");
            return;
        }
        let path = self.nav.path().clone();
        let san = match result {
            Ok(data) => data.san,
            Err(e) => {
                warn!(error = %e, best, "Best move notation failed");
                return;
            }
        };
        let updated = self.tree.update_at_path(&path, |target| {
            if let Some(ceval) = target.ceval.as_mut() {
                if ceval.best.as_deref() == Some(best.as_str()) {
                    ceval.best_san = san;
                }
            }
        });
        if updated {
            self.presenter.redraw();
        }
    }

    fn on_moved(&mut self, from: NodeId, result: RulesResult<SituationData>) {
        let Some(parent) = self.tree.path_of(from) else {
            debug!("Move origin deleted, answer dropped");
            return;
        };
        match result {
            Ok(situation) => match self.tree.add_node(situation, &parent) {
                Ok(path) => self.jump(&path),
                Err(e) => debug!(error = %e, "Move target vanished"),
            },
            Err(e @ (RulesError::IllegalMove(_) | RulesError::IllegalDrop(_))) => {
                warn!(error = %e, "Rejected by rules engine");
                self.revert();
            }
            Err(e) => warn!(error = %e, "Move request failed"),
        }
    }

    fn needs_situation(&self) -> bool {
        self.node().is_some_and(|n| n.dests.is_none())
    }

    fn fetch_situation(&self) {
        let Some(node) = self.node().filter(|n| n.dests.is_none()) else {
            return;
        };
        let fen = node.fen.clone();
        let node = node.id;
        let rules = Arc::clone(&self.rules);
        let events = self.events_tx.clone();
        let variant = self.variant;
        tokio::spawn(async move {
            let result = rules.situation(variant, &fen).await;
            let _ = events.send(Event::Situation { node, fen, result });
        });
    }

    fn on_situation(&mut self, node: NodeId, fen: &str, result: RulesResult<SituationData>) {
        let data = match result {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Situation request failed");
                return;
            }
        };
        let Some(path) = self.tree.path_of(node) else {
            debug!("Situation target deleted, answer dropped");
            return;
        };
        if !self.tree.node_at(&path).is_ok_and(|n| n.fen == fen) {
            debug!(%path, "Situation answer for another position dropped");
            return;
        }
        self.tree.fill_situation(&path, &data);
        if node == self.nav.tail_id() {
            self.presenter.redraw();
            if self.is_game_over() {
                self.pool.stop();
                self.ceval_timer.cancel();
            }
        }
    }
}
