#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis::{
    AnalysisConfig, AnalysisCoordinator, Presenter, RulesEngine, RulesResult, SessionData,
    ShakmatyRules, Variant,
};
use ceval::{CevalError, CevalResult, EngineLauncher, EvalEngine, SearchJob};
use game_tree::{ClientEval, PvData, Score, SituationData, TreePart};
use tokio::sync::{mpsc, oneshot};

pub const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub type Board = AnalysisCoordinator<ShakmatyRules, ScriptedLauncher, CountingPresenter>;

pub type SlowBoard = AnalysisCoordinator<SlowRules, ScriptedLauncher, CountingPresenter>;

/// Flat history for `moves` played from the starting position, with real
/// positions, notation and destinations.
pub fn parts(moves: &[&str]) -> Vec<TreePart> {
    let rules = ShakmatyRules;
    let root = rules.situation_sync(Variant::Standard, START).unwrap();
    let mut parts = vec![TreePart {
        ply: 0,
        fen: root.fen,
        dests: root.dests,
        ..Default::default()
    }];
    for uci in moves {
        let prev = parts.last().unwrap().fen.clone();
        let data = rules.play_sync(Variant::Standard, &prev, uci).unwrap();
        parts.push(TreePart {
            ply: parts.len() as u32,
            uci: data.uci,
            san: data.san,
            fen: data.fen,
            dests: data.dests,
            check: data.check,
            end: data.end,
            ..Default::default()
        });
    }
    parts
}

pub fn session(parts: Vec<TreePart>) -> SessionData {
    SessionData {
        variant: "standard".to_string(),
        tree_parts: parts,
        started_at_turn: 0,
        initial_ply: None,
        live: false,
    }
}

/// Default config with a settings file private to the calling test.
pub fn config(name: &str) -> AnalysisConfig {
    let settings_path = temp_settings(name);
    let _ = std::fs::remove_file(&settings_path);
    AnalysisConfig {
        settings_path,
        ..AnalysisConfig::default()
    }
}

pub fn temp_settings(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("analysis-board-{}-{name}.json", std::process::id()))
}

pub async fn board(parts: Vec<TreePart>, launcher: ScriptedLauncher, name: &str) -> Board {
    Board::new(session(parts), &config(name), ShakmatyRules, launcher, CountingPresenter::default())
        .await
        .unwrap()
}

pub async fn slow_board(
    parts: Vec<TreePart>,
    rules: SlowRules,
    launcher: ScriptedLauncher,
    name: &str,
) -> SlowBoard {
    SlowBoard::new(session(parts), &config(name), rules, launcher, CountingPresenter::default())
        .await
        .unwrap()
}

/// Process events until nothing happens for `quiet`.
pub async fn settle<R: RulesEngine>(
    board: &mut AnalysisCoordinator<R, ScriptedLauncher, CountingPresenter>,
    quiet: Duration,
) {
    while tokio::time::timeout(quiet, board.tick()).await.is_ok() {}
}

/// Real rules answered after `delay`, optionally without destinations so
/// the coordinator has to fetch them separately.
#[derive(Clone)]
pub struct SlowRules {
    pub delay: Duration,
    pub strip_dests: bool,
}

impl SlowRules {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            strip_dests: false,
        }
    }

    pub fn without_dests(mut self) -> Self {
        self.strip_dests = true;
        self
    }
}

impl RulesEngine for SlowRules {
    async fn play(&self, variant: Variant, fen: &str, uci: &str) -> RulesResult<SituationData> {
        tokio::time::sleep(self.delay).await;
        let mut data = ShakmatyRules.play_sync(variant, fen, uci)?;
        if self.strip_dests {
            data.dests = None;
        }
        Ok(data)
    }

    async fn situation(&self, variant: Variant, fen: &str) -> RulesResult<SituationData> {
        tokio::time::sleep(self.delay).await;
        ShakmatyRules.situation_sync(variant, fen)
    }
}

/// Fixed sequence of (depth, best move) records, one every `step`.
#[derive(Clone)]
pub struct ScriptedLauncher {
    pub script: Arc<Vec<(u8, &'static str)>>,
    pub step: Duration,
    pub launches: Arc<AtomicUsize>,
    /// Launches still to fail before engines start coming up.
    pub failures: Arc<AtomicUsize>,
    pub jobs: Arc<Mutex<Vec<SearchJob>>>,
}

impl ScriptedLauncher {
    pub fn new(script: Vec<(u8, &'static str)>, step: Duration) -> Self {
        Self {
            script: Arc::new(script),
            step,
            launches: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
            jobs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(self, launches: usize) -> Self {
        self.failures.store(launches, Ordering::SeqCst);
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<SearchJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl EngineLauncher for ScriptedLauncher {
    type Engine = ScriptedEngine;

    async fn launch(&self) -> CevalResult<ScriptedEngine> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CevalError::EngineUnavailable("scripted launch failure".into()));
        }
        Ok(ScriptedEngine {
            script: Arc::clone(&self.script),
            step: self.step,
            jobs: Arc::clone(&self.jobs),
        })
    }
}

pub struct ScriptedEngine {
    script: Arc<Vec<(u8, &'static str)>>,
    step: Duration,
    jobs: Arc<Mutex<Vec<SearchJob>>>,
}

impl EvalEngine for ScriptedEngine {
    async fn search(
        &mut self,
        job: &SearchJob,
        out: &mpsc::Sender<ClientEval>,
        cancel: &mut oneshot::Receiver<()>,
    ) -> CevalResult<()> {
        self.jobs.lock().unwrap().push(job.clone());
        for &(depth, best) in self.script.iter() {
            tokio::select! {
                _ = &mut *cancel => return Ok(()),
                _ = tokio::time::sleep(self.step) => {}
            }
            let score = Some(Score::Cp(depth as i32));
            let ceval = ClientEval {
                fen: job.fen.clone(),
                depth,
                max_depth: job.max_depth,
                knps: 500,
                nodes: depth as u64 * 10_000,
                millis: depth as u64 * 20,
                pvs: vec![PvData {
                    moves: vec![best.to_string()],
                    score,
                }],
                score,
                best: Some(best.to_string()),
                best_san: None,
                cloud: None,
                retried: None,
            };
            if out.send(ceval).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn quit(&mut self) {}
}

#[derive(Clone, Default)]
pub struct CountingPresenter(pub Arc<AtomicUsize>);

impl CountingPresenter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Presenter for CountingPresenter {
    fn redraw(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
