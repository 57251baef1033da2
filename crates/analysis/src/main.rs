//! Analysis board driver
//!
//! Reads JSON commands from stdin, one per line, and writes a snapshot of the
//! current node to stdout after every redraw. Logs go to stderr.
//!
//! Usage: `analysis-board [session.json]`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use analysis::{AnalysisConfig, AnalysisCoordinator, Presenter, SessionData, ShakmatyRules};
use ceval::StockfishLauncher;
use game_tree::{ClientEval, Path, Ply, TreePart};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

type Board = AnalysisCoordinator<ShakmatyRules, StockfishLauncher, DirtyFlag>;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Command {
    Next,
    Prev,
    First,
    Last,
    Fastforward,
    StopFastforward,
    Rewind,
    StopRewind,
    Jump { path: String },
    JumpToMain { ply: Ply },
    Move {
        orig: String,
        dest: String,
        #[serde(default)]
        promotion: Option<char>,
    },
    Drop { role: char, square: String },
    Promote { path: String },
    Delete { path: String },
    ToggleCeval,
    Quit,
}

/// Redraws only mark the board dirty; the main loop prints once per turn.
#[derive(Clone, Default)]
struct DirtyFlag(Arc<AtomicBool>);

impl Presenter for DirtyFlag {
    fn redraw(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    path: String,
    ply: Ply,
    fen: &'a str,
    san: Option<&'a str>,
    check: bool,
    game_over: bool,
    on_mainline: bool,
    replaying: bool,
    ceval_enabled: bool,
    ceval: Option<&'a ClientEval>,
    continuations: Vec<Continuation<'a>>,
}

#[derive(Serialize)]
struct Continuation<'a> {
    path: String,
    san: Option<&'a str>,
}

fn snapshot(board: &Board) -> Option<String> {
    let node = board.node()?;
    let continuations = node
        .children()
        .iter()
        .map(|child| Continuation {
            path: board
                .tree()
                .path_of(child.id)
                .map(|p| p.to_string())
                .unwrap_or_default(),
            san: child.san.as_deref(),
        })
        .collect();
    let snap = Snapshot {
        path: board.path().to_string(),
        ply: node.ply,
        fen: &node.fen,
        san: node.san.as_deref(),
        check: node.check,
        game_over: node.is_game_over(),
        on_mainline: board.navigator().on_mainline(),
        replaying: board.replaying(),
        ceval_enabled: board.ceval_enabled(),
        ceval: node.ceval.as_ref(),
        continuations,
    };
    serde_json::to_string(&snap).ok()
}

async fn load_session() -> anyhow::Result<SessionData> {
    match std::env::args().nth(1) {
        Some(file) => {
            let raw = tokio::fs::read_to_string(&file).await?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(SessionData {
            variant: "standard".to_string(),
            tree_parts: vec![TreePart {
                ply: 0,
                fen: STARTING_FEN.to_string(),
                ..Default::default()
            }],
            started_at_turn: 0,
            initial_ply: None,
            live: false,
        }),
    }
}

/// Apply one command. Returns false on `quit`.
async fn apply(board: &mut Board, command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Next => {
            board.next();
        }
        Command::Prev => {
            board.prev();
        }
        Command::First => board.first(),
        Command::Last => board.last(),
        Command::Fastforward => {
            board.fastforward();
        }
        Command::StopFastforward => board.stop_fastforward(),
        Command::Rewind => {
            board.rewind();
        }
        Command::StopRewind => board.stop_rewind(),
        Command::Jump { path } => board.jump(&path.parse::<Path>()?),
        Command::JumpToMain { ply } => board.jump_to_main(ply),
        Command::Move {
            orig,
            dest,
            promotion,
        } => board.user_move(&orig, &dest, promotion),
        Command::Drop { role, square } => board.user_drop(role, &square),
        Command::Promote { path } => board.promote_variation(&path.parse::<Path>()?)?,
        Command::Delete { path } => board.delete_variation(&path.parse::<Path>()?)?,
        Command::ToggleCeval => board.toggle_ceval().await,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let config = AnalysisConfig::from_env()?;
    info!(
        stockfish_path = %config.stockfish_path,
        workers = config.pool.workers,
        max_depth = config.pool.max_depth,
        "Analysis config loaded"
    );

    let launcher = StockfishLauncher {
        path: config.stockfish_path.clone(),
        hash_mb: config.hash_mb,
    };
    let dirty = DirtyFlag::default();
    let session = load_session().await?;
    let mut board = Board::new(session, &config, ShakmatyRules, launcher, dirty.clone()).await?;
    board.init_ceval();
    if let Some(line) = snapshot(&board) {
        println!("{line}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            line = lines.next_line() => Some(line),
            _ = board.tick() => None,
        };

        if let Some(line) = input {
            let Some(line) = line? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(command) => match apply(&mut board, command).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => warn!(error = %e, "Command failed"),
                },
                Err(e) => warn!(error = %e, line = %line, "Unreadable command"),
            }
        }

        if dirty.0.swap(false, Ordering::SeqCst) {
            if let Some(line) = snapshot(&board) {
                println!("{line}");
            }
        }
    }

    board.shutdown().await;
    info!("Analysis board closed");
    Ok(())
}
