//! Seams between the pool and a concrete evaluation engine.

use std::future::Future;

use game_tree::ClientEval;
use tokio::sync::{mpsc, oneshot};

use crate::error::CevalResult;

/// One search as handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchJob {
    pub initial_fen: String,
    /// Coordinate notation, castling already normalised.
    pub moves: Vec<String>,
    /// FEN of the searched position, copied into every record.
    pub fen: String,
    pub min_depth: u8,
    pub max_depth: u8,
    pub multi_pv: u8,
}

impl SearchJob {
    /// Side to move in the searched position, read from the FEN and the
    /// number of moves played on top of it.
    pub fn white_to_move(&self) -> bool {
        let white_at_start = self.initial_fen.split_whitespace().nth(1) != Some("b");
        white_at_start == (self.moves.len() % 2 == 0)
    }
}

/// A running engine instance owned by one worker.
pub trait EvalEngine: Send + 'static {
    /// Search until `job.max_depth` or until `cancel` fires or closes, sending
    /// one record per completed depth ≥ `job.min_depth` to `out`. An error
    /// means the engine is no longer usable.
    fn search(
        &mut self,
        job: &SearchJob,
        out: &mpsc::Sender<ClientEval>,
        cancel: &mut oneshot::Receiver<()>,
    ) -> impl Future<Output = CevalResult<()>> + Send;

    fn quit(&mut self) -> impl Future<Output = ()> + Send;
}

/// Starts engines for the worker set, at init and on lazy relaunch.
pub trait EngineLauncher: Send + Sync + 'static {
    type Engine: EvalEngine;

    fn launch(&self) -> impl Future<Output = CevalResult<Self::Engine>> + Send;
}
