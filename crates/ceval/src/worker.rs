//! Background worker: owns one engine and runs searches handed to it.

use std::sync::Arc;

use game_tree::ClientEval;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::{EngineLauncher, EvalEngine, SearchJob};

pub(crate) struct Job {
    pub search: SearchJob,
    pub out: mpsc::Sender<ClientEval>,
    /// Fires or closes when the request is abandoned.
    pub cancel: oneshot::Receiver<()>,
}

pub(crate) enum Command {
    Search(Job),
    Quit,
}

/// Worker loop. An engine that fails mid-search is dropped and relaunched
/// when the next job arrives; a failed relaunch skips the job.
pub(crate) async fn run_worker<L: EngineLauncher>(
    id: usize,
    launcher: Arc<L>,
    mut engine: Option<L::Engine>,
    mut commands: mpsc::Receiver<Command>,
) {
    while let Some(command) = commands.recv().await {
        let mut job = match command {
            Command::Search(job) => job,
            Command::Quit => break,
        };

        match job.cancel.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => {
                debug!(worker = id, "Skipping cancelled job");
                continue;
            }
        }

        if engine.is_none() {
            match launcher.launch().await {
                Ok(fresh) => {
                    info!(worker = id, "Engine relaunched");
                    engine = Some(fresh);
                }
                Err(e) => {
                    warn!(worker = id, error = %e, "Engine relaunch failed");
                    continue;
                }
            }
        }

        let Some(running) = engine.as_mut() else {
            continue;
        };
        if let Err(e) = running.search(&job.search, &job.out, &mut job.cancel).await {
            warn!(worker = id, error = %e, "Search failed, dropping engine");
            engine = None;
        }
    }

    if let Some(mut engine) = engine {
        engine.quit().await;
    }
    debug!(worker = id, "Worker stopped");
}
