//! Fixed worker set serving one logical evaluation request at a time.
//!
//! Every request gets a fresh id. Results travel worker -> relay -> sink, and
//! the relay forwards only while its id is still the current one. `stop`
//! clears the current id, closes the worker's cancel channel and aborts the
//! relay, so nothing from a cancelled request reaches the sink afterwards.
//! Records already buffered in the sink are caught by [`EvalPool::accept`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use game_tree::{ClientEval, Node, Path, Ply};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::castle::normalize_castle;
use crate::engine::{EngineLauncher, SearchJob};
use crate::error::{CevalError, CevalResult};
use crate::worker::{run_worker, Command, Job};

pub type RequestId = u64;

const NO_REQUEST: RequestId = 0;
const JOB_QUEUE: usize = 4;
const RESULT_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub min_depth: u8,
    pub max_depth: u8,
    pub workers: usize,
    pub multi_pv: u8,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_depth: 8,
            max_depth: 18,
            workers: 3,
            multi_pv: 1,
        }
    }
}

/// A move as stored in the tree: coordinate notation plus its SAN, which
/// tells castling apart from an ordinary king move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub uci: String,
    pub san: Option<String>,
}

/// What to evaluate, and the path tag results are delivered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Work {
    pub initial_fen: String,
    pub moves: Vec<PlayedMove>,
    pub fen: String,
    pub path: Path,
    pub ply: Ply,
    /// Depth already stored on the target node.
    pub current_depth: Option<u8>,
}

impl Work {
    /// Build from a root-to-target node list. `None` for an empty list or a
    /// non-root node without a move.
    pub fn from_nodes(nodes: &[&Node], path: Path) -> Option<Self> {
        let (root, rest) = nodes.split_first()?;
        let target = nodes.last()?;
        let moves = rest
            .iter()
            .map(|n| {
                n.uci.clone().map(|uci| PlayedMove {
                    uci,
                    san: n.san.clone(),
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            initial_fen: root.fen.clone(),
            moves,
            fen: target.fen.clone(),
            path,
            ply: target.ply,
            current_depth: target.ceval.as_ref().map(|c| c.depth),
        })
    }
}

/// One incremental result, tagged with the request it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalEmit {
    pub request: RequestId,
    pub path: Path,
    pub ply: Ply,
    pub ceval: ClientEval,
}

struct WorkerHandle {
    commands: mpsc::Sender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct ActiveRequest {
    id: RequestId,
    // Dropping it closes the worker's cancel channel.
    _cancel: oneshot::Sender<()>,
    relay: JoinHandle<()>,
}

pub struct EvalPool<L: EngineLauncher> {
    config: PoolConfig,
    launcher: Arc<L>,
    workers: OnceCell<Vec<WorkerHandle>>,
    active: Mutex<Option<ActiveRequest>>,
    current: Arc<AtomicU64>,
    next_request: AtomicU64,
    cursor: AtomicUsize,
    allowed: bool,
    enabled: AtomicBool,
}

impl<L: EngineLauncher> EvalPool<L> {
    /// `enabled` is the persisted preference; it only takes effect when
    /// analysis is `allowed` for this session.
    pub fn new(config: PoolConfig, launcher: L, allowed: bool, enabled: bool) -> Self {
        Self {
            config,
            launcher: Arc::new(launcher),
            workers: OnceCell::new(),
            active: Mutex::new(None),
            current: Arc::new(AtomicU64::new(NO_REQUEST)),
            next_request: AtomicU64::new(NO_REQUEST),
            cursor: AtomicUsize::new(0),
            allowed,
            enabled: AtomicBool::new(allowed && enabled),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Launch the worker set. Concurrent and repeated calls share a single
    /// initialisation. Fails only when no engine at all could be started, in
    /// which case a later call tries again.
    pub async fn init(&self) -> CevalResult<()> {
        self.workers
            .get_or_try_init(|| self.spawn_workers())
            .await
            .map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.workers.initialized()
    }

    async fn spawn_workers(&self) -> CevalResult<Vec<WorkerHandle>> {
        let count = self.config.workers.max(1);
        let mut engines = Vec::with_capacity(count);
        for i in 0..count {
            match self.launcher.launch().await {
                Ok(engine) => {
                    info!(worker = i, "Engine ready");
                    engines.push(Some(engine));
                }
                Err(e) => {
                    warn!(worker = i, error = %e, "Engine failed to start");
                    engines.push(None);
                }
            }
        }
        if engines.iter().all(Option::is_none) {
            return Err(CevalError::EngineUnavailable(
                "no engine could be started".into(),
            ));
        }

        let handles = engines
            .into_iter()
            .enumerate()
            .map(|(i, engine)| {
                let (tx, rx) = mpsc::channel(JOB_QUEUE);
                let task = tokio::spawn(run_worker(i, Arc::clone(&self.launcher), engine, rx));
                WorkerHandle {
                    commands: tx,
                    task: Mutex::new(Some(task)),
                }
            })
            .collect::<Vec<_>>();
        info!(workers = handles.len(), "Evaluation pool initialised");
        Ok(handles)
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the enabled flag, stopping any running request first. Returns the
    /// new state; a pool that is not allowed stays off.
    pub fn toggle(&self) -> bool {
        if !self.allowed {
            return false;
        }
        self.stop();
        let now = !self.enabled();
        self.enabled.store(now, Ordering::SeqCst);
        now
    }

    /// Start evaluating `work`, replacing any running request. No-op (returns
    /// `None`) when disabled, when the target is already searched to
    /// `max_depth`, or when no worker is available.
    pub fn start(&self, work: Work, sink: mpsc::Sender<EvalEmit>) -> Option<RequestId> {
        if !self.enabled() {
            return None;
        }
        if work.current_depth.is_some_and(|d| d >= self.config.max_depth) {
            debug!(path = %work.path, "Already at max depth");
            return None;
        }
        self.stop();

        let Some(workers) = self.workers.get() else {
            debug!("Pool not initialised");
            return None;
        };

        let id = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        let search = SearchJob {
            initial_fen: work.initial_fen,
            moves: work
                .moves
                .iter()
                .map(|m| normalize_castle(&m.uci, m.san.as_deref()).to_string())
                .collect(),
            fen: work.fen,
            min_depth: self.config.min_depth,
            max_depth: self.config.max_depth,
            multi_pv: self.config.multi_pv,
        };
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (out_tx, out_rx) = mpsc::channel(RESULT_BUFFER);

        let mut job = Job {
            search,
            out: out_tx,
            cancel: cancel_rx,
        };
        let first = self.cursor.fetch_add(1, Ordering::SeqCst);
        let mut dispatched = None;
        for offset in 0..workers.len() {
            let idx = (first + offset) % workers.len();
            match workers[idx].commands.try_send(Command::Search(job)) {
                Ok(()) => {
                    dispatched = Some(idx);
                    break;
                }
                Err(TrySendError::Full(Command::Search(back)))
                | Err(TrySendError::Closed(Command::Search(back))) => job = back,
                Err(_) => return None,
            }
        }
        let Some(worker) = dispatched else {
            warn!("No worker accepted the request");
            return None;
        };

        self.current.store(id, Ordering::SeqCst);
        let relay = tokio::spawn(relay(
            id,
            work.path.clone(),
            work.ply,
            out_rx,
            Arc::clone(&self.current),
            sink,
        ));
        debug!(request = id, worker, path = %work.path, "Evaluation started");

        *self.lock_active() = Some(ActiveRequest {
            id,
            _cancel: cancel_tx,
            relay,
        });
        Some(id)
    }

    /// Cancel the running request, if any.
    pub fn stop(&self) {
        self.current.store(NO_REQUEST, Ordering::SeqCst);
        if let Some(active) = self.lock_active().take() {
            active.relay.abort();
            debug!(request = active.id, "Evaluation stopped");
        }
    }

    /// True when `emit` belongs to the running request of an enabled pool.
    pub fn accept(&self, emit: &EvalEmit) -> bool {
        self.enabled()
            && emit.request != NO_REQUEST
            && emit.request == self.current.load(Ordering::SeqCst)
    }

    pub fn current_request(&self) -> Option<RequestId> {
        match self.current.load(Ordering::SeqCst) {
            NO_REQUEST => None,
            id => Some(id),
        }
    }

    /// Stop the running request and quit every engine.
    pub async fn shutdown(&self) {
        self.stop();
        let Some(workers) = self.workers.get() else {
            return;
        };
        for worker in workers {
            let _ = worker.commands.send(Command::Quit).await;
        }
        for worker in workers {
            let task = worker
                .task
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let Some(task) = task {
                let _ = task.await;
            }
        }
        info!("Evaluation pool shut down");
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRequest>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<L: EngineLauncher> Drop for EvalPool<L> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn relay(
    id: RequestId,
    path: Path,
    ply: Ply,
    mut results: mpsc::Receiver<ClientEval>,
    current: Arc<AtomicU64>,
    sink: mpsc::Sender<EvalEmit>,
) {
    while let Some(ceval) = results.recv().await {
        if current.load(Ordering::SeqCst) != id {
            break;
        }
        let emit = EvalEmit {
            request: id,
            path: path.clone(),
            ply,
            ceval,
        };
        if sink.send(emit).await.is_err() {
            break;
        }
    }
}
