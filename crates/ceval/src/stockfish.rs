//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::process::Stdio;

use game_tree::{ClientEval, PvData, Score};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::engine::{EngineLauncher, EvalEngine, SearchJob};
use crate::error::{CevalError, CevalResult};

/// Spawns Stockfish processes for the worker set.
#[derive(Debug, Clone)]
pub struct StockfishLauncher {
    pub path: String,
    pub hash_mb: u32,
}

impl EngineLauncher for StockfishLauncher {
    type Engine = StockfishEngine;

    async fn launch(&self) -> CevalResult<StockfishEngine> {
        StockfishEngine::new(&self.path, self.hash_mb).await
    }
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    multi_pv: u8,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str, hash_mb: u32) -> CevalResult<Self> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CevalError::EngineUnavailable(format!("Failed to spawn {path}: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| CevalError::EngineUnavailable("No stdin pipe".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| CevalError::EngineUnavailable("No stdout pipe".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            multi_pv: 1,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        // One thread per worker; the pool provides the parallelism
        engine.send("setoption name Threads value 1").await?;
        engine.send(&format!("setoption name Hash value {hash_mb}")).await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> CevalResult<()> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| CevalError::EngineUnavailable(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| CevalError::EngineUnavailable(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Next output line. Cancel safe, so it can sit in a `select!`.
    async fn read_line(&mut self) -> CevalResult<String> {
        match self.stdout.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(CevalError::EngineUnavailable("Stockfish closed its output".into())),
            Err(e) => Err(CevalError::EngineUnavailable(format!("Failed to read from Stockfish: {e}"))),
        }
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> CevalResult<()> {
        loop {
            let line = self.read_line().await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Wait for the `bestmove` that closes the current search
    async fn wait_for_bestmove(&mut self) -> CevalResult<()> {
        loop {
            let line = self.read_line().await?;
            if line.starts_with("bestmove") {
                return Ok(());
            }
        }
    }

    async fn abort_search(&mut self) -> CevalResult<()> {
        self.send("stop").await?;
        self.wait_for_bestmove().await
    }
}

impl EvalEngine for StockfishEngine {
    async fn search(
        &mut self,
        job: &SearchJob,
        out: &mpsc::Sender<ClientEval>,
        cancel: &mut oneshot::Receiver<()>,
    ) -> CevalResult<()> {
        if job.multi_pv != self.multi_pv {
            self.send(&format!("setoption name MultiPV value {}", job.multi_pv))
                .await?;
            self.multi_pv = job.multi_pv;
        }
        self.send("isready").await?;
        self.wait_for("readyok").await?;
        self.send(&position_command(job)).await?;
        self.send(&format!("go depth {}", job.max_depth)).await?;

        let white_pov = job.white_to_move();
        let mut collector = DepthCollector::new(job.multi_pv.max(1));

        loop {
            tokio::select! {
                biased;
                _ = &mut *cancel => {
                    return self.abort_search().await;
                }
                line = self.read_line() => {
                    let line = line?;
                    if line.starts_with("bestmove") {
                        return Ok(());
                    }
                    let Some(info) = parse_info(&line) else {
                        continue;
                    };
                    if info.depth < job.min_depth {
                        continue;
                    }
                    if let Some(eval) = collector.push(info, job, white_pov) {
                        if out.send(eval).await.is_err() {
                            // Receiver gone: nobody wants this search any more
                            return self.abort_search().await;
                        }
                    }
                }
            }
        }
    }

    /// Send quit command and wait for process to exit
    async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

fn position_command(job: &SearchJob) -> String {
    if job.moves.is_empty() {
        format!("position fen {}", job.initial_fen)
    } else {
        format!("position fen {} moves {}", job.initial_fen, job.moves.join(" "))
    }
}

/// Parsed `info ... pv ...` line
#[derive(Debug, Clone, PartialEq)]
struct InfoLine {
    depth: u8,
    multipv: u8,
    nodes: u64,
    nps: u64,
    time: u64,
    /// Side-to-move point of view, as UCI reports it
    score: Option<Score>,
    pv: Vec<String>,
}

/// Parse an info line carrying a principal variation. Bound scores
/// (lowerbound/upperbound) are skipped, they are not final for the depth.
fn parse_info(line: &str) -> Option<InfoLine> {
    if !line.starts_with("info") || !line.contains(" pv ") {
        return None;
    }
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut info = InfoLine {
        depth: 0,
        multipv: 1,
        nodes: 0,
        nps: 0,
        time: 0,
        score: None,
        pv: Vec::new(),
    };
    let mut has_depth = false;

    let mut i = 1;
    while i < parts.len() {
        let value = parts.get(i + 1).copied().unwrap_or("");
        match parts[i] {
            "depth" => {
                info.depth = value.parse().ok()?;
                has_depth = true;
                i += 2;
            }
            "multipv" => {
                info.multipv = value.parse().ok()?;
                i += 2;
            }
            "nodes" => {
                info.nodes = value.parse().ok()?;
                i += 2;
            }
            "nps" => {
                info.nps = value.parse().ok()?;
                i += 2;
            }
            "time" => {
                info.time = value.parse().ok()?;
                i += 2;
            }
            "score" => {
                let amount: i32 = parts.get(i + 2)?.parse().ok()?;
                info.score = match value {
                    "cp" => Some(Score::Cp(amount)),
                    "mate" => Some(Score::Mate(amount)),
                    _ => None,
                };
                i += 3;
            }
            "lowerbound" | "upperbound" => return None,
            "pv" => {
                info.pv = parts[i + 1..].iter().map(|m| m.to_string()).collect();
                break;
            }
            _ => i += 1,
        }
    }

    if has_depth && !info.pv.is_empty() {
        Some(info)
    } else {
        None
    }
}

fn white_pov(score: Score, white_to_move: bool) -> Score {
    if white_to_move {
        return score;
    }
    match score {
        Score::Cp(cp) => Score::Cp(-cp),
        Score::Mate(mate) => Score::Mate(-mate),
    }
}

/// Gathers the multi-PV lines of one depth and yields a record once the last
/// line of that depth has arrived.
struct DepthCollector {
    depth: u8,
    lines: Vec<Option<InfoLine>>,
}

impl DepthCollector {
    fn new(multi_pv: u8) -> Self {
        Self {
            depth: 0,
            lines: vec![None; multi_pv as usize],
        }
    }

    fn push(&mut self, info: InfoLine, job: &SearchJob, white_to_move: bool) -> Option<ClientEval> {
        if info.depth != self.depth {
            self.depth = info.depth;
            self.lines.iter_mut().for_each(|l| *l = None);
        }
        let idx = (info.multipv.max(1) - 1) as usize;
        if idx >= self.lines.len() {
            return None;
        }
        let is_last = idx == self.lines.len() - 1;
        self.lines[idx] = Some(info);
        if !is_last || self.lines.iter().any(|l| l.is_none()) {
            return None;
        }

        let lines: Vec<&InfoLine> = self.lines.iter().flatten().collect();
        let first = lines.first()?;
        let last = lines.last()?;
        let pvs = lines
            .iter()
            .map(|l| PvData {
                moves: l.pv.clone(),
                score: l.score.map(|s| white_pov(s, white_to_move)),
            })
            .collect();

        Some(ClientEval {
            fen: job.fen.clone(),
            depth: self.depth,
            max_depth: job.max_depth,
            knps: (last.nps / 1000) as u32,
            nodes: last.nodes,
            millis: last.time,
            pvs,
            score: first.score.map(|s| white_pov(s, white_to_move)),
            best: first.pv.first().cloned(),
            best_san: None,
            cloud: None,
            retried: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(multi_pv: u8, moves: &[&str]) -> SearchJob {
        SearchJob {
            initial_fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".into(),
            moves: moves.iter().map(|m| m.to_string()).collect(),
            fen: "after".into(),
            min_depth: 8,
            max_depth: 18,
            multi_pv,
        }
    }

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 nps 500000 time 200 pv e2e4";
        let info = parse_info(line).unwrap();
        assert_eq!(info.depth, 20);
        assert_eq!(info.score, Some(Score::Cp(35)));
        assert_eq!(info.nodes, 100_000);
        assert_eq!(info.nps, 500_000);
        assert_eq!(info.time, 200);
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate 3 nodes 100000 pv e2e4";
        assert_eq!(parse_info(line).unwrap().score, Some(Score::Mate(3)));
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 pv e2e4 e7e5 g1f3";
        assert_eq!(parse_info(line).unwrap().pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_skips_bounds_and_non_pv_lines() {
        assert!(parse_info("info depth 12 score cp 20 lowerbound nodes 10 pv e2e4").is_none());
        assert!(parse_info("info depth 12 currmove e2e4 currmovenumber 1").is_none());
        assert!(parse_info("bestmove e2e4 ponder e7e5").is_none());
    }

    #[test]
    fn test_position_command() {
        let j = job(1, &[]);
        assert_eq!(position_command(&j), format!("position fen {}", j.initial_fen));
        let j = job(1, &["e2e4", "e7e5"]);
        assert!(position_command(&j).ends_with(" moves e2e4 e7e5"));
    }

    #[test]
    fn test_collector_normalizes_to_white() {
        let j = job(1, &["e2e4"]);
        let mut collector = DepthCollector::new(1);
        let info = parse_info("info depth 10 score cp 30 nodes 5000 nps 250000 time 20 pv e7e5 g1f3").unwrap();
        let eval = collector.push(info, &j, j.white_to_move()).unwrap();
        assert_eq!(eval.score, Some(Score::Cp(-30)));
        assert_eq!(eval.best.as_deref(), Some("e7e5"));
        assert_eq!(eval.knps, 250);
        assert_eq!(eval.fen, "after");
        assert_eq!(eval.max_depth, 18);
    }

    #[test]
    fn test_collector_waits_for_all_lines() {
        let j = job(2, &[]);
        let mut collector = DepthCollector::new(2);
        let first = parse_info("info depth 9 multipv 1 score cp 30 nodes 10 pv e2e4").unwrap();
        let second = parse_info("info depth 9 multipv 2 score cp 20 nodes 12 pv d2d4").unwrap();
        assert!(collector.push(first, &j, true).is_none());
        let eval = collector.push(second, &j, true).unwrap();
        assert_eq!(eval.pvs.len(), 2);
        assert_eq!(eval.nodes, 12);
        assert_eq!(eval.best.as_deref(), Some("e2e4"));

        // A new depth starts from scratch
        let lone = parse_info("info depth 10 multipv 2 score cp 20 nodes 20 pv d2d4").unwrap();
        assert!(collector.push(lone, &j, true).is_none());
    }
}
