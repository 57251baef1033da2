//! Evaluation records attached to tree nodes

use serde::{Deserialize, Serialize};

/// Engine score, always from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    /// Centipawns
    Cp(i32),
    /// Mate in N moves (positive = White mates)
    Mate(i32),
}

/// One ranked line of a multi-PV search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvData {
    pub moves: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
}

/// Incremental evaluation produced by the local engine pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEval {
    pub fen: String,
    pub depth: u8,
    pub max_depth: u8,
    pub knps: u32,
    pub nodes: u64,
    pub millis: u64,
    pub pvs: Vec<PvData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    /// Best move in coordinate notation (head of the first PV)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<String>,
    /// Algebraic form of `best`, resolved through the rules engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_san: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retried: Option<bool>,
}

impl ClientEval {
    /// Shallow combine: fields present in `newer` overwrite, absent optional
    /// fields keep their current value. Depth checks are the caller's job.
    pub fn merge(&mut self, newer: ClientEval) {
        self.fen = newer.fen;
        self.depth = newer.depth;
        self.max_depth = newer.max_depth;
        self.knps = newer.knps;
        self.nodes = newer.nodes;
        self.millis = newer.millis;
        self.pvs = newer.pvs;
        if newer.score.is_some() {
            self.score = newer.score;
        }
        if newer.best.is_some() {
            self.best = newer.best;
        }
        if newer.best_san.is_some() {
            self.best_san = newer.best_san;
        }
        if newer.cloud.is_some() {
            self.cloud = newer.cloud;
        }
        if newer.retried.is_some() {
            self.retried = newer.retried;
        }
    }
}

/// Evaluation stored by the game server. Attached once, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cp: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mate: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(depth: u8, score: Option<Score>, best: Option<&str>) -> ClientEval {
        ClientEval {
            fen: "8/8/8/8/8/8/8/8 w - - 0 1".into(),
            depth,
            max_depth: 18,
            knps: 100,
            nodes: 1000 * depth as u64,
            millis: 10 * depth as u64,
            pvs: vec![],
            score,
            best: best.map(String::from),
            best_san: None,
            cloud: None,
            retried: None,
        }
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut stored = eval(10, Some(Score::Cp(35)), Some("e2e4"));
        stored.best_san = Some("e4".into());
        stored.cloud = Some(true);

        stored.merge(eval(12, None, None));

        assert_eq!(stored.depth, 12);
        assert_eq!(stored.nodes, 12_000);
        assert_eq!(stored.score, Some(Score::Cp(35)));
        assert_eq!(stored.best.as_deref(), Some("e2e4"));
        assert_eq!(stored.best_san.as_deref(), Some("e4"));
        assert_eq!(stored.cloud, Some(true));
    }

    #[test]
    fn test_merge_overwrites_present_fields() {
        let mut stored = eval(10, Some(Score::Cp(35)), Some("e2e4"));
        stored.merge(eval(14, Some(Score::Mate(3)), Some("d1h5")));
        assert_eq!(stored.score, Some(Score::Mate(3)));
        assert_eq!(stored.best.as_deref(), Some("d1h5"));
    }

    #[test]
    fn test_score_serde_shape() {
        assert_eq!(serde_json::to_string(&Score::Cp(-40)).unwrap(), r#"{"cp":-40}"#);
        assert_eq!(serde_json::to_string(&Score::Mate(2)).unwrap(), r#"{"mate":2}"#);
    }
}
