//! Structural paths into the move tree.
//!
//! A path is a list of steps. Each step says "continue along the current line
//! until this ply"; a step carrying a variation index takes that child instead
//! of the mainline continuation when arriving at the ply. Entering a variation
//! therefore produces a step pair `(p, Some(v)), (p, None)`, and the trailing
//! step is what gets advanced when stepping forward inside the variation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Half-move number, counted from the start of the game.
pub type Ply = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub ply: Ply,
    /// Child index to take at `ply`; `None` follows the mainline (child 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<usize>,
}

impl PathStep {
    pub fn main(ply: Ply) -> Self {
        Self {
            ply,
            variation: None,
        }
    }

    pub fn variation(ply: Ply, variation: usize) -> Self {
        Self {
            ply,
            variation: Some(variation),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathStep>);

impl Path {
    /// The empty path, addressing the tree root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path to the mainline node at `ply`.
    pub fn mainline(ply: Ply) -> Self {
        Self(vec![PathStep::main(ply)])
    }

    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PathStep> {
        self.0.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut PathStep> {
        self.0.last_mut()
    }

    pub fn push(&mut self, step: PathStep) {
        self.0.push(step);
    }

    pub fn pop(&mut self) -> Option<PathStep> {
        self.0.pop()
    }

    /// True when no step leaves the mainline.
    pub fn is_mainline(&self) -> bool {
        self.0.iter().all(|s| s.variation.is_none())
    }

    /// Index of the last step that enters a variation.
    pub fn last_variation_step(&self) -> Option<usize> {
        self.0.iter().rposition(|s| s.variation.is_some())
    }

    /// The steps up to and including `index`, as a new path.
    pub fn prefix(&self, index: usize) -> Path {
        Path(self.0.iter().take(index + 1).copied().collect())
    }
}

/// Compact text form: steps separated by `/`, each `ply` or `ply:variation`.
/// The root path is the empty string.
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match step.variation {
                Some(v) => write!(f, "{}:{}", step.ply, v)?,
                None => write!(f, "{}", step.ply)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Path::root());
        }
        let mut steps = Vec::new();
        for part in s.split('/') {
            let bad = || TreeError::InvalidPath(s.to_string());
            let step = match part.split_once(':') {
                Some((ply, var)) => PathStep::variation(
                    ply.parse().map_err(|_| bad())?,
                    var.parse().map_err(|_| bad())?,
                ),
                None => PathStep::main(part.parse().map_err(|_| bad())?),
            };
            steps.push(step);
        }
        Ok(Path(steps))
    }
}
