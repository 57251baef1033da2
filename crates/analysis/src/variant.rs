use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::CastlingMode;

use crate::error::RulesError;

/// Variants the analysis board can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variant {
    Standard,
    Chess960,
    FromPosition,
}

impl Variant {
    pub fn key(self) -> &'static str {
        match self {
            Variant::Standard => "standard",
            Variant::Chess960 => "chess960",
            Variant::FromPosition => "fromPosition",
        }
    }

    pub fn castling_mode(self) -> CastlingMode {
        match self {
            Variant::Chess960 => CastlingMode::Chess960,
            Variant::Standard | Variant::FromPosition => CastlingMode::Standard,
        }
    }

    /// Whether local engine evaluation makes sense for this variant.
    pub fn analysable(self) -> bool {
        true
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Variant {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Variant::Standard),
            "chess960" => Ok(Variant::Chess960),
            "fromPosition" => Ok(Variant::FromPosition),
            other => Err(RulesError::VariantUnsupported(other.to_string())),
        }
    }
}
