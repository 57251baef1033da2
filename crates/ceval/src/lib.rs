//! Client-side evaluation: a fixed set of background UCI engines driven one
//! logical request at a time, streaming incremental results back over a
//! channel tagged with the tree path they belong to.

pub mod castle;
pub mod engine;
pub mod error;
pub mod pool;
pub mod settings;
pub mod stockfish;

mod worker;

pub use castle::normalize_castle;
pub use engine::{EngineLauncher, EvalEngine, SearchJob};
pub use error::{CevalError, CevalResult};
pub use pool::{EvalEmit, EvalPool, PlayedMove, PoolConfig, RequestId, Work};
pub use settings::{CevalSettings, SettingsStore};
pub use stockfish::{StockfishEngine, StockfishLauncher};
