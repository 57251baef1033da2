//! Analysis board core: session coordinator, rules engine collaborator and
//! configuration.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod rules;
pub mod variant;

pub use config::AnalysisConfig;
pub use coordinator::{AnalysisCoordinator, Presenter, SessionData};
pub use error::{AnalysisError, AnalysisResult, RulesError, RulesResult};
pub use rules::{RulesEngine, ShakmatyRules};
pub use variant::Variant;
