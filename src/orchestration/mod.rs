pub mod classify;
pub mod engine;
pub mod error;
pub mod report;

pub use classify::{classify_problem, initial_goals};
pub use engine::{EngineConfig, InvestigationEngine, Phase};
pub use error::OrchestratorError;
pub use report::build_report;
