pub mod record;
pub mod store;

pub use record::{
    ProblemType, Role, SessionState, StepOutcome, StepRecord, TranscriptTurn,
};
pub use store::{SessionError, SessionStore, SessionSummary, StepLogRecord};
