use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Denied,
    Failed,
    TimedOut,
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Denied => write!(f, "denied"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// One validated-and-executed (or denied/failed) tool invocation. Immutable
/// once appended; step indices are monotonic and start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_index: u32,
    pub tool_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    pub started_at: i64,
    pub ended_at: i64,
    pub duration_ms: u64,
    pub outcome: StepOutcome,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn detail(&self) -> &str {
        self.result
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptTurn {
    pub role: Role,
    pub content: String,
}

impl TranscriptTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    SuspiciousPopups,
    SearchMarquis,
    General,
    Unclassified,
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuspiciousPopups => write!(f, "suspicious_popups"),
            Self::SearchMarquis => write!(f, "search_marquis"),
            Self::General => write!(f, "general"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// The mutable record of one investigation. Owned exclusively by a single
/// orchestrator run; appended to by the loop and frozen at termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub problem_statement: String,
    pub problem_type: ProblemType,
    pub started_at: i64,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub transcript: Vec<TranscriptTurn>,
    #[serde(default)]
    pub terminated: bool,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub final_report: Option<String>,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        problem_statement: impl Into<String>,
        problem_type: ProblemType,
        started_at: i64,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            problem_statement: problem_statement.into(),
            problem_type,
            started_at,
            steps: Vec::new(),
            transcript: Vec::new(),
            terminated: false,
            partial: false,
            final_report: None,
        }
    }

    pub fn next_step_index(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    pub fn push_turn(&mut self, role: Role, content: impl Into<String>) {
        self.transcript.push(TranscriptTurn::new(role, content));
    }
}
