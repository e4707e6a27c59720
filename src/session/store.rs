use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::session::record::{SessionState, StepOutcome, StepRecord};
use crate::shared::fs_atomic::atomic_write_file;
use crate::shared::ids::is_valid_session_id;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("session `{session_id}` not found")]
    NotFound { session_id: String },
    #[error("invalid session id `{session_id}`")]
    InvalidSessionId { session_id: String },
}

/// One structured per-step record in the append-only session log. This is the
/// contract the orchestrator emits for the external log sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogRecord {
    pub timestamp: i64,
    pub step_index: u32,
    pub tool_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    pub duration_ms: u64,
    pub outcome: StepOutcome,
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub modified_at: i64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    state_root: PathBuf,
}

impl SessionStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.state_root.join("sessions").join(session_id)
    }

    fn session_metadata_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("session.json")
    }

    fn step_log_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("steps.jsonl")
    }

    pub fn persist_session(&self, session: &SessionState) -> Result<(), SessionError> {
        let path = self.session_metadata_path(&session.session_id);
        let body = serde_json::to_vec_pretty(session).map_err(|e| json_error(&path, e))?;
        atomic_write_file(&path, &body).map_err(|e| io_error(&path, e))
    }

    pub fn session_exists(&self, session_id: &str) -> bool {
        is_valid_session_id(session_id) && self.session_metadata_path(session_id).is_file()
    }

    pub fn load_session(&self, session_id: &str) -> Result<SessionState, SessionError> {
        if !is_valid_session_id(session_id) {
            return Err(SessionError::InvalidSessionId {
                session_id: session_id.to_string(),
            });
        }
        let path = self.session_metadata_path(session_id);
        if !path.is_file() {
            return Err(SessionError::NotFound {
                session_id: session_id.to_string(),
            });
        }
        let raw = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        serde_json::from_str(&raw).map_err(|e| json_error(&path, e))
    }

    pub fn append_step_log(
        &self,
        session_id: &str,
        record: &StepLogRecord,
    ) -> Result<(), SessionError> {
        let path = self.step_log_path(session_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let line = serde_json::to_string(record).map_err(|e| json_error(&path, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| io_error(&path, e))
    }

    pub fn load_step_log(&self, session_id: &str) -> Result<Vec<StepLogRecord>, SessionError> {
        let path = self.step_log_path(session_id);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        let mut records = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(line).map_err(|e| json_error(&path, e))?);
        }
        Ok(records)
    }

    /// Sessions sorted newest first; ids embed the start time so the string
    /// sort matches chronological order.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let root = self.state_root.join("sessions");
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        let entries = fs::read_dir(&root).map_err(|e| io_error(&root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&root, e))?;
            let Some(session_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let metadata_path = entry.path().join("session.json");
            let Ok(metadata) = fs::metadata(&metadata_path) else {
                continue;
            };
            let modified_at = metadata
                .modified()
                .ok()
                .and_then(|time| {
                    time.duration_since(std::time::UNIX_EPOCH)
                        .ok()
                        .map(|d| d.as_secs() as i64)
                })
                .unwrap_or(0);
            sessions.push(SessionSummary {
                session_id,
                modified_at,
                size_bytes: metadata.len(),
            });
        }
        sessions.sort_by(|a, b| b.session_id.cmp(&a.session_id));
        Ok(sessions)
    }

    /// Case-insensitive search over step-log tool names and details across
    /// all stored sessions.
    pub fn search_sessions(
        &self,
        query: &str,
    ) -> Result<Vec<(String, Vec<StepLogRecord>)>, SessionError> {
        let needle = query.to_lowercase();
        let mut results = Vec::new();
        for summary in self.list_sessions()? {
            let matches: Vec<StepLogRecord> = self
                .load_step_log(&summary.session_id)?
                .into_iter()
                .filter(|record| {
                    record.tool_name.to_lowercase().contains(&needle)
                        || record.detail.to_lowercase().contains(&needle)
                })
                .collect();
            if !matches.is_empty() {
                results.push((summary.session_id, matches));
            }
        }
        Ok(results)
    }
}

pub fn step_log_record(record: &StepRecord, truncate_to: usize) -> StepLogRecord {
    let detail = crate::executor::truncate_text(record.detail(), truncate_to);
    StepLogRecord {
        timestamp: record.started_at,
        step_index: record.step_index,
        tool_name: record.tool_name.clone(),
        args: record.args.clone(),
        duration_ms: record.duration_ms,
        outcome: record.outcome,
        detail,
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> SessionError {
    SessionError::Json {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::record::ProblemType;

    fn sample_step(index: u32) -> StepRecord {
        StepRecord {
            step_index: index,
            tool_name: "list_processes".to_string(),
            args: Map::new(),
            started_at: 100 + index as i64,
            ended_at: 101 + index as i64,
            duration_ms: 1000,
            outcome: StepOutcome::Success,
            result: Some("ok".to_string()),
            error: None,
        }
    }

    #[test]
    fn session_round_trips_through_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path());
        let mut session =
            SessionState::new("20240101_000000-aaaa", "popups", ProblemType::General, 100);
        session.steps.push(sample_step(1));
        store.persist_session(&session).expect("persist");

        let loaded = store.load_session("20240101_000000-aaaa").expect("load");
        assert_eq!(loaded, session);
    }

    #[test]
    fn session_exists_tracks_persisted_ids_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path());
        assert!(!store.session_exists("20240101_000000-aaaa"));
        store
            .persist_session(&SessionState::new(
                "20240101_000000-aaaa",
                "popups",
                ProblemType::General,
                100,
            ))
            .expect("persist");
        assert!(store.session_exists("20240101_000000-aaaa"));
        assert!(!store.session_exists("../escape"));
    }

    #[test]
    fn missing_session_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path());
        assert!(matches!(
            store.load_session("20240101_000000-zzzz"),
            Err(SessionError::NotFound { .. })
        ));
    }

    #[test]
    fn traversal_session_ids_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path());
        assert!(matches!(
            store.load_session("../escape"),
            Err(SessionError::InvalidSessionId { .. })
        ));
    }

    #[test]
    fn step_log_appends_and_reloads_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path());
        for index in 1..=3 {
            store
                .append_step_log(
                    "20240101_000000-aaaa",
                    &step_log_record(&sample_step(index), 64),
                )
                .expect("append");
        }
        let records = store.load_step_log("20240101_000000-aaaa").expect("load");
        assert_eq!(
            records.iter().map(|r| r.step_index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn search_matches_tool_names_and_details() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path());
        let mut infected = sample_step(1);
        infected.tool_name = "scan_file".to_string();
        infected.result = Some("/tmp/bad: Eicar-Test-Signature FOUND".to_string());
        store
            .append_step_log("20240101_000000-aaaa", &step_log_record(&infected, 256))
            .expect("append");
        store
            .persist_session(&SessionState::new(
                "20240101_000000-aaaa",
                "popups",
                ProblemType::General,
                100,
            ))
            .expect("persist");

        let hits = store.search_sessions("FOUND").expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "20240101_000000-aaaa");
        assert!(store.search_sessions("no-such-term").expect("seek").is_empty());
    }
}
