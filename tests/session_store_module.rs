use autoav::session::{
    ProblemType, Role, SessionState, SessionStore, StepOutcome, StepLogRecord,
};
use serde_json::Map;
use tempfile::tempdir;

fn sample_session(session_id: &str) -> SessionState {
    let mut session = SessionState::new(
        session_id,
        "pop-ups keep appearing",
        ProblemType::SuspiciousPopups,
        1_700_000_000,
    );
    session.push_turn(Role::User, "pop-ups keep appearing");
    session.push_turn(Role::Assistant, "checking browser extensions");
    session
}

fn sample_log_record(step_index: u32, tool_name: &str, detail: &str) -> StepLogRecord {
    StepLogRecord {
        timestamp: 1_700_000_000 + i64::from(step_index),
        step_index,
        tool_name: tool_name.to_string(),
        args: Map::new(),
        duration_ms: 12,
        outcome: StepOutcome::Success,
        detail: detail.to_string(),
    }
}

#[test]
fn sessions_round_trip_through_the_store() {
    let dir = tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path());

    let session = sample_session("20260829_120000-ab12");
    store.persist_session(&session).expect("persist");

    let loaded = store.load_session(&session.session_id).expect("load");
    assert_eq!(loaded, session);
    assert_eq!(loaded.transcript.len(), 2);
}

#[test]
fn persisting_twice_overwrites_cleanly() {
    let dir = tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path());

    let mut session = sample_session("20260829_120000-ab12");
    store.persist_session(&session).expect("first persist");
    session.terminated = true;
    session.final_report = Some("all clear".to_string());
    store.persist_session(&session).expect("second persist");

    let loaded = store.load_session(&session.session_id).expect("load");
    assert!(loaded.terminated);
    assert_eq!(loaded.final_report.as_deref(), Some("all clear"));
}

#[test]
fn missing_sessions_and_traversal_ids_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path());

    let missing = store.load_session("20260829_120000-zz99");
    assert!(matches!(
        missing,
        Err(autoav::session::SessionError::NotFound { .. })
    ));

    let traversal = store.load_session("../../etc/passwd");
    assert!(matches!(
        traversal,
        Err(autoav::session::SessionError::InvalidSessionId { .. })
    ));
}

#[test]
fn step_log_appends_in_order() {
    let dir = tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path());
    let session_id = "20260829_120000-ab12";

    store
        .append_step_log(session_id, &sample_log_record(1, "list_processes", "ok"))
        .expect("append 1");
    store
        .append_step_log(session_id, &sample_log_record(2, "scan_file", "FOUND"))
        .expect("append 2");

    let records = store.load_step_log(session_id).expect("load log");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].step_index, 1);
    assert_eq!(records[1].step_index, 2);
    assert_eq!(records[1].tool_name, "scan_file");
}

#[test]
fn listing_orders_sessions_newest_first() {
    let dir = tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path());

    store
        .persist_session(&sample_session("20260828_090000-aaaa"))
        .expect("persist older");
    store
        .persist_session(&sample_session("20260829_090000-bbbb"))
        .expect("persist newer");

    let listed = store.list_sessions().expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].session_id, "20260829_090000-bbbb");
    assert_eq!(listed[1].session_id, "20260828_090000-aaaa");
}

#[test]
fn search_matches_tool_names_and_details_case_insensitively() {
    let dir = tempdir().expect("tempdir");
    let store = SessionStore::new(dir.path());
    let session_id = "20260829_120000-ab12";

    store
        .persist_session(&sample_session(session_id))
        .expect("persist");
    store
        .append_step_log(
            session_id,
            &sample_log_record(1, "scan_file", "/tmp/bad.bin: Eicar-Test FOUND"),
        )
        .expect("append");

    let by_tool = store.search_sessions("SCAN_FILE").expect("search tool");
    assert_eq!(by_tool.len(), 1);
    assert_eq!(by_tool[0].0, session_id);

    let by_detail = store.search_sessions("eicar").expect("search detail");
    assert_eq!(by_detail[0].1.len(), 1);

    let no_match = store.search_sessions("ransomware").expect("search none");
    assert!(no_match.is_empty());
}
