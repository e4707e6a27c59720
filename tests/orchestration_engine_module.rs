use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autoav::config::Settings;
use autoav::escalation::{DenyAllBroker, EscalationBroker, EscalationContext, EscalationGrant};
use autoav::executor::{AdapterFailure, ExecutorTimeouts, ToolAdapter, ToolExecutor};
use autoav::llm::{ModelError, ModelTurn, ReasoningModel};
use autoav::orchestration::{EngineConfig, InvestigationEngine};
use autoav::policy::PolicyGuard;
use autoav::registry::{ToolInvocationRequest, ToolRegistry};
use autoav::session::{SessionStore, StepOutcome};
use serde_json::{Map, Value};
use tempfile::tempdir;

struct ScriptedModel {
    turns: Mutex<VecDeque<Result<ModelTurn, ModelError>>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Result<ModelTurn, ModelError>>) -> Self {
        Self {
            turns: Mutex::new(VecDeque::from(turns)),
        }
    }
}

impl ReasoningModel for ScriptedModel {
    fn next_turn(
        &self,
        _transcript: &[autoav::session::TranscriptTurn],
        _registry: &ToolRegistry,
        _reasoning_step: u32,
    ) -> Result<ModelTurn, ModelError> {
        self.turns
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Ok(ModelTurn::Completion("no further actions".to_string())))
    }
}

#[derive(Default)]
struct CountingAdapter {
    calls: AtomicUsize,
}

impl ToolAdapter for CountingAdapter {
    fn invoke(&self, _args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("PID COMMAND\n1 launchd\n4242 SearchAdware".to_string())
    }
}

struct NoToolsModel;

impl ReasoningModel for NoToolsModel {
    fn next_turn(
        &self,
        _transcript: &[autoav::session::TranscriptTurn],
        _registry: &ToolRegistry,
        _reasoning_step: u32,
    ) -> Result<ModelTurn, ModelError> {
        Ok(ModelTurn::ToolCalls(Vec::new()))
    }
}

struct GrantAllBroker;

impl EscalationBroker for GrantAllBroker {
    fn request_escalation(&self, _context: &EscalationContext, now: i64) -> EscalationGrant {
        EscalationGrant {
            granted: true,
            expires_at: now + 60,
        }
    }
}

fn tool_call(tool: &str, args: &[(&str, Value)], reasoning_step: u32) -> ToolInvocationRequest {
    ToolInvocationRequest {
        tool: tool.to_string(),
        args: Map::from_iter(
            args.iter()
                .map(|(key, value)| (key.to_string(), value.clone())),
        ),
        reasoning_step,
    }
}

fn test_settings(home: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.allow_roots.push(home.to_path_buf());
    settings.retry_backoff_seconds = 0;
    settings
}

fn test_executor(adapters: BTreeMap<String, Arc<dyn ToolAdapter>>) -> ToolExecutor {
    ToolExecutor::new(
        adapters,
        ExecutorTimeouts {
            scan: Duration::from_secs(5),
            default: Duration::from_secs(5),
        },
        16_384,
    )
}

#[test]
fn scripted_investigation_runs_to_completion_and_persists() {
    let home = tempdir().expect("home");
    let state = tempdir().expect("state");
    let settings = test_settings(home.path());
    let store = SessionStore::new(state.path());

    let counter = Arc::new(CountingAdapter::default());
    let mut adapters: BTreeMap<String, Arc<dyn ToolAdapter>> = BTreeMap::new();
    adapters.insert("list_processes".to_string(), counter.clone());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(adapters);
    let model = ScriptedModel::new(vec![
        Ok(ModelTurn::ToolCalls(vec![tool_call(
            "list_processes",
            &[],
            1,
        )])),
        Ok(ModelTurn::Completion(
            "Analysis: SearchAdware is running and should be removed.".to_string(),
        )),
    ]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        Some(&store),
        EngineConfig::from_settings(&settings),
    );

    let session = engine
        .run("I keep seeing suspicious pop-ups in my browser")
        .expect("run");

    assert!(session.terminated);
    assert!(!session.partial);
    assert_eq!(session.steps.len(), 1);
    assert_eq!(session.steps[0].step_index, 1);
    assert_eq!(session.steps[0].outcome, StepOutcome::Success);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);

    let report = session.final_report.as_deref().expect("report");
    assert!(report.contains("Analysis"));
    assert!(report.contains("SearchAdware"));

    let loaded = store.load_session(&session.session_id).expect("load");
    assert_eq!(loaded, session);

    let log = store.load_step_log(&session.session_id).expect("step log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].tool_name, "list_processes");
    assert_eq!(log[0].outcome, StepOutcome::Success);
}

#[test]
fn unknown_tool_is_rejected_before_any_adapter_runs() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let counter = Arc::new(CountingAdapter::default());
    let mut adapters: BTreeMap<String, Arc<dyn ToolAdapter>> = BTreeMap::new();
    adapters.insert("list_processes".to_string(), counter.clone());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(adapters);
    let model = ScriptedModel::new(vec![
        Ok(ModelTurn::ToolCalls(vec![tool_call("delete_file", &[], 1)])),
        Ok(ModelTurn::Completion("nothing else to do".to_string())),
    ]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    let session = engine.run("slow machine").expect("run");
    assert_eq!(session.steps.len(), 1);
    assert_eq!(session.steps[0].outcome, StepOutcome::Denied);
    assert!(session.steps[0]
        .error
        .as_deref()
        .expect("error detail")
        .contains("unknown tool"));
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_required_argument_is_recorded_as_denied() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let counter = Arc::new(CountingAdapter::default());
    let mut adapters: BTreeMap<String, Arc<dyn ToolAdapter>> = BTreeMap::new();
    adapters.insert("scan_file".to_string(), counter.clone());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(adapters);
    let model = ScriptedModel::new(vec![
        Ok(ModelTurn::ToolCalls(vec![tool_call("scan_file", &[], 1)])),
        Ok(ModelTurn::Completion("done".to_string())),
    ]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    let session = engine.run("virus scan please").expect("run");
    assert_eq!(session.steps[0].outcome, StepOutcome::Denied);
    assert!(session.steps[0]
        .error
        .as_deref()
        .expect("error detail")
        .contains("missing required argument"));
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn out_of_scope_read_is_denied_when_escalation_is_declined() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let counter = Arc::new(CountingAdapter::default());
    let mut adapters: BTreeMap<String, Arc<dyn ToolAdapter>> = BTreeMap::new();
    adapters.insert("read_file".to_string(), counter.clone());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(adapters);
    let model = ScriptedModel::new(vec![
        Ok(ModelTurn::ToolCalls(vec![tool_call(
            "read_file",
            &[("path", Value::String("/System/launchd.plist".to_string()))],
            1,
        )])),
        Ok(ModelTurn::Completion("could not inspect".to_string())),
    ]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    let session = engine.run("something changed my system files").expect("run");
    assert_eq!(session.steps[0].outcome, StepOutcome::Denied);
    assert!(session.steps[0]
        .error
        .as_deref()
        .expect("error detail")
        .contains("escalation declined"));
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    assert!(session.terminated);
    assert!(session.final_report.is_some());
}

#[test]
fn granted_escalation_executes_the_privileged_read() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let counter = Arc::new(CountingAdapter::default());
    let mut adapters: BTreeMap<String, Arc<dyn ToolAdapter>> = BTreeMap::new();
    adapters.insert("read_file".to_string(), counter.clone());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(adapters);
    let model = ScriptedModel::new(vec![
        Ok(ModelTurn::ToolCalls(vec![tool_call(
            "read_file",
            &[("path", Value::String("/System/launchd.plist".to_string()))],
            1,
        )])),
        Ok(ModelTurn::Completion("inspected".to_string())),
    ]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &GrantAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    let session = engine.run("check my launch daemons").expect("run");
    assert_eq!(session.steps[0].outcome, StepOutcome::Success);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn model_failure_after_retry_yields_an_inconclusive_partial_report() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(BTreeMap::new());
    let model = ScriptedModel::new(vec![
        Err(ModelError::Timeout { timeout_ms: 1_000 }),
        Err(ModelError::Transport("connection refused".to_string())),
    ]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    let session = engine.run("popups everywhere").expect("run");
    assert!(session.terminated);
    assert!(session.partial);
    assert!(session.steps.is_empty());
    let report = session.final_report.as_deref().expect("report");
    assert!(report.contains("inconclusive"));
}

#[test]
fn transient_model_failure_recovers_after_one_retry() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(BTreeMap::new());
    let model = ScriptedModel::new(vec![
        Err(ModelError::Transport("connection reset".to_string())),
        Ok(ModelTurn::Completion("system looks clean".to_string())),
    ]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    let session = engine.run("am I infected?").expect("run");
    assert!(!session.partial);
    assert!(session
        .final_report
        .as_deref()
        .expect("report")
        .contains("system looks clean"));
}

#[test]
fn non_retryable_model_failure_is_not_retried() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(BTreeMap::new());
    // A second scripted turn would succeed; the engine must never reach it.
    let model = ScriptedModel::new(vec![
        Err(ModelError::Api {
            status: 401,
            detail: "invalid api key".to_string(),
        }),
        Ok(ModelTurn::Completion("should not be reached".to_string())),
    ]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    let session = engine.run("popups").expect("run");
    assert!(session.partial);
    assert!(!session
        .final_report
        .as_deref()
        .expect("report")
        .contains("should not be reached"));
}

#[test]
fn step_ceiling_truncates_dispatch_and_marks_the_session_partial() {
    let home = tempdir().expect("home");
    let mut settings = test_settings(home.path());
    settings.max_steps = 2;

    let counter = Arc::new(CountingAdapter::default());
    let mut adapters: BTreeMap<String, Arc<dyn ToolAdapter>> = BTreeMap::new();
    adapters.insert("list_processes".to_string(), counter.clone());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(adapters);
    let model = ScriptedModel::new(vec![Ok(ModelTurn::ToolCalls(vec![
        tool_call("list_processes", &[], 1),
        tool_call("list_processes", &[], 1),
        tool_call("list_processes", &[], 1),
    ]))]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    let session = engine.run("endless symptoms").expect("run");
    assert!(session.partial);
    assert_eq!(session.steps.len(), 2);
    assert_eq!(session.steps[0].step_index, 1);
    assert_eq!(session.steps[1].step_index, 2);
    assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    assert!(session.final_report.is_some());
}

#[test]
fn a_turn_with_no_tool_calls_ends_the_investigation() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(BTreeMap::new());
    let model = NoToolsModel;

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );

    // The model proposes nothing on every turn; the run must still terminate.
    let session = engine.run("nothing seems wrong").expect("run");
    assert!(session.terminated);
    assert!(!session.partial);
    assert!(session.steps.is_empty());
}

#[test]
fn cancellation_flag_stops_the_loop_at_the_next_boundary() {
    let home = tempdir().expect("home");
    let settings = test_settings(home.path());

    let registry = ToolRegistry::builtin().expect("catalog");
    let policy = PolicyGuard::new(&settings, home.path());
    let executor = test_executor(BTreeMap::new());
    let model = ScriptedModel::new(vec![Ok(ModelTurn::Completion(
        "should not be consulted".to_string(),
    ))]);

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        &DenyAllBroker,
        &model,
        None,
        EngineConfig::from_settings(&settings),
    );
    engine.cancel_handle().store(true, Ordering::SeqCst);

    let session = engine.run("never mind").expect("run");
    assert!(session.partial);
    assert!(session.terminated);
    assert!(session.steps.is_empty());
}
