use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::Settings;
use crate::escalation::{EscalationBroker, EscalationContext};
use crate::executor::ToolExecutor;
use crate::llm::{ModelError, ModelTurn, ReasoningModel};
use crate::orchestration::classify::{classify_problem, initial_goals};
use crate::orchestration::error::OrchestratorError;
use crate::orchestration::report::build_report;
use crate::policy::{PolicyDecision, PolicyGuard};
use crate::registry::{ToolInvocationRequest, ToolRegistry};
use crate::session::store::step_log_record;
use crate::session::{Role, SessionState, SessionStore, StepOutcome, StepRecord};
use crate::shared::ids::generate_session_id;
use crate::shared::logging::append_investigation_log_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Classifying,
    Reasoning,
    Dispatching,
    Reporting,
    Terminated,
}

impl Phase {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Phase::Classifying, Phase::Reasoning)
                | (Phase::Classifying, Phase::Reporting)
                | (Phase::Reasoning, Phase::Dispatching)
                | (Phase::Reasoning, Phase::Reporting)
                | (Phase::Dispatching, Phase::Reasoning)
                | (Phase::Dispatching, Phase::Reporting)
                | (Phase::Reporting, Phase::Terminated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Terminated)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub max_steps: u32,
    pub retry_backoff: Duration,
    pub max_result_bytes: usize,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_steps: settings.max_steps,
            retry_backoff: Duration::from_secs(settings.retry_backoff_seconds),
            max_result_bytes: settings.max_result_bytes,
        }
    }
}

/// The investigation control loop. One engine run owns one SessionState
/// exclusively; there is exactly one outstanding reasoning call or tool
/// invocation at any time, so the transcript stays strictly ordered.
pub struct InvestigationEngine<'a> {
    registry: &'a ToolRegistry,
    policy: &'a PolicyGuard,
    executor: &'a ToolExecutor,
    broker: &'a dyn EscalationBroker,
    model: &'a dyn ReasoningModel,
    store: Option<&'a SessionStore>,
    config: EngineConfig,
    cancel: Arc<AtomicBool>,
}

impl<'a> InvestigationEngine<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: &'a ToolRegistry,
        policy: &'a PolicyGuard,
        executor: &'a ToolExecutor,
        broker: &'a dyn EscalationBroker,
        model: &'a dyn ReasoningModel,
        store: Option<&'a SessionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            policy,
            executor,
            broker,
            model,
            store,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flips to true from a signal handler or another thread; the loop
    /// honors it at the next cycle boundary by jumping to Reporting.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(&self, problem_statement: &str) -> Result<SessionState, OrchestratorError> {
        let started_at = now_secs();
        let mut session_id =
            generate_session_id(started_at).map_err(OrchestratorError::SessionId)?;
        if let Some(store) = self.store {
            // The suffix keeps same-second collisions rare; regenerate if one
            // lands on an existing session directory anyway.
            let mut attempts = 0;
            while store.session_exists(&session_id) && attempts < 4 {
                session_id =
                    generate_session_id(started_at).map_err(OrchestratorError::SessionId)?;
                attempts += 1;
            }
        }

        let mut phase = Phase::Classifying;
        let problem_type = classify_problem(problem_statement);
        let mut session = SessionState::new(
            session_id,
            problem_statement.trim(),
            problem_type,
            started_at,
        );
        session.push_turn(
            Role::User,
            format!(
                "Problem: {}\nClassified as: {problem_type}\n{}",
                session.problem_statement,
                initial_goals(problem_type)
            ),
        );
        self.persist(&session)?;
        self.log(&format!(
            "session {} started problem_type={problem_type}",
            session.session_id
        ));

        self.transition(&mut phase, Phase::Reasoning);
        let mut reasoning_step = 0_u32;
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                session.partial = true;
                session.push_turn(Role::System, "investigation canceled by the operator");
                break;
            }
            if session.steps.len() as u32 >= self.config.max_steps {
                session.partial = true;
                break;
            }

            reasoning_step += 1;
            let turn = match self.reason_with_retry(&session, reasoning_step) {
                Ok(turn) => turn,
                Err(err) => {
                    // Fatal to the run, never a crash: the audit trail and a
                    // best-effort inconclusive report survive.
                    session.partial = true;
                    session.push_turn(
                        Role::System,
                        format!("reasoning model unavailable: {err}"),
                    );
                    self.log(&format!(
                        "session {} reasoning failed: {err}",
                        session.session_id
                    ));
                    break;
                }
            };

            match turn {
                ModelTurn::Completion(analysis) => {
                    if !analysis.trim().is_empty() {
                        session.push_turn(Role::Assistant, analysis);
                    }
                    break;
                }
                ModelTurn::ToolCalls(requests) => {
                    if requests.is_empty() {
                        // A turn proposing no tools appends no step, so the
                        // ceiling would never trip; treat it as completion.
                        break;
                    }
                    self.transition(&mut phase, Phase::Dispatching);
                    let mut ceiling_hit = false;
                    for request in requests {
                        if session.steps.len() as u32 >= self.config.max_steps {
                            ceiling_hit = true;
                            break;
                        }
                        self.dispatch(&mut session, &request)?;
                    }
                    if ceiling_hit {
                        session.partial = true;
                        break;
                    }
                    self.transition(&mut phase, Phase::Reasoning);
                }
            }
        }

        self.transition(&mut phase, Phase::Reporting);
        session.terminated = true;
        session.final_report = Some(build_report(&session));
        self.transition(&mut phase, Phase::Terminated);
        self.persist(&session)?;
        self.log(&format!(
            "session {} terminated steps={} partial={}",
            session.session_id,
            session.steps.len(),
            session.partial
        ));
        Ok(session)
    }

    /// One retry with backoff for transient collaborator failures; anything
    /// else, or a second failure, is fatal for the run.
    fn reason_with_retry(
        &self,
        session: &SessionState,
        reasoning_step: u32,
    ) -> Result<ModelTurn, ModelError> {
        match self
            .model
            .next_turn(&session.transcript, self.registry, reasoning_step)
        {
            Ok(turn) => Ok(turn),
            Err(err) if err.is_retryable() => {
                self.log(&format!(
                    "session {} transient model failure, retrying: {err}",
                    session.session_id
                ));
                thread::sleep(self.config.retry_backoff);
                self.model
                    .next_turn(&session.transcript, self.registry, reasoning_step)
            }
            Err(err) => Err(err),
        }
    }

    fn dispatch(
        &self,
        session: &mut SessionState,
        request: &ToolInvocationRequest,
    ) -> Result<(), OrchestratorError> {
        let step_index = session.next_step_index();
        let now = now_secs();

        let record = match self.registry.validate_invocation(request) {
            Err(validation) => {
                // Rejected before dispatch; no adapter is ever reached.
                StepRecord {
                    step_index,
                    tool_name: request.tool.clone(),
                    args: request.args.clone(),
                    started_at: now,
                    ended_at: now,
                    duration_ms: 0,
                    outcome: StepOutcome::Denied,
                    result: None,
                    error: Some(validation.to_string()),
                }
            }
            Ok(()) => {
                let spec = self
                    .registry
                    .get_spec(&request.tool)
                    .cloned()
                    .unwrap_or_else(|| unreachable_spec(&request.tool));
                let mut decision = self.policy.evaluate(request, &spec);
                if decision.allowed && decision.requires_escalation {
                    decision = self.resolve_escalation(request, now);
                }
                self.executor
                    .execute(request, &decision, spec.side_effect, step_index, now)
            }
        };

        session.push_turn(
            Role::Tool,
            format!(
                "tool {} step={} outcome={}\n{}",
                record.tool_name,
                record.step_index,
                record.outcome,
                record.detail()
            ),
        );
        self.log(&format!(
            "session {} step {} tool={} outcome={}",
            session.session_id, record.step_index, record.tool_name, record.outcome
        ));
        if let Some(store) = self.store {
            store.append_step_log(
                &session.session_id,
                &step_log_record(&record, self.config.max_result_bytes),
            )?;
        }
        session.steps.push(record);
        self.persist(session)?;
        Ok(())
    }

    /// Escalation is per pending step: every privileged request is put to
    /// the operator independently, in the order the model proposed it.
    fn resolve_escalation(&self, request: &ToolInvocationRequest, now: i64) -> PolicyDecision {
        let path = request
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let context = EscalationContext {
            tool_name: request.tool.clone(),
            path,
            reason: format!("`{}` targets a path outside the allowed scope", request.tool),
        };
        let grant = self.broker.request_escalation(&context, now);
        if grant.granted && grant.expires_at > now {
            PolicyDecision::allow()
        } else {
            PolicyDecision::deny("escalation declined by operator")
        }
    }

    fn transition(&self, phase: &mut Phase, next: Phase) {
        debug_assert!(phase.can_transition_to(next), "{phase:?} -> {next:?}");
        *phase = next;
    }

    fn persist(&self, session: &SessionState) -> Result<(), OrchestratorError> {
        if let Some(store) = self.store {
            store.persist_session(session)?;
        }
        Ok(())
    }

    fn log(&self, line: &str) {
        if let Some(store) = self.store {
            let _ = append_investigation_log_line(store.state_root(), line);
        }
    }
}

fn unreachable_spec(tool: &str) -> crate::registry::ToolSpec {
    // validate_invocation succeeded, so the spec exists; this keeps the
    // dispatch path panic-free regardless.
    crate::registry::ToolSpec {
        name: tool.to_string(),
        description: String::new(),
        params: Default::default(),
        side_effect: crate::registry::SideEffect::ReadMetadata,
    }
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
