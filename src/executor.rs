use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::policy::PolicyDecision;
use crate::registry::{SideEffect, ToolInvocationRequest};
use crate::session::{StepOutcome, StepRecord};

#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterFailure {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("adapter timed out")]
    Timeout,
    #[error("adapter crashed: {0}")]
    Crashed(String),
    #[error("adapter unavailable: {0}")]
    Unavailable(String),
}

/// One concrete inspection capability. Adapters are read-only by contract and
/// return a bounded textual result or a typed failure.
pub trait ToolAdapter: Send + Sync {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure>;
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorTimeouts {
    pub scan: Duration,
    pub default: Duration,
}

impl Default for ExecutorTimeouts {
    fn default() -> Self {
        Self {
            scan: Duration::from_secs(30),
            default: Duration::from_secs(10),
        }
    }
}

pub struct ToolExecutor {
    adapters: BTreeMap<String, Arc<dyn ToolAdapter>>,
    timeouts: ExecutorTimeouts,
    max_result_bytes: usize,
}

const MAX_ERROR_DETAIL_BYTES: usize = 512;

impl ToolExecutor {
    pub fn new(
        adapters: BTreeMap<String, Arc<dyn ToolAdapter>>,
        timeouts: ExecutorTimeouts,
        max_result_bytes: usize,
    ) -> Self {
        Self {
            adapters,
            timeouts,
            max_result_bytes,
        }
    }

    pub fn has_adapter(&self, tool: &str) -> bool {
        self.adapters.contains_key(tool)
    }

    fn timeout_for(&self, side_effect: SideEffect) -> Duration {
        match side_effect {
            SideEffect::Scan => self.timeouts.scan,
            _ => self.timeouts.default,
        }
    }

    /// Invokes exactly one adapter call under a bounded timeout and
    /// normalizes the result into a StepRecord. No retries here; retry
    /// policy belongs to the orchestrator.
    pub fn execute(
        &self,
        request: &ToolInvocationRequest,
        decision: &PolicyDecision,
        side_effect: SideEffect,
        step_index: u32,
        now: i64,
    ) -> StepRecord {
        if !decision.allowed {
            return StepRecord {
                step_index,
                tool_name: request.tool.clone(),
                args: request.args.clone(),
                started_at: now,
                ended_at: now,
                duration_ms: 0,
                outcome: StepOutcome::Denied,
                result: None,
                error: decision.denial_reason.clone(),
            };
        }

        let started = Instant::now();
        let outcome = match self.adapters.get(&request.tool) {
            Some(adapter) => {
                let adapter = Arc::clone(adapter);
                let args = request.args.clone();
                let (sender, receiver) = mpsc::channel();
                // The worker thread is detached on timeout; the adapter call
                // is read-only, so an overrun has nothing to roll back.
                thread::spawn(move || {
                    let _ = sender.send(adapter.invoke(&args));
                });
                match receiver.recv_timeout(self.timeout_for(side_effect)) {
                    Ok(result) => result,
                    Err(mpsc::RecvTimeoutError::Timeout) => Err(AdapterFailure::Timeout),
                    Err(mpsc::RecvTimeoutError::Disconnected) => Err(AdapterFailure::Crashed(
                        "adapter worker exited without a result".to_string(),
                    )),
                }
            }
            None => Err(AdapterFailure::Unavailable(format!(
                "no adapter registered for `{}`",
                request.tool
            ))),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let ended_at = now + (duration_ms / 1000) as i64;

        match outcome {
            Ok(result) => StepRecord {
                step_index,
                tool_name: request.tool.clone(),
                args: request.args.clone(),
                started_at: now,
                ended_at,
                duration_ms,
                outcome: StepOutcome::Success,
                result: Some(truncate_text(&result, self.max_result_bytes)),
                error: None,
            },
            Err(AdapterFailure::Timeout) => StepRecord {
                step_index,
                tool_name: request.tool.clone(),
                args: request.args.clone(),
                started_at: now,
                ended_at,
                duration_ms,
                outcome: StepOutcome::TimedOut,
                result: None,
                error: Some(format!(
                    "timed out after {}s",
                    self.timeout_for(side_effect).as_secs()
                )),
            },
            Err(failure) => StepRecord {
                step_index,
                tool_name: request.tool.clone(),
                args: request.args.clone(),
                started_at: now,
                ended_at,
                duration_ms,
                outcome: StepOutcome::Failed,
                result: None,
                error: Some(truncate_text(&failure.to_string(), MAX_ERROR_DETAIL_BYTES)),
            },
        }
    }
}

/// Truncates at a UTF-8 boundary at or below `limit` bytes.
pub fn truncate_text(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = text[..end].to_string();
    out.push_str("\n[truncated]");
    out
}
