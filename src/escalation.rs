use std::io::{BufRead, Write};

/// What the operator is asked to approve. One context maps to exactly one
/// pending step; grants are never cached across steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationContext {
    pub tool_name: String,
    pub path: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationGrant {
    pub granted: bool,
    pub expires_at: i64,
}

pub trait EscalationBroker {
    fn request_escalation(&self, context: &EscalationContext, now: i64) -> EscalationGrant;
}

/// Non-interactive default: every privileged request is refused, which
/// degrades to a recorded policy denial for that single step.
pub struct DenyAllBroker;

impl EscalationBroker for DenyAllBroker {
    fn request_escalation(&self, _context: &EscalationContext, now: i64) -> EscalationGrant {
        EscalationGrant {
            granted: false,
            expires_at: now,
        }
    }
}

const GRANT_TTL_SECONDS: i64 = 300;

/// Prompts the operator on stdin for explicit per-step approval.
pub struct InteractiveBroker;

impl InteractiveBroker {
    fn prompt(&self, context: &EscalationContext) -> std::io::Result<bool> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "Permission required: {}", context.reason)?;
        if let Some(path) = &context.path {
            writeln!(out, "  tool: {}  path: {}", context.tool_name, path)?;
        } else {
            writeln!(out, "  tool: {}", context.tool_name)?;
        }
        write!(out, "Grant elevated access for this single step? [y/N] ")?;
        out.flush()?;

        let stdin = std::io::stdin();
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

impl EscalationBroker for InteractiveBroker {
    fn request_escalation(&self, context: &EscalationContext, now: i64) -> EscalationGrant {
        let granted = self.prompt(context).unwrap_or(false);
        EscalationGrant {
            granted,
            expires_at: if granted { now + GRANT_TTL_SECONDS } else { now },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_all_broker_refuses_and_expires_immediately() {
        let context = EscalationContext {
            tool_name: "read_file".to_string(),
            path: Some("/System/launchd.plist".to_string()),
            reason: "read file outside allowed scope".to_string(),
        };
        let grant = DenyAllBroker.request_escalation(&context, 1_000);
        assert!(!grant.granted);
        assert_eq!(grant.expires_at, 1_000);
    }
}
