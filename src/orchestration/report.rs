use crate::session::{Role, SessionState, StepOutcome};

/// Renders the final human-facing report from a frozen session. Pure over
/// the session value: replaying the same state yields the same text.
pub fn build_report(session: &SessionState) -> String {
    let mut out = String::new();
    out.push_str(&format!("Investigation report for session {}\n", session.session_id));
    out.push_str(&format!("Problem: {}\n", session.problem_statement));
    out.push_str(&format!("Classification: {}\n", session.problem_type));
    out.push_str(&format!("Steps executed: {}\n", session.steps.len()));
    if session.partial {
        out.push_str("Status: partial (the investigation ended before completion)\n");
    }
    out.push('\n');

    out.push_str("Step summary:\n");
    if session.steps.is_empty() {
        out.push_str("  (no tool invocations were dispatched)\n");
    }
    for step in &session.steps {
        out.push_str(&format!(
            "  {:>3}. {:<26} {:>9}  {:>6}ms\n",
            step.step_index,
            step.tool_name,
            step.outcome.to_string(),
            step.duration_ms,
        ));
    }
    out.push('\n');

    out.push_str("Analysis:\n");
    out.push_str(&narrative(session));
    out.push('\n');

    let recommendations = remediation_recommendations(session);
    if !recommendations.is_empty() {
        out.push_str("\nRecommendations:\n");
        for (index, recommendation) in recommendations.iter().enumerate() {
            out.push_str(&format!("  {}. {recommendation}\n", index + 1));
        }
    }
    out
}

/// The model's completion text when the run produced one, otherwise a
/// minimal synthesized summary of what happened.
fn narrative(session: &SessionState) -> String {
    if let Some(turn) = session
        .transcript
        .iter()
        .rev()
        .find(|turn| turn.role == Role::Assistant)
    {
        return turn.content.clone();
    }
    let succeeded = session
        .steps
        .iter()
        .filter(|step| step.outcome == StepOutcome::Success)
        .count();
    let mut text = format!(
        "The investigation ran {} step(s); {} succeeded. No analysis was \
         returned by the reasoning model.",
        session.steps.len(),
        succeeded
    );
    if session.partial {
        text.push_str(" The result is inconclusive.");
    }
    text
}

fn infected_paths(session: &SessionState) -> Vec<String> {
    let mut paths = Vec::new();
    for step in &session.steps {
        if step.tool_name != "scan_file" || step.outcome != StepOutcome::Success {
            continue;
        }
        let Some(result) = &step.result else { continue };
        if !(result.contains("FOUND") || result.contains("INFECTED")) {
            continue;
        }
        if let Some(path) = step.args.get("path").and_then(|v| v.as_str()) {
            if !paths.iter().any(|existing| existing == path) {
                paths.push(path.to_string());
            }
        }
    }
    paths
}

fn remediation_recommendations(session: &SessionState) -> Vec<String> {
    let mut recommendations = Vec::new();
    for path in infected_paths(session) {
        recommendations.push(format!(
            "Quarantine and remove the infected file at {path}, then rescan."
        ));
    }
    match session.problem_type {
        crate::session::ProblemType::SuspiciousPopups => recommendations.push(
            "Review and remove unrecognized browser extensions and notification permissions."
                .to_string(),
        ),
        crate::session::ProblemType::SearchMarquis => recommendations.push(
            "Reset browser search engine and homepage settings and remove unknown launch agents."
                .to_string(),
        ),
        _ => {}
    }
    if session.partial {
        recommendations.push(
            "Re-run the investigation; this session ended before the model signaled completion."
                .to_string(),
        );
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ProblemType, SessionState, StepRecord};
    use serde_json::{Map, Value};

    fn scan_step(index: u32, path: &str, result: &str) -> StepRecord {
        StepRecord {
            step_index: index,
            tool_name: "scan_file".to_string(),
            args: Map::from_iter([("path".to_string(), Value::String(path.to_string()))]),
            started_at: 0,
            ended_at: 1,
            duration_ms: 900,
            outcome: StepOutcome::Success,
            result: Some(result.to_string()),
            error: None,
        }
    }

    #[test]
    fn infected_scan_results_produce_path_remediation() {
        let mut session =
            SessionState::new("s1", "pop-ups everywhere", ProblemType::SuspiciousPopups, 0);
        session.steps.push(scan_step(
            1,
            "/Users/tester/Downloads/installer.dmg",
            "/Users/tester/Downloads/installer.dmg: Adware.OSX.Generic FOUND",
        ));
        let report = build_report(&session);
        assert!(report.contains("Quarantine and remove the infected file at /Users/tester/Downloads/installer.dmg"));
        assert!(report.contains("browser extensions"));
    }

    #[test]
    fn clean_scans_produce_no_path_remediation() {
        let mut session = SessionState::new("s2", "slow machine", ProblemType::General, 0);
        session
            .steps
            .push(scan_step(1, "/tmp/clean.bin", "/tmp/clean.bin: OK"));
        let report = build_report(&session);
        assert!(!report.contains("Quarantine"));
    }

    #[test]
    fn reporting_is_idempotent_over_a_frozen_session() {
        let mut session = SessionState::new("s3", "popups", ProblemType::SuspiciousPopups, 0);
        session.steps.push(scan_step(1, "/tmp/a", "/tmp/a: OK"));
        session.push_turn(Role::Assistant, "Everything looks clean.");
        session.terminated = true;
        let first = build_report(&session);
        let second = build_report(&session);
        assert_eq!(first, second);
        assert!(first.contains("Everything looks clean."));
    }

    #[test]
    fn partial_sessions_are_flagged_inconclusive() {
        let mut session = SessionState::new("s4", "popups", ProblemType::SuspiciousPopups, 0);
        session.partial = true;
        let report = build_report(&session);
        assert!(report.contains("partial"));
        assert!(report.contains("Re-run the investigation"));
    }
}
