#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Investigate,
    Tools,
    Sessions,
    Setup,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "investigate" => CliVerb::Investigate,
        "tools" => CliVerb::Tools,
        "sessions" => CliVerb::Sessions,
        "setup" => CliVerb::Setup,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  setup                                Initialize settings and state directories"
            .to_string(),
        "  investigate <problem...>             Run an investigation for a described symptom"
            .to_string(),
        "    --non-interactive                  Refuse all escalation prompts".to_string(),
        "    --max-steps <n>                    Override the step ceiling for this run"
            .to_string(),
        "  tools                                List the read-only inspection tool catalog"
            .to_string(),
        "  sessions list                        List recorded investigation sessions".to_string(),
        "  sessions show <session_id>           Print a session's report and step history"
            .to_string(),
        "  sessions export <session_id> [--json|--yaml] [path]".to_string(),
        "                                       Write the full session record to a file"
            .to_string(),
        "  sessions search <query>              Search step logs across all sessions".to_string(),
    ]
}

pub fn help_text() -> String {
    cli_help_lines().join("\n")
}

pub fn run(args: Vec<String>) -> Result<String, String> {
    crate::commands::run_cli(args)
}
