use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{help_text, parse_cli_verb, CliVerb};
use crate::config::{default_settings_path, load_settings, ConfigError, Settings};
use crate::escalation::{DenyAllBroker, EscalationBroker, InteractiveBroker};
use crate::executor::{ExecutorTimeouts, ToolExecutor};
use crate::inspector::builtin_adapters;
use crate::llm::OpenAiChatClient;
use crate::orchestration::{EngineConfig, InvestigationEngine};
use crate::policy::PolicyGuard;
use crate::registry::ToolRegistry;
use crate::session::{SessionState, SessionStore};

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Setup => cmd_setup(),
        CliVerb::Investigate => cmd_investigate(&args[1..]),
        CliVerb::Tools => cmd_tools(),
        CliVerb::Sessions => cmd_sessions(&args[1..]),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}

pub(crate) fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

fn home_dir() -> Result<PathBuf, String> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or_else(|| "HOME is not set".to_string())
}

fn settings_and_store() -> Result<(Settings, SessionStore), String> {
    let path = default_settings_path().map_err(map_config_err)?;
    let settings = load_settings(&path).map_err(map_config_err)?;
    let state_root = settings.resolve_state_root().map_err(map_config_err)?;
    Ok((settings, SessionStore::new(state_root)))
}

fn cmd_setup() -> Result<String, String> {
    let path = default_settings_path().map_err(map_config_err)?;
    let settings = load_settings(&path).map_err(map_config_err)?;
    if !path.exists() {
        settings.save(&path).map_err(map_config_err)?;
    }
    let state_root = settings.resolve_state_root().map_err(map_config_err)?;
    for dir in ["sessions", "logs"] {
        let target = state_root.join(dir);
        fs::create_dir_all(&target)
            .map_err(|e| format!("failed to create {}: {e}", target.display()))?;
    }
    Ok(format!(
        "setup complete\nsettings={}\nstate_root={}",
        path.display(),
        state_root.display()
    ))
}

fn cmd_tools() -> Result<String, String> {
    let registry = ToolRegistry::builtin().map_err(|e| e.to_string())?;
    let mut lines = Vec::new();
    for spec in registry.list_tools() {
        lines.push(format!(
            "{:28} [{}] {}",
            spec.name, spec.side_effect, spec.description
        ));
        for (name, param) in &spec.params {
            let required = if param.required { "required" } else { "optional" };
            lines.push(format!("  --{name} <{}> ({required})", param.param_type));
        }
    }
    Ok(lines.join("\n"))
}

#[derive(Debug)]
struct InvestigateOptions {
    problem: String,
    non_interactive: bool,
    max_steps: Option<u32>,
}

fn parse_investigate_args(args: &[String]) -> Result<InvestigateOptions, String> {
    let mut non_interactive = false;
    let mut max_steps = None;
    let mut words = Vec::new();
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--non-interactive" => {
                non_interactive = true;
                i += 1;
            }
            "--max-steps" => {
                if i + 1 >= args.len() {
                    return Err("missing value for --max-steps".to_string());
                }
                let value: u32 = args[i + 1]
                    .parse()
                    .map_err(|_| "max-steps must be a positive integer".to_string())?;
                if value == 0 {
                    return Err("max-steps must be >= 1".to_string());
                }
                max_steps = Some(value);
                i += 2;
            }
            word => {
                words.push(word.to_string());
                i += 1;
            }
        }
    }
    let problem = words.join(" ");
    if problem.trim().is_empty() {
        return Err("usage: investigate [--non-interactive] [--max-steps <n>] <problem...>"
            .to_string());
    }
    Ok(InvestigateOptions {
        problem,
        non_interactive,
        max_steps,
    })
}

fn cmd_investigate(args: &[String]) -> Result<String, String> {
    let options = parse_investigate_args(args)?;
    let (mut settings, store) = settings_and_store()?;
    if let Some(ceiling) = options.max_steps {
        settings.max_steps = ceiling;
    }
    let home = home_dir()?;

    let registry = ToolRegistry::builtin().map_err(|e| e.to_string())?;
    let policy = PolicyGuard::new(&settings, &home);
    let executor = ToolExecutor::new(
        builtin_adapters(&settings, &home),
        ExecutorTimeouts {
            scan: Duration::from_secs(settings.scan_timeout_seconds),
            default: Duration::from_secs(settings.tool_timeout_seconds),
        },
        settings.max_result_bytes,
    );
    for spec in registry.list_tools() {
        if !executor.has_adapter(&spec.name) {
            return Err(format!("no adapter registered for `{}`", spec.name));
        }
    }
    let model = OpenAiChatClient::from_settings(&settings).map_err(|e| e.to_string())?;
    let broker: Box<dyn EscalationBroker> = if options.non_interactive {
        Box::new(DenyAllBroker)
    } else {
        Box::new(InteractiveBroker)
    };

    let engine = InvestigationEngine::new(
        &registry,
        &policy,
        &executor,
        broker.as_ref(),
        &model,
        Some(&store),
        EngineConfig::from_settings(&settings),
    );
    let session = engine.run(&options.problem).map_err(|e| e.to_string())?;
    let report = session
        .final_report
        .unwrap_or_else(|| "no report produced".to_string());
    Ok(format!("session_id={}\n\n{report}", session.session_id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Json,
    Yaml,
}

impl ExportFormat {
    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }
}

fn parse_export_args(args: &[String]) -> Result<(String, ExportFormat, Option<PathBuf>), String> {
    const USAGE: &str = "usage: sessions export <session_id> [--json|--yaml] [path]";
    let Some(session_id) = args.first() else {
        return Err(USAGE.to_string());
    };
    let mut format = ExportFormat::Json;
    let mut target = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--json" => format = ExportFormat::Json,
            "--yaml" => format = ExportFormat::Yaml,
            other if target.is_none() => target = Some(PathBuf::from(other)),
            _ => return Err(USAGE.to_string()),
        }
    }
    Ok((session_id.clone(), format, target))
}

fn export_session_body(session: &SessionState, format: ExportFormat) -> Result<String, String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(session)
            .map_err(|e| format!("failed to encode session: {e}")),
        ExportFormat::Yaml => {
            serde_yaml::to_string(session).map_err(|e| format!("failed to encode session: {e}"))
        }
    }
}

fn cmd_sessions(args: &[String]) -> Result<String, String> {
    if args.is_empty() {
        return Err("usage: sessions <list|show|export|search> ...".to_string());
    }

    match args[0].as_str() {
        "list" => {
            let (_, store) = settings_and_store()?;
            let sessions = store.list_sessions().map_err(|e| e.to_string())?;
            if sessions.is_empty() {
                return Ok("no sessions".to_string());
            }
            Ok(sessions
                .iter()
                .map(|s| {
                    format!(
                        "{}  modified_at={}  size={}",
                        s.session_id, s.modified_at, s.size_bytes
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "show" => {
            if args.len() != 2 {
                return Err("usage: sessions show <session_id>".to_string());
            }
            let (_, store) = settings_and_store()?;
            let session = store.load_session(&args[1]).map_err(|e| e.to_string())?;
            let mut lines = vec![
                format!("session_id={}", session.session_id),
                format!("problem={}", session.problem_statement),
                format!("problem_type={}", session.problem_type),
                format!("steps={}", session.steps.len()),
                format!("partial={}", session.partial),
            ];
            for step in &session.steps {
                lines.push(format!(
                    "step {} {} outcome={} duration_ms={}",
                    step.step_index, step.tool_name, step.outcome, step.duration_ms
                ));
            }
            if let Some(report) = &session.final_report {
                lines.push(String::new());
                lines.push(report.clone());
            }
            Ok(lines.join("\n"))
        }
        "export" => {
            let (session_id, format, target) = parse_export_args(&args[1..])?;
            let (_, store) = settings_and_store()?;
            let session = store.load_session(&session_id).map_err(|e| e.to_string())?;
            let body = export_session_body(&session, format)?;
            let path = target
                .unwrap_or_else(|| PathBuf::from(format!("{session_id}.{}", format.extension())));
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
                }
            }
            fs::write(&path, body)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
            Ok(format!(
                "exported\nsession_id={session_id}\npath={}",
                path.display()
            ))
        }
        "search" => {
            if args.len() != 2 {
                return Err("usage: sessions search <query>".to_string());
            }
            let (_, store) = settings_and_store()?;
            let results = store.search_sessions(&args[1]).map_err(|e| e.to_string())?;
            if results.is_empty() {
                return Ok("no matches".to_string());
            }
            let mut lines = Vec::new();
            for (session_id, records) in results {
                for record in records {
                    lines.push(format!(
                        "{session_id} step {} {} outcome={}",
                        record.step_index, record.tool_name, record.outcome
                    ));
                }
            }
            Ok(lines.join("\n"))
        }
        other => Err(format!("unknown sessions subcommand `{other}`")),
    }
}
