use serde_json::{Map, Value};
use std::time::Duration;

use crate::executor::{AdapterFailure, ToolAdapter};
use crate::inspector::command::run_read_only_command;

fn apply_filter(output: &str, filter: Option<&str>) -> String {
    match filter {
        Some(needle) if !needle.trim().is_empty() => {
            let needle = needle.to_lowercase();
            output
                .lines()
                .enumerate()
                .filter(|(index, line)| *index == 0 || line.to_lowercase().contains(&needle))
                .map(|(_, line)| line)
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => output.to_string(),
    }
}

/// `list_processes`: `ps` snapshot, optionally filtered by a substring.
pub struct ListProcessesAdapter {
    timeout: Duration,
}

impl ListProcessesAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ToolAdapter for ListProcessesAdapter {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let output = run_read_only_command(
            "ps",
            &["axo", "pid,ppid,user,%cpu,%mem,comm,args"],
            self.timeout,
        )?;
        Ok(apply_filter(
            &output,
            args.get("filter").and_then(Value::as_str),
        ))
    }
}

/// `get_network_connections`: `lsof -i` listing of sockets and their owning
/// processes.
pub struct NetworkConnectionsAdapter {
    timeout: Duration,
}

impl NetworkConnectionsAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ToolAdapter for NetworkConnectionsAdapter {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let output = run_read_only_command("lsof", &["-i", "-n", "-P"], self.timeout)?;
        Ok(apply_filter(
            &output,
            args.get("filter").and_then(Value::as_str),
        ))
    }
}
