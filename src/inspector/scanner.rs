use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

use crate::executor::{AdapterFailure, ToolAdapter};
use crate::inspector::command::run_read_only_command;

/// `scan_file`: ClamAV invocation. The engine's detection logic is opaque;
/// this adapter only frames the call and normalizes its exit semantics.
pub struct ClamScanAdapter {
    binary: String,
    timeout: Duration,
}

impl ClamScanAdapter {
    pub fn new(timeout: Duration) -> Self {
        let binary = std::env::var("AUTOAV_CLAMSCAN_BIN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "clamscan".to_string());
        Self { binary, timeout }
    }
}

impl ToolAdapter for ClamScanAdapter {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterFailure::Crashed("missing `path` argument".to_string()))?;
        if !Path::new(path).exists() {
            return Err(AdapterFailure::NotFound(path.to_string()));
        }
        run_read_only_command(
            &self.binary,
            &["--no-summary", "--stdout", path],
            self.timeout,
        )
    }
}
