use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::DEFAULT_MAX_FILE_SIZE_BYTES;
use crate::executor::{AdapterFailure, ToolAdapter};

const DEFAULT_FIND_RESULTS: usize = 50;
const FIND_WALK_LIMIT: usize = 50_000;

fn io_failure(path: &Path, err: std::io::Error) -> AdapterFailure {
    match err.kind() {
        std::io::ErrorKind::NotFound => AdapterFailure::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            AdapterFailure::PermissionDenied(path.display().to_string())
        }
        _ => AdapterFailure::Crashed(format!("{}: {err}", path.display())),
    }
}

fn required_path(args: &Map<String, Value>) -> Result<PathBuf, AdapterFailure> {
    args.get("path")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| AdapterFailure::Crashed("missing `path` argument".to_string()))
}

fn format_timestamp(time: std::io::Result<SystemTime>) -> String {
    time.ok()
        .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `read_file`: bounded content read. The policy guard has already rejected
/// oversized or out-of-scope paths; the bound here protects against files
/// that grow between evaluation and execution.
pub struct ReadFileAdapter;

impl ToolAdapter for ReadFileAdapter {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let path = required_path(args)?;
        let ceiling = args
            .get("max_size")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_FILE_SIZE_BYTES);
        let metadata = fs::metadata(&path).map_err(|err| io_failure(&path, err))?;
        if metadata.len() > ceiling {
            return Err(AdapterFailure::Crashed(format!(
                "{} is {} bytes, over the {ceiling} byte read ceiling",
                path.display(),
                metadata.len()
            )));
        }
        let bytes = fs::read(&path).map_err(|err| io_failure(&path, err))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// `get_file_info`: the metadata-only fallback for oversized or sensitive
/// files.
pub struct FileInfoAdapter;

impl ToolAdapter for FileInfoAdapter {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let path = required_path(args)?;
        let metadata = fs::symlink_metadata(&path).map_err(|err| io_failure(&path, err))?;
        let kind = if metadata.is_dir() {
            "directory"
        } else if metadata.file_type().is_symlink() {
            "symlink"
        } else {
            "file"
        };
        let mut lines = vec![
            format!("path: {}", path.display()),
            format!("type: {kind}"),
            format!("size: {} bytes", metadata.len()),
            format!("modified: {}", format_timestamp(metadata.modified())),
            format!("accessed: {}", format_timestamp(metadata.accessed())),
            format!("readonly: {}", metadata.permissions().readonly()),
        ];
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            lines.push(format!("mode: {:o}", metadata.mode() & 0o7777));
            lines.push(format!("uid: {} gid: {}", metadata.uid(), metadata.gid()));
        }
        Ok(lines.join("\n"))
    }
}

/// `list_directory`: one-level listing with sizes and entry types.
pub struct ListDirectoryAdapter;

impl ToolAdapter for ListDirectoryAdapter {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let path = required_path(args)?;
        let show_hidden = args
            .get("show_hidden")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let entries = fs::read_dir(&path).map_err(|err| io_failure(&path, err))?;
        let mut rows = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_failure(&path, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !show_hidden && name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata().map_err(|err| io_failure(&path, err))?;
            let marker = if metadata.is_dir() { "d" } else { "-" };
            rows.push((name.clone(), format!("{marker} {:>10}  {name}", metadata.len())));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        if rows.is_empty() {
            return Ok(format!("{} is empty", path.display()));
        }
        Ok(rows
            .into_iter()
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// `find_files`: bounded recursive walk with a glob-style name pattern.
pub struct FindFilesAdapter {
    home: PathBuf,
}

impl FindFilesAdapter {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl ToolAdapter for FindFilesAdapter {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let pattern = args
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterFailure::Crashed("missing `pattern` argument".to_string()))?;
        let directory = args
            .get("directory")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.home.clone());
        let max_results = args
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_FIND_RESULTS);

        let mut matches = Vec::new();
        let mut visited = 0_usize;
        walk(&directory, pattern, max_results, &mut visited, &mut matches);
        if matches.is_empty() {
            return Ok(format!(
                "no files matching `{pattern}` under {}",
                directory.display()
            ));
        }
        Ok(matches.join("\n"))
    }
}

fn walk(
    dir: &Path,
    pattern: &str,
    max_results: usize,
    visited: &mut usize,
    matches: &mut Vec<String>,
) {
    if matches.len() >= max_results || *visited >= FIND_WALK_LIMIT {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        // Unreadable directories are skipped, not fatal to the search.
        return;
    };
    for entry in entries.flatten() {
        if matches.len() >= max_results || *visited >= FIND_WALK_LIMIT {
            return;
        }
        *visited += 1;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if wildcard_match(pattern, &name) {
            matches.push(path.display().to_string());
        }
        let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
        if is_dir {
            walk(&path, pattern, max_results, visited, matches);
        }
    }
}

/// Minimal `*`/`?` matcher over file names, enough for the patterns the
/// investigation catalog advertises ('*.plist', '*.app').
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let mut dp = vec![vec![false; name.len() + 1]; pattern.len() + 1];
    dp[0][0] = true;
    for (p, row) in pattern.iter().zip(1..) {
        if *p == '*' {
            dp[row][0] = dp[row - 1][0];
        }
        for n in 1..=name.len() {
            dp[row][n] = match p {
                '*' => dp[row - 1][n] || dp[row][n - 1],
                '?' => dp[row - 1][n - 1],
                ch => dp[row - 1][n - 1] && *ch == name[n - 1],
            };
        }
    }
    dp[pattern.len()][name.len()]
}
