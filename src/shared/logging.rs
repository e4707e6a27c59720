use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn investigation_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/autoav.log")
}

pub fn append_investigation_log_line(state_root: &Path, line: &str) -> std::io::Result<()> {
    let path = investigation_log_path(state_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "{line}")
}
