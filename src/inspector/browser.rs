use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::executor::{AdapterFailure, ToolAdapter};

fn enumerate_dir(root: &Path, label: &str, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    if names.is_empty() {
        return;
    }
    out.push(format!("{label} ({}):", root.display()));
    for name in names {
        out.push(format!("  {name}"));
    }
}

/// `check_browser_extensions`: enumerates installed extension directories
/// for the browsers AutoAV knows about. Candidate locations cover both the
/// macOS and Linux profile layouts; absent ones are silently skipped.
pub struct BrowserExtensionsAdapter {
    home: PathBuf,
}

impl BrowserExtensionsAdapter {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn candidates(&self, browser: &str) -> Vec<(PathBuf, &'static str)> {
        let mut out = Vec::new();
        if matches!(browser, "chrome" | "all") {
            out.push((
                self.home
                    .join("Library/Application Support/Google/Chrome/Default/Extensions"),
                "chrome extensions",
            ));
            out.push((
                self.home.join(".config/google-chrome/Default/Extensions"),
                "chrome extensions",
            ));
        }
        if matches!(browser, "safari" | "all") {
            out.push((
                self.home.join("Library/Safari/Extensions"),
                "safari extensions",
            ));
        }
        if matches!(browser, "firefox" | "all") {
            out.push((
                self.home.join("Library/Application Support/Firefox/Profiles"),
                "firefox profiles",
            ));
            out.push((self.home.join(".mozilla/firefox"), "firefox profiles"));
        }
        out
    }
}

impl ToolAdapter for BrowserExtensionsAdapter {
    fn invoke(&self, args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let browser = args
            .get("browser")
            .and_then(Value::as_str)
            .unwrap_or("all")
            .to_lowercase();
        if !matches!(browser.as_str(), "chrome" | "safari" | "firefox" | "all") {
            return Err(AdapterFailure::Crashed(format!(
                "unknown browser `{browser}`; expected chrome, safari, firefox, or all"
            )));
        }
        let mut out = Vec::new();
        for (root, label) in self.candidates(&browser) {
            enumerate_dir(&root, label, &mut out);
        }
        if out.is_empty() {
            return Ok(format!("no {browser} extension directories found"));
        }
        Ok(out.join("\n"))
    }
}

/// `check_startup_items`: launch agents, daemons, and autostart entries.
pub struct StartupItemsAdapter {
    home: PathBuf,
}

impl StartupItemsAdapter {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl ToolAdapter for StartupItemsAdapter {
    fn invoke(&self, _args: &Map<String, Value>) -> Result<String, AdapterFailure> {
        let candidates = [
            (self.home.join("Library/LaunchAgents"), "user launch agents"),
            (
                PathBuf::from("/Library/LaunchAgents"),
                "system launch agents",
            ),
            (
                PathBuf::from("/Library/LaunchDaemons"),
                "system launch daemons",
            ),
            (self.home.join(".config/autostart"), "autostart entries"),
            (PathBuf::from("/etc/xdg/autostart"), "autostart entries"),
        ];
        let mut out = Vec::new();
        for (root, label) in candidates {
            enumerate_dir(&root, label, &mut out);
        }
        if out.is_empty() {
            return Ok("no startup item directories found".to_string());
        }
        Ok(out.join("\n"))
    }
}
