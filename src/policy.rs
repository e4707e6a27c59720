use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::Settings;
use crate::registry::{SideEffect, ToolInvocationRequest, ToolSpec};

/// Computed per request and embedded in the resulting step record; never
/// persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub allowed: bool,
    pub requires_escalation: bool,
    #[serde(default)]
    pub denial_reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            requires_escalation: false,
            denial_reason: None,
        }
    }

    pub fn escalate() -> Self {
        Self {
            allowed: true,
            requires_escalation: true,
            denial_reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_escalation: false,
            denial_reason: Some(reason.into()),
        }
    }
}

/// Stateless scope and size rules, applied in order with first match winning.
/// Mutating capability checks are structural: the registry never exposes a
/// write, delete, or execute tool, so no runtime rule is needed for them.
#[derive(Debug, Clone)]
pub struct PolicyGuard {
    allow_roots: Vec<PathBuf>,
    deny_roots: Vec<PathBuf>,
    max_file_size_bytes: u64,
    home: PathBuf,
}

impl PolicyGuard {
    pub fn new(settings: &Settings, home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let mut allow_roots = settings.allow_roots.clone();
        if !allow_roots.contains(&home) {
            allow_roots.push(home.clone());
        }
        Self {
            allow_roots,
            deny_roots: settings.deny_roots.clone(),
            max_file_size_bytes: settings.max_file_size_bytes,
            home,
        }
    }

    pub fn evaluate(&self, request: &ToolInvocationRequest, spec: &ToolSpec) -> PolicyDecision {
        if spec.side_effect != SideEffect::ReadContent {
            return PolicyDecision::allow();
        }

        let Some(path) = request.args.get("path").and_then(Value::as_str) else {
            // Missing path is a validation concern; content rules need one.
            return PolicyDecision::deny("read-content request has no path");
        };
        let resolved = self.resolve(path);

        if self.is_denied_root(&resolved) || !self.is_allowed_root(&resolved) {
            return PolicyDecision::escalate();
        }

        let declared = request
            .args
            .get("max_size")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let discovered = fs::metadata(&resolved).map(|meta| meta.len()).unwrap_or(0);
        if declared.max(discovered) > self.max_file_size_bytes {
            return PolicyDecision::deny("file too large");
        }

        PolicyDecision::allow()
    }

    /// Lexical resolution only: the path may not exist yet, and symlink
    /// canonicalization would itself read protected metadata.
    fn resolve(&self, raw: &str) -> PathBuf {
        let candidate = Path::new(raw);
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.home.join(candidate)
        };
        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        normalized
    }

    fn is_allowed_root(&self, path: &Path) -> bool {
        self.allow_roots.iter().any(|root| path.starts_with(root))
    }

    fn is_denied_root(&self, path: &Path) -> bool {
        self.deny_roots.iter().any(|root| path.starts_with(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;
    use serde_json::Map;

    fn guard() -> PolicyGuard {
        PolicyGuard::new(&Settings::default(), "/Users/tester")
    }

    fn read_request(path: &str) -> ToolInvocationRequest {
        ToolInvocationRequest {
            tool: "read_file".to_string(),
            args: Map::from_iter([("path".to_string(), Value::String(path.to_string()))]),
            reasoning_step: 1,
        }
    }

    fn read_spec() -> ToolSpec {
        ToolRegistry::builtin()
            .expect("catalog")
            .get_spec("read_file")
            .expect("read_file")
            .clone()
    }

    #[test]
    fn enumerate_tools_are_always_allowed() {
        let registry = ToolRegistry::builtin().expect("catalog");
        let spec = registry.get_spec("list_processes").expect("spec");
        let request = ToolInvocationRequest {
            tool: "list_processes".to_string(),
            args: Map::new(),
            reasoning_step: 1,
        };
        assert_eq!(guard().evaluate(&request, spec), PolicyDecision::allow());
    }

    #[test]
    fn deny_root_read_requires_escalation() {
        let decision = guard().evaluate(&read_request("/System/launchd.plist"), &read_spec());
        assert!(decision.requires_escalation);
        assert!(decision.allowed);
    }

    #[test]
    fn path_outside_allow_roots_requires_escalation() {
        let decision = guard().evaluate(&read_request("/etc/passwd"), &read_spec());
        assert!(decision.requires_escalation);
    }

    #[test]
    fn parent_traversal_cannot_escape_a_deny_root_check() {
        let decision =
            guard().evaluate(&read_request("/Users/tester/../../System/x"), &read_spec());
        assert!(decision.requires_escalation);
    }

    #[test]
    fn declared_oversize_read_is_denied_as_file_too_large() {
        let mut request = read_request("/Users/tester/huge.bin");
        request.args.insert(
            "max_size".to_string(),
            Value::from(15_000_000_u64),
        );
        let decision = guard().evaluate(&request, &read_spec());
        assert_eq!(decision, PolicyDecision::deny("file too large"));
    }

    #[test]
    fn discovered_oversize_read_is_denied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("large.bin");
        std::fs::write(&path, vec![0_u8; 2048]).expect("write");

        let mut settings = Settings::default();
        settings.allow_roots.push(dir.path().to_path_buf());
        settings.max_file_size_bytes = 1024;
        let guard = PolicyGuard::new(&settings, "/Users/tester");

        let decision = guard.evaluate(
            &read_request(path.to_str().expect("utf8 path")),
            &read_spec(),
        );
        assert_eq!(decision, PolicyDecision::deny("file too large"));
    }

    #[test]
    fn in_scope_small_read_is_allowed_without_escalation() {
        let decision = guard().evaluate(
            &read_request("/Users/tester/Library/item.plist"),
            &read_spec(),
        );
        assert_eq!(decision, PolicyDecision::allow());
    }

    #[test]
    fn relative_paths_resolve_against_home() {
        let decision = guard().evaluate(&read_request("Downloads/installer.dmg"), &read_spec());
        assert_eq!(decision, PolicyDecision::allow());
    }
}
