use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate tool `{tool}` in registry")]
    DuplicateTool { tool: String },
    #[error("tool `{tool}` declares an empty parameter name")]
    EmptyParameterName { tool: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown tool `{tool}`")]
    UnknownTool { tool: String },
    #[error("unknown argument `{arg}` for tool `{tool}`")]
    UnknownArg { tool: String, arg: String },
    #[error("missing required argument `{arg}` for tool `{tool}`")]
    MissingArg { tool: String, arg: String },
    #[error("argument `{arg}` for tool `{tool}` must be {expected}")]
    InvalidArgType {
        tool: String,
        arg: String,
        expected: String,
    },
}

/// One tool call proposed by the reasoning model, already decoded from its
/// wire shape but not yet validated against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationRequest {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Map<String, Value>,
    pub reasoning_step: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolParamType {
    String,
    Integer,
    Boolean,
}

impl ToolParamType {
    pub(crate) fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }

    fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl std::fmt::Display for ToolParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.json_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolParamSchema {
    #[serde(rename = "type")]
    pub param_type: ToolParamType,
    pub required: bool,
    pub description: String,
}

/// Side-effect class of a tool. Every class is read-only by construction;
/// the registry never carries a write, delete, or execute capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    ReadMetadata,
    ReadContent,
    Scan,
    Enumerate,
}

impl std::fmt::Display for SideEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadMetadata => write!(f, "read_metadata"),
            Self::ReadContent => write!(f, "read_content"),
            Self::Scan => write!(f, "scan"),
            Self::Enumerate => write!(f, "enumerate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: BTreeMap<String, ToolParamSchema>,
    pub side_effect: SideEffect,
}

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// Registry content is fixed at startup; duplicate names are a
    /// configuration error surfaced before any session begins.
    pub fn new(tools: Vec<ToolSpec>) -> Result<Self, RegistryError> {
        let mut seen = std::collections::BTreeSet::new();
        for spec in &tools {
            if !seen.insert(spec.name.clone()) {
                return Err(RegistryError::DuplicateTool {
                    tool: spec.name.clone(),
                });
            }
            if spec.params.keys().any(|name| name.trim().is_empty()) {
                return Err(RegistryError::EmptyParameterName {
                    tool: spec.name.clone(),
                });
            }
        }
        Ok(Self { tools })
    }

    /// Builds the fixed AutoAV catalog, revalidating it the same way a
    /// caller-supplied catalog is validated at startup.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(builtin_tool_specs())
    }

    pub fn list_tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn get_spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|spec| spec.name == name)
    }

    /// Validates a proposed invocation against the declared schema. Rejects
    /// before any adapter is reached; nothing is executed speculatively.
    pub fn validate_invocation(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<(), ValidationError> {
        let spec = self
            .get_spec(&request.tool)
            .ok_or_else(|| ValidationError::UnknownTool {
                tool: request.tool.clone(),
            })?;
        for arg in request.args.keys() {
            if !spec.params.contains_key(arg) {
                return Err(ValidationError::UnknownArg {
                    tool: request.tool.clone(),
                    arg: arg.clone(),
                });
            }
        }
        for (arg, schema) in &spec.params {
            match request.args.get(arg) {
                Some(value) if schema.param_type.matches(value) => {}
                Some(_) => {
                    return Err(ValidationError::InvalidArgType {
                        tool: request.tool.clone(),
                        arg: arg.clone(),
                        expected: schema.param_type.to_string(),
                    })
                }
                None if schema.required => {
                    return Err(ValidationError::MissingArg {
                        tool: request.tool.clone(),
                        arg: arg.clone(),
                    })
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Renders the catalog as OpenAI function-calling tool definitions.
    pub fn chat_tool_definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|spec| {
                let mut properties = serde_json::Map::new();
                let mut required = Vec::new();
                for (param, schema) in &spec.params {
                    properties.insert(
                        param.clone(),
                        json!({
                            "type": schema.param_type.json_type(),
                            "description": schema.description,
                        }),
                    );
                    if schema.required {
                        required.push(Value::String(param.clone()));
                    }
                }
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": {
                            "type": "object",
                            "properties": Value::Object(properties),
                            "required": Value::Array(required),
                        },
                    },
                })
            })
            .collect()
    }
}

fn param(
    name: &str,
    param_type: ToolParamType,
    required: bool,
    description: &str,
) -> (String, ToolParamSchema) {
    (
        name.to_string(),
        ToolParamSchema {
            param_type,
            required,
            description: description.to_string(),
        },
    )
}

fn spec(
    name: &str,
    description: &str,
    side_effect: SideEffect,
    params: Vec<(String, ToolParamSchema)>,
) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        params: params.into_iter().collect(),
        side_effect,
    }
}

pub fn builtin_tool_specs() -> Vec<ToolSpec> {
    vec![
        spec(
            "list_processes",
            "List running processes with command line and owner details",
            SideEffect::Enumerate,
            vec![param(
                "filter",
                ToolParamType::String,
                false,
                "Optional substring filter for process names",
            )],
        ),
        spec(
            "read_file",
            "Read file contents with size limits and validation",
            SideEffect::ReadContent,
            vec![
                param(
                    "path",
                    ToolParamType::String,
                    true,
                    "Absolute file path to read",
                ),
                param(
                    "max_size",
                    ToolParamType::Integer,
                    false,
                    "Maximum file size to read in bytes (default: 10485760)",
                ),
            ],
        ),
        spec(
            "scan_file",
            "Scan a file with the ClamAV antivirus engine",
            SideEffect::Scan,
            vec![param(
                "path",
                ToolParamType::String,
                true,
                "File path to scan",
            )],
        ),
        spec(
            "find_files",
            "Find files matching a glob-style pattern",
            SideEffect::Enumerate,
            vec![
                param(
                    "pattern",
                    ToolParamType::String,
                    true,
                    "File pattern to search for (e.g. '*.plist', '*.app')",
                ),
                param(
                    "directory",
                    ToolParamType::String,
                    false,
                    "Directory to search in (default: user home directory)",
                ),
                param(
                    "max_results",
                    ToolParamType::Integer,
                    false,
                    "Maximum number of results to return (default: 50)",
                ),
            ],
        ),
        spec(
            "get_file_info",
            "Get file metadata: size, permissions, timestamps",
            SideEffect::ReadMetadata,
            vec![param("path", ToolParamType::String, true, "File path")],
        ),
        spec(
            "list_directory",
            "List contents of a directory with file details",
            SideEffect::Enumerate,
            vec![
                param(
                    "path",
                    ToolParamType::String,
                    true,
                    "Directory path to list",
                ),
                param(
                    "show_hidden",
                    ToolParamType::Boolean,
                    false,
                    "Include hidden files (default: false)",
                ),
            ],
        ),
        spec(
            "check_browser_extensions",
            "Enumerate installed browser extensions and settings",
            SideEffect::Enumerate,
            vec![param(
                "browser",
                ToolParamType::String,
                false,
                "Browser to check (chrome, safari, firefox, all)",
            )],
        ),
        spec(
            "check_startup_items",
            "Enumerate startup items and launch agents",
            SideEffect::Enumerate,
            Vec::new(),
        ),
        spec(
            "get_network_connections",
            "List active network connections and owning processes",
            SideEffect::Enumerate,
            vec![param(
                "filter",
                ToolParamType::String,
                false,
                "Optional filter for processes or addresses",
            )],
        ),
    ]
}
