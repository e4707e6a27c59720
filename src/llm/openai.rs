use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Settings;
use crate::llm::decode::decode_model_turn;
use crate::llm::{ModelError, ModelTurn, ReasoningModel};
use crate::registry::ToolRegistry;
use crate::session::{Role, TranscriptTurn};

const SYSTEM_PROMPT: &str = "You are a security investigator. The user suspects \
malware on this machine. Use the available read-only inspection tools to \
investigate step by step. When the investigation is complete, reply without \
tool calls and give your analysis plus ordered remediation recommendations.";

/// OpenAI-compatible chat-completions client. Treated as an opaque remote
/// call with its own timeout surface; one HTTP request per reasoning turn.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    api_base: String,
    api_key: String,
    model: String,
    request_timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            request_timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ModelError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ModelError::MissingApiKey {
                env: settings.api_key_env.clone(),
            })?;
        Ok(Self::new(
            settings.api_base.clone(),
            api_key,
            settings.model.clone(),
            Duration::from_secs(settings.request_timeout_seconds),
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn request_body(&self, transcript: &[TranscriptTurn], registry: &ToolRegistry) -> Value {
        let mut messages = vec![json!({"role": "system", "content": SYSTEM_PROMPT})];
        for turn in transcript {
            // Tool outcomes travel as user turns: the transcript does not
            // track provider tool-call ids, only role-tagged text.
            let role = match turn.role {
                Role::System => "system",
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": turn.content}));
        }
        json!({
            "model": self.model,
            "messages": messages,
            "tools": registry.chat_tool_definitions(),
            "tool_choice": "auto",
            "temperature": 0.1,
            "n": 1,
        })
    }
}

impl ReasoningModel for OpenAiChatClient {
    fn next_turn(
        &self,
        transcript: &[TranscriptTurn],
        registry: &ToolRegistry,
        reasoning_step: u32,
    ) -> Result<ModelTurn, ModelError> {
        let body = self.request_body(transcript, registry);
        let response = ureq::post(&self.endpoint())
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .timeout(self.request_timeout)
            .send_json(body)
            .map_err(|err| match err {
                ureq::Error::Status(status, response) => ModelError::Api {
                    status,
                    detail: response
                        .into_string()
                        .unwrap_or_else(|_| "unreadable error body".to_string()),
                },
                ureq::Error::Transport(transport) => {
                    let detail = transport.to_string();
                    if detail.to_lowercase().contains("timed out") {
                        ModelError::Timeout {
                            timeout_ms: self.request_timeout.as_millis() as u64,
                        }
                    } else {
                        ModelError::Transport(detail)
                    }
                }
            })?;

        let raw = response
            .into_string()
            .map_err(|err| ModelError::Transport(err.to_string()))?;
        decode_model_turn(&raw, reasoning_step)
    }
}
