use serde::Deserialize;
use serde_json::Value;

use crate::llm::{ModelError, ModelTurn};
use crate::registry::ToolInvocationRequest;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub(crate) choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatChoice {
    pub(crate) message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatResponseMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireToolCall {
    pub(crate) function: WireFunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireFunctionCall {
    pub(crate) name: String,
    /// JSON-encoded argument object, per the chat-completions wire format.
    #[serde(default)]
    pub(crate) arguments: String,
}

/// Strict decode of a chat-completion body into a model turn. Anything that
/// does not match the invocation shape fails here; nothing is guessed at or
/// executed speculatively.
pub fn decode_model_turn(raw: &str, reasoning_step: u32) -> Result<ModelTurn, ModelError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(raw).map_err(|err| ModelError::Decode(err.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Decode("response carried no choices".to_string()))?;

    if choice.message.tool_calls.is_empty() {
        let analysis = choice.message.content.unwrap_or_default();
        return Ok(ModelTurn::Completion(analysis));
    }

    let mut requests = Vec::with_capacity(choice.message.tool_calls.len());
    for call in choice.message.tool_calls {
        let arguments: Value = if call.function.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&call.function.arguments).map_err(|err| {
                ModelError::Decode(format!(
                    "arguments for `{}` are not valid json: {err}",
                    call.function.name
                ))
            })?
        };
        let Value::Object(args) = arguments else {
            return Err(ModelError::Decode(format!(
                "arguments for `{}` must be a json object",
                call.function.name
            )));
        };
        requests.push(ToolInvocationRequest {
            tool: call.function.name,
            args,
            reasoning_step,
        });
    }
    Ok(ModelTurn::ToolCalls(requests))
}
