//! Primary backend: raw completion endpoint.
//!
//! `POST <endpoint>` with `{prompt, context, temperature, max_tokens}`;
//! the reply carries the text under `text`, or `content` as a fallback.

use super::{post_json, system_instruction, task_line, Backend, GenerationRequest};
use crate::config::BackendConfig;
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use tracing::debug;

const NAME: &str = "primary";

pub struct CompletionBackend {
    agent: ureq::Agent,
    endpoint: String,
    system: String,
    temperature: f32,
    max_tokens: u32,
}

impl CompletionBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            endpoint: config.endpoint.clone(),
            system: system_instruction(config.system_prompt.as_deref()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: String,
    context: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: Option<String>,
    content: Option<String>,
}

impl Backend for CompletionBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, BackendError> {
        let body = CompletionRequest {
            prompt: format!("{}\n\n{}", self.system, task_line(request)),
            context: request.context,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!(endpoint = %self.endpoint, method = request.identifier, "completion request");

        let reply: CompletionResponse = post_json(&self.agent, NAME, &self.endpoint, None, &body)?;
        reply
            .text
            .or(reply.content)
            .ok_or_else(|| BackendError::MalformedResponse {
                backend: NAME.to_string(),
                detail: "reply has neither `text` nor `content`".to_string(),
            })
    }
}
