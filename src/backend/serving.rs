//! Secondary backend: model-serving API with generate and chat modes.
//!
//! - completion mode: `POST /api/generate` with `{model, prompt, system, stream:false}`,
//!   reply `{response}`
//! - chat mode: `POST /api/chat` with `{model, messages, stream:false}`,
//!   reply `{message:{content}}`

use super::{compose_prompt, join_url, post_json, system_instruction, Backend, GenerationRequest};
use crate::config::{BackendConfig, InteractionMode};
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use tracing::debug;

const NAME: &str = "secondary";

pub struct ServingBackend {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    system: String,
    mode: InteractionMode,
    api_key: Option<String>,
}

impl ServingBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            system: system_instruction(config.system_prompt.as_deref()),
            mode: config.mode,
            api_key: config.api_key.clone(),
        }
    }

    fn generate_once(&self, request: &GenerationRequest<'_>) -> Result<String, BackendError> {
        let url = join_url(&self.endpoint, "api/generate");
        let body = GenerateRequest {
            model: &self.model,
            prompt: compose_prompt(request),
            system: &self.system,
            stream: false,
        };
        let reply: GenerateResponse =
            post_json(&self.agent, NAME, &url, self.api_key.as_deref(), &body)?;
        Ok(reply.response)
    }

    fn chat(&self, request: &GenerationRequest<'_>) -> Result<String, BackendError> {
        let url = join_url(&self.endpoint, "api/chat");
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: compose_prompt(request),
                },
            ],
            stream: false,
        };
        let reply: ChatResponse =
            post_json(&self.agent, NAME, &url, self.api_key.as_deref(), &body)?;
        Ok(reply.message.content)
    }
}

impl Backend for ServingBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, BackendError> {
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            mode = ?self.mode,
            method = request.identifier,
            "serving request"
        );
        match self.mode {
            InteractionMode::Completion => self.generate_once(request),
            InteractionMode::Chat => self.chat(request),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}
