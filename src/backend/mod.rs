//! Generation backends: one `generate` capability, two wire formats.
//!
//! The backend is chosen from [`BackendConfig::kind`] once per batch and
//! each variant owns its own request/response translation.

pub mod completion;
pub mod serving;

use crate::config::{BackendConfig, BackendKind};
use crate::error::BackendError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Constraint sent with every request, ahead of any configured prompt.
pub const BODY_ONLY_INSTRUCTION: &str = "You generate method bodies. Reply with the statements \
of the method body only, as raw source text. Do not use markdown code fences, do not repeat the \
method signature and do not restate any of the provided source.";

/// One synthesis request.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Flattened directive payload.
    pub prompt: &'a str,
    /// Shared source context of the folder.
    pub context: &'a str,
    /// Name of the method being filled in.
    pub identifier: &'a str,
}

/// A code-generation service.
pub trait Backend: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;
    fn endpoint(&self) -> &str;
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<String, BackendError>;
}

/// Create the backend selected by `config`.
pub fn create_backend(config: &BackendConfig) -> Box<dyn Backend> {
    match config.kind {
        BackendKind::Primary => Box::new(completion::CompletionBackend::new(config)),
        BackendKind::Secondary => Box::new(serving::ServingBackend::new(config)),
    }
}

/// System instruction: the body-only constraint plus optional extra text.
pub fn system_instruction(extra: Option<&str>) -> String {
    match extra {
        Some(extra) => format!("{}\n\n{}", BODY_ONLY_INSTRUCTION, extra.trim()),
        None => BODY_ONLY_INSTRUCTION.to_string(),
    }
}

/// User message for backends that take the context inline.
pub fn compose_prompt(request: &GenerationRequest<'_>) -> String {
    let mut out = String::new();
    if !request.context.trim().is_empty() {
        out.push_str("Source context:\n");
        out.push_str(request.context);
        out.push_str("\n\n");
    }
    out.push_str(&task_line(request));
    out
}

/// The per-task instruction line, shared by both wire formats.
pub(crate) fn task_line(request: &GenerationRequest<'_>) -> String {
    format!(
        "Write the body of method `{}`. Instruction: {}",
        request.identifier, request.prompt
    )
}

/// POST a JSON body and decode the JSON reply, mapping failures onto
/// [`BackendError`].
pub(crate) fn post_json<B, R>(
    agent: &ureq::Agent,
    backend: &str,
    url: &str,
    bearer: Option<&str>,
    body: &B,
) -> Result<R, BackendError>
where
    B: Serialize,
    R: DeserializeOwned,
{
    let mut request = agent.post(url).set("Content-Type", "application/json");
    if let Some(token) = bearer {
        request = request.set("Authorization", &format!("Bearer {token}"));
    }

    match request.send_json(body) {
        Ok(response) => response
            .into_json::<R>()
            .map_err(|e| BackendError::MalformedResponse {
                backend: backend.to_string(),
                detail: e.to_string(),
            }),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(BackendError::Api {
                backend: backend.to_string(),
                status,
                detail: error_detail(&body),
            })
        }
        Err(ureq::Error::Transport(transport)) => Err(BackendError::Unreachable {
            backend: backend.to_string(),
            endpoint: url.to_string(),
            detail: transport.to_string(),
        }),
    }
}

/// Pull `error` / `error.message` / `message` out of an error body, else the raw text.
fn error_detail(body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let candidate = v
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .or_else(|| v.get("message"))?;
            candidate.as_str().map(str::to_string)
        });
    match detail {
        Some(d) => d,
        None if body.trim().is_empty() => "no details".to_string(),
        None => body.trim().to_string(),
    }
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn request<'a>(context: &'a str) -> GenerationRequest<'a> {
        GenerationRequest {
            prompt: "return true if n is even",
            context,
            identifier: "isEven",
        }
    }

    #[test]
    fn factory_selects_by_kind() {
        let mut config = Settings::default().backend;
        assert_eq!(create_backend(&config).name(), "secondary");
        config.kind = BackendKind::Primary;
        config.endpoint = "http://localhost:5000/generate".into();
        let backend = create_backend(&config);
        assert_eq!(backend.name(), "primary");
        assert_eq!(backend.endpoint(), "http://localhost:5000/generate");
    }

    #[test]
    fn system_instruction_always_has_constraint() {
        assert_eq!(system_instruction(None), BODY_ONLY_INSTRUCTION);
        let with_extra = system_instruction(Some("Use Java 17. "));
        assert!(with_extra.starts_with(BODY_ONLY_INSTRUCTION));
        assert!(with_extra.ends_with("Use Java 17."));
    }

    #[test]
    fn prompt_includes_context_only_when_present() {
        let with = compose_prompt(&request("class A {}"));
        assert!(with.starts_with("Source context:\nclass A {}"));
        assert!(with.contains("`isEven`"));
        assert!(with.ends_with("return true if n is even"));

        let without = compose_prompt(&request("  "));
        assert!(!without.contains("Source context"));
    }

    #[test]
    fn error_detail_prefers_structured_message() {
        assert_eq!(error_detail(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(error_detail(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(error_detail("gateway timeout\n"), "gateway timeout");
        assert_eq!(error_detail(""), "no details");
    }

    #[test]
    fn url_join() {
        assert_eq!(join_url("http://h:1/", "/api/chat"), "http://h:1/api/chat");
        assert_eq!(join_url("http://h:1", "api/generate"), "http://h:1/api/generate");
    }
}
