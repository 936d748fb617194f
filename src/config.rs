//! Configuration: `promptfill.toml`, command-line overrides, defaults.
//!
//! The file is read once per batch and resolved into a [`Settings`] value
//! that is passed explicitly to the backend factory and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the processed folder.
pub const CONFIG_FILE_NAME: &str = "promptfill.toml";

pub const DEFAULT_PRIMARY_ENDPOINT: &str = "http://localhost:5000/generate";
pub const DEFAULT_SECONDARY_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "codellama";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_EXTENSION: &str = "java";
pub const DEFAULT_LANGUAGE: &str = "java";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Raw completion endpoint: `{prompt, context, temperature, max_tokens}`.
    Primary,
    /// Model-serving endpoint with `/api/generate` and `/api/chat`.
    #[default]
    Secondary,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Primary => "primary",
            BackendKind::Secondary => "secondary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Single prompt in, text out.
    Completion,
    /// System + user messages.
    #[default]
    Chat,
}

/// Everything a backend needs, resolved for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub endpoint: String,
    pub model: String,
    /// Extra instructions appended after the body-only constraint.
    pub system_prompt: Option<String>,
    pub mode: InteractionMode,
    /// Bearer credential, only sent by the secondary backend.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: BackendConfig,
    /// Recognized source extension, without the dot.
    pub extension: String,
    /// Language tag written into model-file implementation blocks.
    pub language: String,
}

// -- File shape ---------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub backend: BackendSection,
    pub source: SourceSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSection {
    pub kind: Option<BackendKind>,
    pub mode: Option<InteractionMode>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub primary: PrimarySection,
    pub secondary: SecondarySection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrimarySection {
    pub endpoint: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecondarySection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    pub extension: Option<String>,
    pub language: Option<String>,
}

/// Command-line values that win over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub kind: Option<BackendKind>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub mode: Option<InteractionMode>,
    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
    pub extension: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `explicit` if given, else `promptfill.toml` in `folder`, else defaults.
    pub fn discover(explicit: Option<&Path>, folder: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = folder.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn resolve(self, overrides: Overrides) -> Settings {
        let backend = self.backend;
        let kind = overrides.kind.or(backend.kind).unwrap_or_default();
        let file_endpoint = match kind {
            BackendKind::Primary => backend.primary.endpoint,
            BackendKind::Secondary => backend.secondary.endpoint,
        };
        let default_endpoint = match kind {
            BackendKind::Primary => DEFAULT_PRIMARY_ENDPOINT,
            BackendKind::Secondary => DEFAULT_SECONDARY_ENDPOINT,
        };
        let system_prompt = overrides
            .system_prompt
            .or(backend.system_prompt)
            .filter(|s| !s.trim().is_empty());

        Settings {
            backend: BackendConfig {
                kind,
                endpoint: overrides
                    .endpoint
                    .or(file_endpoint)
                    .unwrap_or_else(|| default_endpoint.to_string()),
                model: overrides
                    .model
                    .or(backend.model)
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                system_prompt,
                mode: overrides.mode.or(backend.mode).unwrap_or_default(),
                api_key: overrides.api_key.or(backend.secondary.api_key),
                temperature: backend.primary.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_tokens: backend.primary.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            },
            extension: overrides
                .extension
                .or(self.source.extension)
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            language: self
                .source
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        ConfigFile::default().resolve(Overrides::default())
    }
}
