//! External model inserter: copy a generated fragment into a `.cdiag` model.
//!
//! Model files declare operations as
//!
//! ```text
//! compute(x: int): int { spec "doubles x" }
//! ```
//!
//! and an implementation block `impl <language> << <fragment> >>` is written
//! right after the `spec` clause's closing quote, or after the opening brace
//! when the operation has no `spec` clause.

use crate::model::SignatureSpec;
use crate::scanner;
use crate::signature::{self, Declaration};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Extension of structured model files.
pub const MODEL_EXTENSION: &str = "cdiag";

/// Text placed between the match point and the implementation block.
const BLOCK_LEAD: &str = "\n     ";

/// Optional return type, body brace and optional `spec "..."` clause.
const BODY_TAIL: &str = r#"\s*(?::\s*[^{};]+?)?\s*\{(?:\s*spec\s*"(?:[^"\\]|\\.)*")?"#;

#[derive(Debug, Error)]
pub enum DiagramError {
    #[error("method '{0}' not found in the model file")]
    MethodNotFound(String),

    #[error("method '{0}' not found in the source file")]
    SourceMethodNotFound(String),

    #[error("markers '// generated start/end' not found in method '{0}'")]
    MarkersNotFound(String),

    #[error("no method with a generated region in {0}")]
    NoRegions(PathBuf),

    #[error("several methods have generated regions ({0}); pick one with --method")]
    AmbiguousMethod(String),

    #[error("no .cdiag file found under {0}")]
    NoModelFile(PathBuf),

    #[error("invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of an insertion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    Inserted(String),
    NotFound,
}

/// Code taken from a method's generated region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub method_name: String,
    pub signature: Option<SignatureSpec>,
    pub code: String,
}

/// Insert `impl <language> << <fragment> >>` after the matching operation.
///
/// The signature-shaped pattern (name plus display-notation parameters) is
/// tried first, then the bare name with any parameter list.
pub fn insert_implementation(
    fragment: &str,
    method_name: &str,
    signature: Option<&SignatureSpec>,
    target: &str,
    language: &str,
) -> Insertion {
    let name = bare_name(method_name);
    let mut patterns = Vec::new();
    if let Some(spec) = signature {
        patterns.push(signature_pattern(name, spec));
    }
    patterns.push(format!(r"\b{}\s*\([^)]*\){}", regex::escape(name), BODY_TAIL));

    for pattern in patterns {
        let Ok(re) = Regex::new(&pattern) else {
            debug!(%pattern, "skipping unusable pattern");
            continue;
        };
        if let Some(m) = re.find(target) {
            let block = format!("{BLOCK_LEAD}impl {language} << {fragment} >>");
            let mut out = String::with_capacity(target.len() + block.len());
            out.push_str(&target[..m.end()]);
            out.push_str(&block);
            out.push_str(&target[m.end()..]);
            return Insertion::Inserted(out);
        }
    }
    Insertion::NotFound
}

/// `name\s*\(\s*x\s*:\s*int\s*,\s*...\)` plus the body tail.
fn signature_pattern(name: &str, spec: &SignatureSpec) -> String {
    let params = spec
        .parameters
        .iter()
        .map(|p| flexible(&signature::display_params(std::slice::from_ref(p))))
        .collect::<Vec<_>>()
        .join(r"\s*,\s*");
    format!(r"\b{}\s*\(\s*{}\s*\){}", regex::escape(name), params, BODY_TAIL)
}

/// Escape `text` and let whitespace around punctuation vary.
fn flexible(text: &str) -> String {
    let mut out = String::new();
    let mut gap = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            gap = true;
            continue;
        }
        if gap {
            out.push_str(r"\s*");
            gap = false;
        }
        let escaped = regex::escape(ch.encode_utf8(&mut [0; 4]));
        if matches!(ch, ':' | ',' | '<' | '>' | '=' | '[' | ']') {
            out.push_str(r"\s*");
            out.push_str(&escaped);
            out.push_str(r"\s*");
        } else {
            out.push_str(&escaped);
        }
    }
    out
}

/// Strip a `(...)` suffix some symbol providers append to method names.
fn bare_name(method_name: &str) -> &str {
    method_name.split('(').next().unwrap_or(method_name).trim()
}

/// Names of methods that enclose a `generated start` marker, in order.
///
/// The enclosing method is the nearest declaration before the marker.
pub fn methods_with_regions(source: &str) -> Vec<String> {
    let decls = signature::declarations(source);
    let mut names: Vec<String> = Vec::new();
    for marker in scanner::start_markers(source) {
        if let Some(decl) = decls.iter().rev().find(|d| d.end <= marker.start) {
            if !names.contains(&decl.name) {
                names.push(decl.name.clone());
            }
        }
    }
    names
}

/// Pull the trimmed content of a method's generated region.
pub fn extract_fragment(source: &str, method_name: &str) -> Result<Fragment, DiagramError> {
    let name = bare_name(method_name);
    let decls = signature::declarations(source);
    let (index, decl) = decls
        .iter()
        .enumerate()
        .find(|(_, d)| d.name == name)
        .ok_or_else(|| DiagramError::SourceMethodNotFound(name.to_string()))?;

    // Both delimiters must lie before the next method starts.
    let limit = decls.get(index + 1).map_or(source.len(), |d: &Declaration| d.start);
    let start = scanner::find_start_marker(source, decl.end)
        .filter(|m| m.end <= limit)
        .ok_or_else(|| DiagramError::MarkersNotFound(name.to_string()))?;
    let end = scanner::find_end_marker(source, start.end)
        .filter(|m| m.end <= limit)
        .ok_or_else(|| DiagramError::MarkersNotFound(name.to_string()))?;

    Ok(Fragment {
        method_name: name.to_string(),
        signature: signature::extract_signature(&decl.text),
        code: source[start.end..end.start].trim().to_string(),
    })
}

/// First `*.cdiag` under `root`, in path order.
pub fn find_model_file(root: &Path) -> Result<PathBuf, DiagramError> {
    let pattern = root.join("**").join(format!("*.{MODEL_EXTENSION}"));
    let mut matches: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    matches.sort();
    matches
        .into_iter()
        .next()
        .ok_or_else(|| DiagramError::NoModelFile(root.to_path_buf()))
}

/// Pick the method to export: the given one, or the only method with a region.
pub fn choose_method(source_path: &Path, source: &str, method: Option<&str>) -> Result<String, DiagramError> {
    if let Some(method) = method {
        return Ok(bare_name(method).to_string());
    }
    let mut names = methods_with_regions(source);
    match names.len() {
        0 => Err(DiagramError::NoRegions(source_path.to_path_buf())),
        1 => Ok(names.remove(0)),
        _ => Err(DiagramError::AmbiguousMethod(names.join(", "))),
    }
}

/// Extract `method` from `source_path` and write it into `model_path`.
///
/// The model file is left untouched when the operation is not found.
pub fn export_to_model(
    source_path: &Path,
    method: &str,
    model_path: &Path,
    language: &str,
) -> Result<(), DiagramError> {
    let source = read(source_path)?;
    let fragment = extract_fragment(&source, method)?;
    let model = read(model_path)?;

    match insert_implementation(
        &fragment.code,
        &fragment.method_name,
        fragment.signature.as_ref(),
        &model,
        language,
    ) {
        Insertion::Inserted(updated) => {
            fs::write(model_path, updated).map_err(|source| DiagramError::Io {
                path: model_path.to_path_buf(),
                source,
            })?;
            info!(method = %fragment.method_name, model = %model_path.display(), "implementation inserted");
            Ok(())
        }
        Insertion::NotFound => Err(DiagramError::MethodNotFound(fragment.method_name)),
    }
}

fn read(path: &Path) -> Result<String, DiagramError> {
    fs::read_to_string(path).map_err(|source| DiagramError::Io {
        path: path.to_path_buf(),
        source,
    })
}
