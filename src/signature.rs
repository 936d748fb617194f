//! Lightweight method signature matcher.
//!
//! Recognizes Java-style declaration heads without a grammar:
//!
//! ```text
//! [@Annotation] [modifiers] [<T>] ReturnType name(TYPE NAME, ...) [throws X] {
//! ```
//!
//! and converts parameter lists between declaration notation (`int x`) and
//! the display notation used by structured model files (`x: int`).

use crate::model::{Parameter, SignatureSpec};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

const MODIFIERS: &[&str] = &[
    "public",
    "protected",
    "private",
    "static",
    "final",
    "abstract",
    "synchronized",
    "native",
    "default",
    "strictfp",
];

/// Words that the head pattern can mistake for a return type or a name.
const NOT_A_METHOD: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "catch", "try", "return", "new", "throw", "case",
];

/// Declaration head, shared by the forward search and the anchored parse.
/// Groups: 1 modifiers, 2 type parameters, 3 return type, 4 name, 5 params, 6 throws.
const HEAD: &str = concat!(
    r"(?:@[\w.]+(?:\([^)]*\))?\s+)*",
    r"((?:(?:public|protected|private|static|final|abstract|synchronized|native|default|strictfp)\s+)*)",
    r"(?:<([^<>]*(?:<[^<>]*>[^<>]*)*)>\s+)?",
    r"([\w.$]+(?:\s*<[^(){};=]*?>)?(?:\s*\[\s*\])*)\s+",
    r"(\w+)\s*\(([^)]*)\)\s*",
    r"(?:throws\s+([\w.$]+(?:\s*,\s*[\w.$]+)*)\s*)?\{",
);

static RE_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?m)^[ \t]*{HEAD}")).unwrap());

static RE_SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\A\s*{HEAD}")).unwrap());

static RE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A(.+?)\s+(\w+)\s*(?:=\s*(.+?))?\z").unwrap());

static RE_DISPLAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A\s*(\w+)\s*\(([^)]*)\)\s*(?::\s*(.+?))?\s*\z").unwrap());

static RE_DISPLAY_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A(\w+)\s*:\s*(.+?)(?:\s*=\s*(.+?))?\z").unwrap());

static RE_LEADING_FINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A(?:final\s+|@[\w.]+\s+)+").unwrap());

/// A method declaration located in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    /// Declaration head up to and including the opening brace.
    pub text: String,
    /// Byte offset of the head (after leading indentation).
    pub start: usize,
    /// Byte offset just past the opening brace.
    pub end: usize,
}

/// All method declarations in `text`, in document order.
pub fn declarations(text: &str) -> Vec<Declaration> {
    declarations_from(text, 0)
}

/// Method declarations starting at or after `from`.
pub fn declarations_from(text: &str, from: usize) -> Vec<Declaration> {
    let Some(haystack) = text.get(from..) else {
        return Vec::new();
    };
    RE_DECLARATION
        .captures_iter(haystack)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let ret = caps.get(3)?.as_str();
            let name = caps.get(4)?.as_str();
            if NOT_A_METHOD.contains(&ret) || NOT_A_METHOD.contains(&name) {
                return None;
            }
            let head = whole.as_str();
            let offset = head.len() - head.trim_start().len();
            Some(Declaration {
                name: name.to_string(),
                text: head.trim().to_string(),
                start: from + whole.start() + offset,
                end: from + whole.end(),
            })
        })
        .collect()
}

/// The first declaration at or after `from`.
///
/// This is the "nearest following declaration" rule: there is no scope or
/// brace-depth check, so a directive placed above a nested type associates
/// with whatever method head comes next.
pub fn next_declaration(text: &str, from: usize) -> Option<Declaration> {
    declarations_from(text, from).into_iter().next()
}

/// Parse a declaration head into a [`SignatureSpec`].
///
/// Returns `None` when the head does not look like a method declaration;
/// callers treat that as "no signature information".
pub fn extract_signature(declaration: &str) -> Option<SignatureSpec> {
    let caps = RE_SIGNATURE.captures(declaration)?;
    let name = caps.get(4)?.as_str();
    let ret = caps.get(3)?.as_str();
    if NOT_A_METHOD.contains(&name) || NOT_A_METHOD.contains(&ret) {
        return None;
    }
    // Constructors have no return type; the modifier is picked up in its place.
    let return_type = if MODIFIERS.contains(&ret) {
        String::new()
    } else {
        collapse_whitespace(ret)
    };
    Some(SignatureSpec {
        name: name.to_string(),
        parameters: parse_declaration_params(caps.get(5).map_or("", |m| m.as_str())),
        return_type,
    })
}

/// Convert a declaration head to display notation, or hand the input back
/// unchanged when it cannot be parsed.
pub fn to_display_notation(declaration: &str) -> Cow<'_, str> {
    match extract_signature(declaration) {
        Some(spec) => Cow::Owned(display(&spec)),
        None => Cow::Borrowed(declaration),
    }
}

/// Split a declaration parameter list and convert each `TYPE NAME [= v]`.
pub fn parse_declaration_params(list: &str) -> Vec<Parameter> {
    split_params(list)
        .into_iter()
        .map(|raw| {
            let stripped = RE_LEADING_FINAL.replace(raw, "");
            match RE_PARAM.captures(&stripped) {
                Some(caps) => Parameter::Typed {
                    name: caps[2].to_string(),
                    ty: collapse_whitespace(&caps[1]),
                    default: caps.get(3).map(|m| m.as_str().to_string()),
                },
                None => Parameter::Raw(raw.to_string()),
            }
        })
        .collect()
}

/// `compute(x: int, y: String): int`; the return type is omitted for `void` and constructors.
pub fn display(spec: &SignatureSpec) -> String {
    let mut out = format!("{}({})", spec.name, display_params(&spec.parameters));
    if !spec.return_type.is_empty() && spec.return_type != "void" {
        out.push_str(": ");
        out.push_str(&spec.return_type);
    }
    out
}

/// `x: int, y: String`
pub fn display_params(params: &[Parameter]) -> String {
    params
        .iter()
        .map(|p| match p {
            Parameter::Typed { name, ty, default } => match default {
                Some(value) => format!("{name}: {ty} = {value}"),
                None => format!("{name}: {ty}"),
            },
            Parameter::Raw(raw) => raw.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse display notation (`compute(x: int): int`) back into a signature.
pub fn parse_display(text: &str) -> Option<SignatureSpec> {
    let caps = RE_DISPLAY.captures(text)?;
    let parameters = split_params(&caps[2])
        .into_iter()
        .map(|raw| match RE_DISPLAY_PARAM.captures(raw) {
            Some(p) => Parameter::Typed {
                name: p[1].to_string(),
                ty: collapse_whitespace(&p[2]),
                default: p.get(3).map(|m| m.as_str().to_string()),
            },
            None => Parameter::Raw(raw.to_string()),
        })
        .collect();
    Some(SignatureSpec {
        name: caps[1].to_string(),
        parameters,
        return_type: caps
            .get(3)
            .map(|m| collapse_whitespace(m.as_str()))
            .unwrap_or_else(|| "void".to_string()),
    })
}

/// Declaration notation for a parameter list: `int x, String y`.
pub fn declaration_params(params: &[Parameter]) -> String {
    params
        .iter()
        .map(|p| match p {
            Parameter::Typed { name, ty, default } => match default {
                Some(value) => format!("{ty} {name} = {value}"),
                None => format!("{ty} {name}"),
            },
            Parameter::Raw(raw) => raw.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split on commas that are not nested inside `<...>`, `(...)` or `[...]`.
fn split_params(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, ch) in list.char_indices() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
