//! Data model for the scan → generate → splice pipeline.
//!
//! Offsets stored here always refer to the snapshot of the file that was
//! scanned. Anything that writes to the file must re-derive them through a
//! [`SearchAnchor`] instead of reusing them.

use serde::Serialize;

/// Method name used when no declaration follows a directive.
pub const UNKNOWN_METHOD: &str = "UnknownMethod";

/// An `@prompt` directive parsed from one documentation block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationDirective {
    /// Instruction text, flattened to a single line.
    pub payload: String,
    /// Byte offset just past the closing `*/`.
    pub source_offset_end: usize,
}

/// Half-open span between the end of a start delimiter and the beginning of
/// the matching end delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeneratedRegion {
    pub start: usize,
    pub end: usize,
}

impl GeneratedRegion {
    /// Returns `None` unless `start < end`.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Everything the scanner learned about one directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedDirective {
    /// Position of the directive among all directives of the file.
    pub ordinal: usize,
    pub directive: AnnotationDirective,
    /// `None` when the start/end delimiter pair is missing.
    pub region: Option<GeneratedRegion>,
    pub method_name: String,
    /// Raw declaration head of the associated method, if one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration: Option<String>,
}

impl ScannedDirective {
    pub fn has_region(&self) -> bool {
        self.region.is_some()
    }
}

/// How a task is found again after the file has been rewritten.
///
/// Splices only ever touch text between delimiters, so the number of
/// directives in front of a task never changes while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAnchor {
    pub ordinal: usize,
    pub payload: String,
}

/// One (directive, region) pair ready to be sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisTask {
    pub ordinal: usize,
    pub directive: AnnotationDirective,
    pub region: GeneratedRegion,
    pub method_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration: Option<String>,
}

impl SynthesisTask {
    pub fn anchor(&self) -> SearchAnchor {
        SearchAnchor {
            ordinal: self.ordinal,
            payload: self.directive.payload.clone(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.directive.payload
    }
}

/// Ordered tasks of one file, in document order, plus the directives that
/// could not become tasks.
#[derive(Debug, Default, Clone, Serialize)]
pub struct WorkList {
    tasks: Vec<SynthesisTask>,
    regionless: Vec<ScannedDirective>,
}

impl WorkList {
    pub fn from_scan(scanned: Vec<ScannedDirective>) -> Self {
        let mut list = WorkList::default();
        for item in scanned {
            match item.region {
                Some(region) => list.tasks.push(SynthesisTask {
                    ordinal: item.ordinal,
                    directive: item.directive,
                    region,
                    method_name: item.method_name,
                    declaration: item.declaration,
                }),
                None => list.regionless.push(item),
            }
        }
        list
    }

    pub fn tasks(&self) -> &[SynthesisTask] {
        &self.tasks
    }

    /// Directives without a delimiter pair, skipped by the orchestrator.
    pub fn regionless(&self) -> &[ScannedDirective] {
        &self.regionless
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A single parameter of a method signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Parameter {
    Typed {
        name: String,
        ty: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// Text that did not look like `TYPE NAME`; kept verbatim.
    Raw(String),
}

impl Parameter {
    pub fn typed(name: &str, ty: &str) -> Self {
        Parameter::Typed {
            name: name.to_string(),
            ty: ty.to_string(),
            default: None,
        }
    }
}

/// Method signature derived from a declaration head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureSpec {
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// Empty for constructors.
    pub return_type: String,
}
