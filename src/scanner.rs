//! Marker scanner: finds `@prompt` directives and their generated regions.
//!
//! Input convention:
//!
//! ```text
//! /**
//!  * @prompt return true if n is even
//!  */
//! public boolean isEven(int n) {
//!     // generated start
//!     // generated end
//! }
//! ```
//!
//! Both `//generated start` and `// generated start` are accepted. The
//! scanner is a pure function of the text; it never touches the file.

use crate::model::{
    AnnotationDirective, GeneratedRegion, ScannedDirective, SearchAnchor, WorkList, UNKNOWN_METHOD,
};
use crate::signature;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// A `/** ... */` documentation block, closing at the nearest `*/`.
static RE_DOC_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*\*(.*?)\*/").unwrap());

/// Directive tag followed by its free-text payload (to the end of the block).
static RE_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)@prompt\s+(.*)").unwrap());

static RE_START_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[ \t]*generated[ \t]*start").unwrap());

static RE_END_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//[ \t]*generated[ \t]*end").unwrap());

/// Byte span of a matched delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub start: usize,
    pub end: usize,
}

/// Scan `text` for every directive, in document order.
pub fn scan(text: &str) -> Vec<ScannedDirective> {
    // Collect (block start, block end, payload) first so each region search
    // can be bounded by the next directive.
    let blocks: Vec<(usize, usize, String)> = RE_DOC_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?.as_str();
            let payload = RE_DIRECTIVE.captures(inner)?;
            Some((whole.start(), whole.end(), flatten_payload(&payload[1])))
        })
        .collect();

    blocks
        .iter()
        .enumerate()
        .map(|(ordinal, (_, end, payload))| {
            let limit = blocks.get(ordinal + 1).map_or(text.len(), |next| next.0);
            let region = find_region(text, *end, limit);
            let declaration = signature::next_declaration(text, *end);
            let method_name = match &declaration {
                Some(decl) => decl.name.clone(),
                None => {
                    debug!(ordinal, "no method declaration after directive");
                    UNKNOWN_METHOD.to_string()
                }
            };
            ScannedDirective {
                ordinal,
                directive: AnnotationDirective {
                    payload: payload.clone(),
                    source_offset_end: *end,
                },
                region,
                method_name,
                declaration: declaration.map(|d| d.text),
            }
        })
        .collect()
}

/// Scan and split into tasks and regionless directives.
pub fn build_worklist(text: &str) -> WorkList {
    WorkList::from_scan(scan(text))
}

/// Re-locate the region of an anchored task in a fresh copy of the file.
///
/// The directive must still sit at the same ordinal with the same payload;
/// anything else means the file changed underneath the batch.
pub fn relocate(text: &str, anchor: &SearchAnchor) -> Option<GeneratedRegion> {
    let found = scan(text).into_iter().nth(anchor.ordinal)?;
    if found.directive.payload != anchor.payload {
        return None;
    }
    found.region
}

/// Flatten the payload: trim each line, drop one leading `*`, join with spaces.
pub fn flatten_payload(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').unwrap_or(line).trim()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First start delimiter at or after `from`.
pub fn find_start_marker(text: &str, from: usize) -> Option<Marker> {
    find_marker(&RE_START_MARKER, text, from)
}

/// First end delimiter at or after `from`.
pub fn find_end_marker(text: &str, from: usize) -> Option<Marker> {
    find_marker(&RE_END_MARKER, text, from)
}

/// Every start delimiter in the text.
pub fn start_markers(text: &str) -> Vec<Marker> {
    RE_START_MARKER
        .find_iter(text)
        .map(|m| Marker {
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Pair a start and an end delimiter that both lie in `from..limit`.
fn find_region(text: &str, from: usize, limit: usize) -> Option<GeneratedRegion> {
    let start = find_start_marker(text, from).filter(|m| m.end <= limit)?;
    let end = find_end_marker(text, start.end).filter(|m| m.end <= limit)?;
    GeneratedRegion::new(start.end, end.start)
}

fn find_marker(re: &Regex, text: &str, from: usize) -> Option<Marker> {
    let haystack = text.get(from..)?;
    re.find(haystack).map(|m| Marker {
        start: from + m.start(),
        end: from + m.end(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVEN: &str = "public class Numbers {\n    /**\n     * @prompt return true if n is even\n     */\n    public boolean isEven(int n) {\n        // generated start\n        // generated end\n    }\n}\n";

    #[test]
    fn finds_directive_region_and_method() {
        let found = scan(EVEN);
        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.directive.payload, "return true if n is even");
        assert_eq!(d.method_name, "isEven");
        assert_eq!(d.declaration.as_deref(), Some("public boolean isEven(int n) {"));
        let region = d.region.unwrap();
        assert_eq!(&EVEN[region.start..region.end], "\n        ");
        assert!(EVEN[..region.start].ends_with("// generated start"));
        assert!(EVEN[region.end..].starts_with("// generated end"));
    }

    #[test]
    fn multi_line_payload_is_flattened() {
        let src = "/**\n * Adds things.\n * @prompt sum all values\n *   and ignore nulls\n */\nint sum(List<Integer> xs) {\n//generated start\n//generated end\n}\n";
        let found = scan(src);
        assert_eq!(found[0].directive.payload, "sum all values and ignore nulls");
        assert!(found[0].has_region());
    }

    #[test]
    fn compact_markers_accepted() {
        let src = "/** @prompt do it */\nvoid run() {\n  //generated start\n  old();\n  //generatedend\n}\n";
        let found = scan(src);
        let region = found[0].region.unwrap();
        assert_eq!(&src[region.start..region.end], "\n  old();\n  ");
    }

    #[test]
    fn plain_doc_blocks_are_ignored() {
        let src = "/** Just docs. */\nvoid a() {\n}\n/** @prompt fill b */\nvoid b() {\n// generated start\n// generated end\n}\n";
        let found = scan(src);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].method_name, "b");
        assert_eq!(found[0].ordinal, 0);
    }

    #[test]
    fn missing_end_marker_is_regionless() {
        let src = "/** @prompt nothing here */\nvoid a() {\n// generated start\n}\n";
        let found = scan(src);
        assert_eq!(found.len(), 1);
        assert!(found[0].region.is_none());
        let list = build_worklist(src);
        assert!(list.is_empty());
        assert_eq!(list.regionless().len(), 1);
    }

    #[test]
    fn region_search_stops_at_next_directive() {
        let src = "/** @prompt first */\nvoid a() {\n}\n/** @prompt second */\nvoid b() {\n// generated start\n// generated end\n}\n";
        let found = scan(src);
        assert_eq!(found.len(), 2);
        assert!(found[0].region.is_none());
        assert!(found[1].region.is_some());
    }

    #[test]
    fn unknown_method_when_no_declaration_follows() {
        let src = "/** @prompt orphan */\n// generated start\n// generated end\n";
        let found = scan(src);
        assert_eq!(found[0].method_name, UNKNOWN_METHOD);
        assert!(found[0].declaration.is_none());
    }

    #[test]
    fn relocate_follows_shifted_text() {
        let src = "/** @prompt one */\nvoid a() {\n// generated start\n// generated end\n}\n/** @prompt two */\nvoid b() {\n// generated start\n// generated end\n}\n";
        let list = build_worklist(src);
        let second = list.tasks()[1].anchor();
        let shifted = src.replacen("// generated start\n", "// generated start\nint filler = 42;\n", 1);
        let region = relocate(&shifted, &second).unwrap();
        assert!(region.start > list.tasks()[1].region.start);
        assert!(shifted[..region.start].ends_with("// generated start"));
        assert!(shifted[..region.start].contains("@prompt two"));
    }

    #[test]
    fn relocate_rejects_changed_payload() {
        let src = "/** @prompt one */\nvoid a() {\n// generated start\n// generated end\n}\n";
        let anchor = build_worklist(src).tasks()[0].anchor();
        let edited = src.replace("@prompt one", "@prompt uno");
        assert!(relocate(&edited, &anchor).is_none());
    }

    #[test]
    fn flatten_strips_single_star() {
        assert_eq!(flatten_payload("a\n * b\n ** c\n"), "a b * c");
    }
}
