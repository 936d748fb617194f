//! Batch orchestrator: scan, generate, re-read, splice, one task at a time.
//!
//! Per file:
//!
//! 1. **Scan**: build the work list; an empty list ends the file with zero splices
//! 2. **Prepare**: gather the folder context once
//! 3. **Iterate**: for each task: poll cancellation, call the backend,
//!    normalize, re-read the file, re-locate the region by its anchor,
//!    splice, write
//! 4. **Report**: per-task outcomes
//!
//! The file is never held open between steps and no offset computed before
//! a task's own turn is used to write.

use crate::backend::{Backend, GenerationRequest};
use crate::context;
use crate::error::{ProcessError, TaskError};
use crate::model::{GeneratedRegion, SynthesisTask, WorkList};
use crate::normalize;
use crate::scanner;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Cooperative cancellation, polled between tasks.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum TaskOutcome {
    Completed,
    /// Reached the backend (or the splice) and failed.
    Failed(TaskError),
    /// Never sent to the backend.
    Skipped(TaskError),
}

#[derive(Debug)]
pub struct TaskReport {
    pub ordinal: usize,
    pub method_name: String,
    pub outcome: TaskOutcome,
}

/// Outcome of processing one file.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub tasks: Vec<TaskReport>,
    /// Cancellation cut the file short: at least one task never ran.
    pub cancelled: bool,
}

impl FileReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            tasks: Vec::new(),
            cancelled: false,
        }
    }

    /// Number of splices actually written.
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Completed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped(_)))
    }

    fn count(&self, pred: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.tasks.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Outcome of processing a folder (or a single file).
#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.files.iter().map(FileReport::completed).sum()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().map(FileReport::failed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.files.iter().map(FileReport::skipped).sum()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} file(s): {} completed, {} failed, {} skipped",
            self.files.len(),
            self.completed(),
            self.failed(),
            self.skipped()
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

pub struct Orchestrator<'a> {
    backend: &'a dyn Backend,
    cancel: CancellationFlag,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self {
            backend,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process one file, gathering context from `folder`.
    ///
    /// Context is only gathered when the file has at least one task.
    pub fn process(
        &self,
        file: &Path,
        folder: &Path,
        extension: &str,
    ) -> Result<FileReport, ProcessError> {
        let text = read_source(file)?;
        let worklist = scanner::build_worklist(&text);
        if worklist.is_empty() {
            return Ok(self.run(file, &worklist, ""));
        }
        let context = context::gather_context(folder, extension)?;
        Ok(self.run(file, &worklist, &context))
    }

    /// Process one file with an already gathered context.
    pub fn process_with_context(
        &self,
        file: &Path,
        context: &str,
    ) -> Result<FileReport, ProcessError> {
        let text = read_source(file)?;
        let worklist = scanner::build_worklist(&text);
        Ok(self.run(file, &worklist, context))
    }

    /// Process every source file of `folder` in name order, sharing one context.
    pub fn process_folder(
        &self,
        folder: &Path,
        extension: &str,
    ) -> Result<BatchReport, ProcessError> {
        let files = context::list_source_files(folder, extension)?;
        if files.is_empty() {
            return Err(ProcessError::NoSourceFiles {
                folder: folder.to_path_buf(),
                extension: extension.to_string(),
            });
        }
        info!(folder = %folder.display(), files = files.len(), "processing folder");
        let context = context::gather_context(folder, extension)?;

        let mut batch = BatchReport::default();
        for file in &files {
            if self.cancel.is_cancelled() {
                batch.cancelled = true;
                break;
            }
            let report = self.process_with_context(file, &context)?;
            let cancelled = report.cancelled;
            batch.files.push(report);
            if cancelled {
                batch.cancelled = true;
                break;
            }
        }
        Ok(batch)
    }

    fn run(&self, path: &Path, worklist: &WorkList, context: &str) -> FileReport {
        let mut report = FileReport::new(path);

        for skipped in worklist.regionless() {
            let err = TaskError::MalformedAnnotation {
                ordinal: skipped.ordinal,
                method: skipped.method_name.clone(),
            };
            warn!(file = %path.display(), "{err}");
            report.tasks.push(TaskReport {
                ordinal: skipped.ordinal,
                method_name: skipped.method_name.clone(),
                outcome: TaskOutcome::Skipped(err),
            });
        }

        if worklist.is_empty() {
            info!(file = %path.display(), "no generated regions to fill");
            return report;
        }
        info!(file = %path.display(), tasks = worklist.len(), "filling generated regions");

        for task in worklist.tasks() {
            if self.cancel.is_cancelled() {
                warn!(file = %path.display(), "cancelled before {}", task.method_name);
                report.cancelled = true;
                break;
            }

            let outcome = match self.run_task(path, task, context) {
                Ok(()) => {
                    info!(file = %path.display(), method = %task.method_name, "region filled");
                    TaskOutcome::Completed
                }
                Err(err) if err.is_skip() => {
                    warn!(file = %path.display(), "{err}");
                    TaskOutcome::Skipped(err)
                }
                Err(err @ TaskError::EmptyGeneration { .. }) => {
                    warn!(file = %path.display(), "{err}");
                    TaskOutcome::Failed(err)
                }
                Err(err @ TaskError::Backend(_)) => {
                    error!(
                        file = %path.display(),
                        backend = self.backend.name(),
                        endpoint = self.backend.endpoint(),
                        "{err}"
                    );
                    TaskOutcome::Failed(err)
                }
                Err(err) => {
                    error!(file = %path.display(), "{err}");
                    TaskOutcome::Failed(err)
                }
            };
            report.tasks.push(TaskReport {
                ordinal: task.ordinal,
                method_name: task.method_name.clone(),
                outcome,
            });
        }
        report.tasks.sort_by_key(|t| t.ordinal);
        report
    }

    fn run_task(&self, path: &Path, task: &SynthesisTask, context: &str) -> Result<(), TaskError> {
        if task.payload().is_empty() {
            return Err(TaskError::EmptyPrompt {
                ordinal: task.ordinal,
                method: task.method_name.clone(),
            });
        }

        let raw = self.backend.generate(&GenerationRequest {
            prompt: task.payload(),
            context,
            identifier: &task.method_name,
        })?;
        let body = normalize::normalize_non_empty(&raw).ok_or_else(|| {
            TaskError::EmptyGeneration {
                method: task.method_name.clone(),
            }
        })?;

        // Earlier splices moved everything after them: re-read and re-locate.
        let io_err = |source| TaskError::Io {
            path: path.to_path_buf(),
            source,
        };
        let fresh = fs::read_to_string(path).map_err(io_err)?;
        let region = scanner::relocate(&fresh, &task.anchor()).ok_or_else(|| {
            TaskError::MarkerVanished {
                ordinal: task.ordinal,
                method: task.method_name.clone(),
            }
        })?;
        fs::write(path, splice(&fresh, region, &body)).map_err(io_err)
    }
}

/// Replace the region's content with `body`.
///
/// Body lines are indented like the start delimiter's line and the end
/// delimiter keeps the indentation of its own line, so the bytes between the
/// delimiters trim to exactly `body`. Lines end like the start delimiter's
/// line does (`\n` or `\r\n`).
pub fn splice(text: &str, region: GeneratedRegion, body: &str) -> String {
    let indent = line_indent(text, region.start);
    let end_indent = line_indent(text, region.end);
    let eol = line_ending(text, region.start);

    let mut out = String::with_capacity(text.len() + body.len() + 16);
    out.push_str(&text[..region.start]);
    out.push_str(eol);
    for (i, line) in body.lines().enumerate() {
        if i > 0 {
            out.push_str(eol);
        }
        if !line.is_empty() {
            out.push_str(indent);
            out.push_str(line);
        }
    }
    out.push_str(eol);
    out.push_str(end_indent);
    out.push_str(&text[region.end..]);
    out
}

/// Terminator of the line containing `pos`.
fn line_ending(text: &str, pos: usize) -> &'static str {
    match text[pos..].find('\n') {
        Some(i) if text[..pos + i].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Leading whitespace of the line containing `pos`.
fn line_indent(text: &str, pos: usize) -> &str {
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let line = &text[line_start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

fn read_source(path: &Path) -> Result<String, ProcessError> {
    fs::read_to_string(path).map_err(|source| ProcessError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "class A {\n    void run() {\n        // generated start\n        old();\n        // generated end\n    }\n}\n";

    fn region_of(text: &str) -> GeneratedRegion {
        let start = scanner::find_start_marker(text, 0).unwrap();
        let end = scanner::find_end_marker(text, start.end).unwrap();
        GeneratedRegion::new(start.end, end.start).unwrap()
    }

    #[test]
    fn splice_indents_body() {
        let out = splice(SRC, region_of(SRC), "if (x) {\n    y();\n}");
        assert_eq!(
            out,
            "class A {\n    void run() {\n        // generated start\n        if (x) {\n            y();\n        }\n        // generated end\n    }\n}\n"
        );
    }

    #[test]
    fn splice_keeps_blank_lines_unindented() {
        let out = splice(SRC, region_of(SRC), "a();\n\nb();");
        assert!(out.contains("        a();\n\n        b();\n"), "Got: {out}");
    }

    #[test]
    fn splice_region_trims_to_body() {
        let out = splice(SRC, region_of(SRC), "return 1;");
        let region = region_of(&out);
        assert_eq!(out[region.start..region.end].trim(), "return 1;");
    }

    #[test]
    fn splice_is_stable_when_repeated() {
        let once = splice(SRC, region_of(SRC), "x();");
        let twice = splice(&once, region_of(&once), "x();");
        assert_eq!(once, twice);
    }

    #[test]
    fn splice_keeps_crlf_line_endings() {
        let crlf = SRC.replace('\n', "\r\n");
        let out = splice(&crlf, region_of(&crlf), "if (x) {\n    y();\n}");
        assert_eq!(
            out,
            "class A {\r\n    void run() {\r\n        // generated start\r\n        if (x) {\r\n            y();\r\n        }\r\n        // generated end\r\n    }\r\n}\r\n"
        );
        assert_eq!(out.matches('\n').count(), out.matches("\r\n").count());
    }

    #[test]
    fn indent_of_first_line() {
        assert_eq!(line_indent("  a\n\tb", 1), "  ");
        assert_eq!(line_indent("  a\n\tb", 6), "\t");
    }

    #[test]
    fn cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn summary_line() {
        let report = BatchReport::default();
        assert_eq!(
            report.to_string(),
            "processed 0 file(s): 0 completed, 0 failed, 0 skipped"
        );
    }
}
