//! promptfill: fill `// generated start` / `// generated end` regions of
//! source files with code produced by a generation backend, driven by
//! `@prompt` directives in the doc comment above each method.

pub mod backend;
pub mod config;
pub mod context;
pub mod diagram;
pub mod error;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod scanner;
pub mod signature;

pub use backend::{create_backend, Backend, GenerationRequest};
pub use config::{BackendConfig, BackendKind, InteractionMode, Settings};
pub use error::{BackendError, ProcessError, TaskError};
pub use model::{GeneratedRegion, SignatureSpec, SynthesisTask, WorkList};
pub use orchestrator::{BatchReport, CancellationFlag, FileReport, Orchestrator, TaskOutcome};
