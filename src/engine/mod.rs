//! External recognizer boundary
//!
//! Invocation with device fallback, raw output normalization, and
//! diarization outcome resolution.

pub mod diarization;
pub mod invoker;
pub mod parser;
pub mod sidecar;

pub use diarization::{resolve, DiarizationOutcome};
pub use invoker::{AttemptEvent, EngineInvoker, EngineRequest, EngineRun};
pub use parser::{parse, ParsedSegment};
pub use sidecar::EngineSidecar;
