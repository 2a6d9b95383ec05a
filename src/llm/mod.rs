//! LLM collaborator for speaker name enrichment
//!
//! The naming step is a quality enhancement: it runs only after successful
//! diarization and its failures never affect job outcome.

mod client;
mod gemini;
mod prompts;

pub use client::{apply_names, build_namer, SpeakerNameOutcome, SpeakerNamer};
pub use gemini::GeminiClient;
