//! Audio file access for the pipeline

mod probe;
mod source;

pub use probe::{probe_wav, AudioProbe};
pub use source::{AudioSource, LocalAudioSource};
