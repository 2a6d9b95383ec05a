//! Configuration module for scribed

mod settings;

pub use settings::{EngineSettings, JobSettings, LlmSettings, Settings};
