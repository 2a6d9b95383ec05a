//! scribed - Self-hosted transcription job service
//!
//! Registers audio files, drives them through an external recognizer with
//! device fallback, and persists diarized, optionally speaker-named
//! transcripts.

pub mod audio;
pub mod cli;
pub mod config;
pub mod engine;
pub mod jobs;
pub mod llm;
pub mod storage;

use thiserror::Error;

use crate::storage::JobStatus;

/// Main error type for scribed
#[derive(Error, Debug)]
pub enum ScribedError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {action} job in state '{status}'")]
    InvalidState {
        action: &'static str,
        status: JobStatus,
    },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScribedError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "scribed";
