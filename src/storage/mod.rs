//! Storage module for scribed
//!
//! Handles job, audio-file, and transcript persistence using SQLite.

mod database;
mod models;
mod repository;

pub use database::{Database, DatabaseStats};
pub use models::{
    AudioFile, DiarizationStatus, JobOptions, JobStatus, TranscriptSegment, TranscriptionJob,
};
pub use repository::{JobRepository, SqliteRepository};
