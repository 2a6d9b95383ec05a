//! Job orchestration: lifecycle controller and polling worker

pub mod controller;
pub mod duration;
pub mod worker;

pub use controller::JobLifecycleController;
pub use duration::transcript_duration_secs;
pub use worker::Worker;

/// Contractual progress milestones. Tests assert these exact values at
/// each stage boundary.
pub const PROGRESS_CLAIMED: i64 = 10;
pub const PROGRESS_AUDIO_READY: i64 = 20;
pub const PROGRESS_ENGINE_STARTED: i64 = 30;
pub const PROGRESS_ENGINE_FALLBACK: i64 = 50;
pub const PROGRESS_OUTPUT_VERIFIED: i64 = 80;
pub const PROGRESS_COMPLETED: i64 = 100;
