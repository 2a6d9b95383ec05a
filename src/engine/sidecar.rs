//! Engine metadata sidecar
//!
//! On failure (and on some partial successes) the recognizer writes a
//! `<output>_status.json` file next to its result describing what it
//! attempted. The sidecar is optional; loading is best-effort and never
//! fails the job on its own.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Metadata the recognizer writes alongside its output file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSidecar {
    /// Engine-reported overall status ("failed" on engine-side errors)
    #[serde(default)]
    pub status: Option<String>,

    /// Engine-reported top-level error
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub diarization_attempted: Option<bool>,

    #[serde(default)]
    pub diarization_success: Option<bool>,

    #[serde(default)]
    pub diarization_error: Option<String>,

    #[serde(default)]
    pub format_conversion_attempted: Option<bool>,

    #[serde(default)]
    pub format_conversion_success: Option<bool>,

    #[serde(default)]
    pub format_conversion_error: Option<String>,
}

impl EngineSidecar {
    /// Sidecar path for a given output file, per the engine contract
    /// (`result.json` -> `result_status.json`)
    pub fn path_for(output_path: &Path) -> PathBuf {
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        output_path.with_file_name(format!("{}_status.json", stem))
    }

    /// Load the sidecar for an output file, if one was written and parses
    pub fn load_for(output_path: &Path) -> Option<Self> {
        let path = Self::path_for(output_path);
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Whether the engine itself reported the run as failed
    pub fn reports_failure(&self) -> bool {
        self.status.as_deref() == Some("failed")
    }

    /// Whether the sidecar says anything about diarization at all
    pub fn mentions_diarization(&self) -> bool {
        self.diarization_attempted.is_some()
            || self.diarization_success.is_some()
            || self.diarization_error.is_some()
    }

    /// Whether format conversion was attempted and failed
    pub fn format_conversion_failed(&self) -> bool {
        self.format_conversion_attempted == Some(true)
            && self.format_conversion_success != Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_follows_engine_naming() {
        let path = EngineSidecar::path_for(Path::new("/tmp/work/result.json"));
        assert_eq!(path, Path::new("/tmp/work/result_status.json"));
    }

    #[test]
    fn failed_status_is_detected() {
        let sidecar: EngineSidecar =
            serde_json::from_str(r#"{"status": "failed", "error": "cuda out of memory"}"#)
                .unwrap();
        assert!(sidecar.reports_failure());
        assert!(!sidecar.mentions_diarization());
    }

    #[test]
    fn diarization_fields_round_trip() {
        let sidecar: EngineSidecar = serde_json::from_str(
            r#"{"diarization_attempted": true, "diarization_success": false,
                "diarization_error": "missing auth token"}"#,
        )
        .unwrap();
        assert!(sidecar.mentions_diarization());
        assert_eq!(sidecar.diarization_success, Some(false));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let sidecar: EngineSidecar =
            serde_json::from_str(r#"{"status": "ok", "gpu_memory_mb": 4096}"#).unwrap();
        assert!(!sidecar.reports_failure());
    }
}
