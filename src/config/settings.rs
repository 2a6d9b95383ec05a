//! Application settings management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// General settings
    #[serde(default)]
    pub general: GeneralSettings,

    /// External recognizer settings
    #[serde(default)]
    pub engine: EngineSettings,

    /// Job worker settings
    #[serde(default)]
    pub jobs: JobSettings,

    /// LLM settings (speaker naming)
    #[serde(default)]
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Data directory for the database and staged audio
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Interpreter used to run the recognizer script
    #[serde(default = "default_python_command")]
    pub python_command: String,

    /// Path to the recognizer script
    #[serde(default = "default_engine_script")]
    pub script: PathBuf,

    /// Ordered compute devices to attempt (first entry is primary)
    #[serde(default = "default_devices")]
    pub devices: Vec<String>,

    /// Wall-clock timeout per device attempt, in seconds
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Default model size for new jobs (tiny, base, small, medium, large)
    #[serde(default = "default_model_size")]
    pub model_size: String,

    /// Default language for new jobs (empty = auto-detect)
    #[serde(default)]
    pub language: String,

    /// Whether new jobs request speaker diarization
    #[serde(default = "default_true")]
    pub diarization: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Seconds between pending-job polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum pending jobs fetched per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum jobs processed in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Allow submitting a new job while another non-failed job exists for
    /// the same file
    #[serde(default)]
    pub allow_duplicate_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// LLM provider (gemini)
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key (for cloud providers)
    #[serde(default)]
    pub api_key: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API endpoint (for local/custom providers)
    #[serde(default)]
    pub endpoint: String,
}

// Default value functions

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "scribed", "scribed")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.local/share/scribed"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_python_command() -> String {
    "python3".to_string()
}

fn default_engine_script() -> PathBuf {
    let mut dir = default_data_dir();
    dir.push("scripts");
    dir.push("transcribe.py");
    dir
}

fn default_devices() -> Vec<String> {
    vec!["cuda".to_string(), "cpu".to_string()]
}

fn default_attempt_timeout_secs() -> u64 {
    600
}

fn default_model_size() -> String {
    "base".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    4
}

fn default_concurrency() -> usize {
    2
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}

fn default_llm_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            python_command: default_python_command(),
            script: default_engine_script(),
            devices: default_devices(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            model_size: default_model_size(),
            language: String::new(),
            diarization: true,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            allow_duplicate_active: false,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: String::new(),
            model: default_llm_model(),
            endpoint: String::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            engine: EngineSettings::default(),
            jobs: JobSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("No config file found, using defaults");
            let mut settings = Self::default();
            settings.apply_env_overrides();
            return Ok(settings);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        settings.apply_env_overrides();

        Ok(settings)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if self.llm.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("SCRIBED_GEMINI_API_KEY") {
                if !key.trim().is_empty() {
                    self.llm.api_key = key;
                }
            }
        }
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "scribed", "scribed")
            .context("Could not determine config directory")?;

        let config_dir = dirs.config_dir();
        Ok(config_dir.join("config.toml"))
    }

    /// Write default configuration to a file
    pub fn write_default(path: &PathBuf) -> Result<()> {
        let settings = Self::default();
        let content = toml::to_string_pretty(&settings)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the database path
    pub fn database_path(&self) -> PathBuf {
        self.general.data_dir.join("scribed.db")
    }

    /// Get the directory registered audio files are staged into
    pub fn audio_dir(&self) -> PathBuf {
        self.general.data_dir.join("audio")
    }

    /// Get the PID file path for the background worker
    pub fn pid_path(&self) -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        runtime_dir.join("scribed.pid")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.general.data_dir)?;
        std::fs::create_dir_all(self.audio_dir())?;
        Ok(())
    }

    /// Per-attempt engine timeout as a Duration
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.attempt_timeout_secs)
    }
}
