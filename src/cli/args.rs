//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// scribed - transcription job service with diarization and speaker naming
#[derive(Parser, Debug)]
#[command(name = "scribed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register an audio file and queue a transcription job
    Submit {
        /// Path to the audio file to register
        audio: Option<PathBuf>,

        /// Queue a new job for an already-registered file id instead
        #[arg(long, conflicts_with = "audio")]
        file: Option<String>,

        /// Language code (e.g. en, sv); default auto-detect
        #[arg(short, long)]
        language: Option<String>,

        /// Model size (tiny, base, small, medium, large)
        #[arg(short, long)]
        model: Option<String>,

        /// Disable speaker diarization for this job
        #[arg(long)]
        no_diarization: bool,

        /// Expected number of speakers, if known
        #[arg(long)]
        speakers: Option<u32>,
    },

    /// List transcription jobs
    List {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// View a job's status and transcript
    View {
        /// Job ID or partial ID
        id: String,
    },

    /// Queue a failed job for another attempt
    Retry {
        /// Job ID or partial ID
        id: String,
    },

    /// Cancel a pending or processing job
    Cancel {
        /// Job ID or partial ID
        id: String,
    },

    /// Export a job's transcript to a file
    Export {
        /// Job ID or partial ID
        id: String,

        /// Output format (txt, json, srt)
        #[arg(short, long, default_value = "txt")]
        format: String,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Worker management commands
    #[command(subcommand)]
    Worker(WorkerCommand),

    /// Run diagnostic checks on the local setup
    Doctor {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    /// Run the worker loop in the foreground
    Run,

    /// Start the worker as a background process
    Start,

    /// Stop the background worker
    Stop,

    /// Check worker and queue status
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}
