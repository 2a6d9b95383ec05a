//! CLI command implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{probe_wav, LocalAudioSource};
use crate::cli::args::{ConfigCommand, WorkerCommand};
use crate::config::Settings;
use crate::engine::EngineInvoker;
use crate::jobs::{JobLifecycleController, Worker};
use crate::llm::build_namer;
use crate::storage::{
    AudioFile, JobOptions, JobRepository, SqliteRepository, TranscriptSegment, TranscriptionJob,
};
use crate::ScribedError;

fn open_repo(settings: &Settings) -> Result<Arc<SqliteRepository>> {
    Ok(Arc::new(SqliteRepository::open(settings)?))
}

fn build_controller(
    settings: &Settings,
    repo: Arc<SqliteRepository>,
    with_namer: bool,
) -> Result<Arc<JobLifecycleController>> {
    let namer = if with_namer {
        build_namer(settings)?.map(Arc::from)
    } else {
        None
    };

    Ok(Arc::new(JobLifecycleController::new(
        repo,
        Arc::new(LocalAudioSource),
        Arc::new(EngineInvoker::from_settings(settings)),
        namer,
    )))
}

fn find_job(repo: &SqliteRepository, id: &str) -> Result<TranscriptionJob> {
    repo.find_job_by_prefix(id)?
        .ok_or_else(|| ScribedError::NotFound(format!("job {}", id)).into())
}

/// Register an audio file and queue a transcription job
#[allow(clippy::too_many_arguments)]
pub async fn submit_job(
    settings: &Settings,
    audio: Option<PathBuf>,
    file: Option<String>,
    language: Option<String>,
    model: Option<String>,
    no_diarization: bool,
    speakers: Option<u32>,
) -> Result<()> {
    settings.ensure_dirs()?;
    let repo = open_repo(settings)?;

    let file_record = match (audio, file) {
        (Some(path), None) => register_audio_file(settings, &repo, &path)?,
        (None, Some(id)) => repo
            .get_file(&id)?
            .ok_or_else(|| ScribedError::NotFound(format!("audio file {}", id)))?,
        _ => {
            return Err(ScribedError::Validation(
                "provide a path to an audio file, or --file <id>".to_string(),
            )
            .into())
        }
    };

    if !settings.jobs.allow_duplicate_active {
        if let Some(active) = repo.find_active_job_for_file(&file_record.id)? {
            anyhow::bail!(
                "File {} already has an active job {} ({}). Cancel it first, \
                 or set jobs.allow_duplicate_active in config.",
                &file_record.id[..8],
                &active.id[..8],
                active.status
            );
        }
    }

    let options = JobOptions {
        language: language.or_else(|| {
            let configured = settings.engine.language.trim();
            (!configured.is_empty()).then(|| configured.to_string())
        }),
        model_size: model.unwrap_or_else(|| settings.engine.model_size.clone()),
        diarization_enabled: settings.engine.diarization && !no_diarization,
        speaker_count_hint: speakers,
    };

    let job = TranscriptionJob::new(file_record.id.clone(), options);
    repo.create_job(&job)?;

    println!(
        "Queued job {} for {} (model: {})",
        &job.id[..8],
        file_record.file_name,
        job.model_size
    );
    println!("Run `scribed worker start` if the worker is not running.");

    Ok(())
}

/// Copy a local audio file into managed storage and register it
fn register_audio_file(
    settings: &Settings,
    repo: &SqliteRepository,
    path: &Path,
) -> Result<AudioFile> {
    if !path.is_file() {
        return Err(
            ScribedError::Validation(format!("Audio file not found: {}", path.display())).into(),
        );
    }

    // WAV headers are checked up front; other formats are handed to the
    // engine as-is and converted there.
    if let Some(probe) = probe_wav(path)? {
        tracing::debug!(
            "WAV probe: {} Hz, {} channel(s), {:.1}s",
            probe.sample_rate,
            probe.channels,
            probe.duration_secs
        );
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("Invalid audio file name")?;

    let mut file = AudioFile::new(file_name, String::new());

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let stored = settings
        .audio_dir()
        .join(format!("{}.{}", file.id, extension));

    std::fs::copy(path, &stored)
        .with_context(|| format!("Failed to copy audio into {}", stored.display()))?;
    file.source_path = stored.to_string_lossy().to_string();

    repo.create_file(&file)?;
    println!("Registered {} ({})", file.file_name, file.id);
    Ok(file)
}

/// List transcription jobs
pub async fn list_jobs(settings: &Settings, limit: usize) -> Result<()> {
    let repo = open_repo(settings)?;
    let jobs = repo.list_jobs(limit)?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!(
        "{:<10} {:<24} {:<12} {:>5}  {:<22} {:<12}",
        "ID", "File", "Status", "Prog", "Diarization", "Date"
    );
    println!("{}", "-".repeat(92));

    for job in jobs {
        let file_name = repo
            .get_file(&job.file_id)?
            .map(|f| f.file_name)
            .unwrap_or_else(|| "(missing)".to_string());
        let date = job.created_at.format("%Y-%m-%d");

        println!(
            "{:<10} {:<24} {:<12} {:>4}%  {:<22} {:<12}",
            &job.id[..8],
            truncate(&file_name, 22),
            job.status,
            job.progress,
            job.diarization_status,
            date
        );
    }

    Ok(())
}

/// View a job's status and transcript
pub async fn view_job(settings: &Settings, id: &str) -> Result<()> {
    let repo = open_repo(settings)?;
    let job = find_job(&repo, id)?;

    let file = repo.get_file(&job.file_id)?;

    println!("Job: {}", job.id);
    if let Some(ref file) = file {
        println!("File: {}", file.file_name);
        if let Some(duration) = file.duration_secs {
            println!("Duration: {}", format_duration(duration.round() as u64));
        }
    }
    println!("Status: {} ({}%)", job.status, job.progress);
    println!("Model: {}", job.model_size);
    println!("Diarization: {}", job.diarization_status);

    if let Some(ref error) = job.diarization_error {
        println!("Diarization error: {}", error);
    }
    if let Some(ref error) = job.last_error {
        println!("Error: {}", error);
    }

    println!();

    let segments = repo.transcript(&job.id)?;
    if segments.is_empty() {
        println!("(No transcript available)");
        return Ok(());
    }

    for segment in segments {
        let timestamp = format_timestamp(segment.start_time);
        match speaker_label(&segment) {
            Some(label) => println!("[{}] {}: {}", timestamp, label, segment.text),
            None => println!("[{}] {}", timestamp, segment.text),
        }
    }

    Ok(())
}

/// Queue a failed job for another attempt
pub async fn retry_job(settings: &Settings, id: &str) -> Result<()> {
    let repo = open_repo(settings)?;
    let job = find_job(&repo, id)?;

    let controller = build_controller(settings, repo, false)?;
    controller.retry(&job)?;

    println!("Job {} queued for retry", &job.id[..8]);
    Ok(())
}

/// Cancel a pending or processing job
pub async fn cancel_job(settings: &Settings, id: &str) -> Result<()> {
    let repo = open_repo(settings)?;
    let job = find_job(&repo, id)?;

    let controller = build_controller(settings, repo, false)?;
    controller.cancel(&job)?;

    println!("Job {} cancelled", &job.id[..8]);
    Ok(())
}

/// Export a job's transcript to a file
pub async fn export_job(
    settings: &Settings,
    id: &str,
    format: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let repo = open_repo(settings)?;
    let job = find_job(&repo, id)?;
    let segments = repo.transcript(&job.id)?;

    let content = match format {
        "txt" => export_as_txt(&job, &segments),
        "json" => export_as_json(&job, &segments)?,
        "srt" => export_as_srt(&segments),
        _ => anyhow::bail!("Unsupported format: {}. Supported: txt, json, srt", format),
    };

    if let Some(path) = output {
        std::fs::write(&path, content)?;
        println!("Exported to: {}", path.display());
    } else {
        print!("{}", content);
    }

    Ok(())
}

/// Handle worker subcommands
pub async fn worker_command(settings: &Settings, cmd: WorkerCommand) -> Result<()> {
    match cmd {
        WorkerCommand::Run => run_worker(settings).await,
        WorkerCommand::Start => start_worker(settings),
        WorkerCommand::Stop => stop_worker(settings),
        WorkerCommand::Status => worker_status(settings),
    }
}

/// Run the worker loop in the foreground
async fn run_worker(settings: &Settings) -> Result<()> {
    settings.ensure_dirs()?;

    let pid_path = settings.pid_path();
    std::fs::write(&pid_path, std::process::id().to_string())?;

    let repo = open_repo(settings)?;
    let controller = build_controller(settings, repo.clone(), true)?;
    let worker = Worker::new(repo, controller, settings);

    let result = worker.run().await;

    let _ = std::fs::remove_file(&pid_path);
    result
}

/// Start the worker as a detached background process
fn start_worker(settings: &Settings) -> Result<()> {
    let pid_path = settings.pid_path();

    if pid_path.exists() {
        if let Some(pid) = read_pid(&pid_path) {
            if pid_is_alive(pid) {
                anyhow::bail!("Worker is already running (PID: {})", pid);
            }
        }
        // Stale PID file, remove it
        std::fs::remove_file(&pid_path)?;
    }

    let exe = std::env::current_exe()?;
    let mut child = Command::new(exe)
        .args(["worker", "run"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    // Wait for readiness so callers don't get a false positive start.
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            anyhow::bail!(
                "Worker failed to start (exit: {}). Run `scribed worker run` for details.",
                status
            );
        }

        if pid_path.exists() {
            println!("Worker started");
            return Ok(());
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    anyhow::bail!("Worker start timed out. Run `scribed worker run` for details.")
}

/// Stop the background worker
fn stop_worker(settings: &Settings) -> Result<()> {
    let pid_path = settings.pid_path();

    let Some(pid) = read_pid(&pid_path) else {
        println!("Worker is not running");
        return Ok(());
    };

    if !pid_is_alive(pid) {
        std::fs::remove_file(&pid_path)?;
        println!("Worker is not running (removed stale PID file)");
        return Ok(());
    }

    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }

    // The worker finishes its in-flight batch before exiting.
    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline {
        if !pid_path.exists() {
            println!("Worker stopped");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    anyhow::bail!("Worker did not stop in time (PID: {})", pid)
}

/// Check worker and queue status
fn worker_status(settings: &Settings) -> Result<()> {
    let pid_path = settings.pid_path();

    match read_pid(&pid_path) {
        Some(pid) if pid_is_alive(pid) => println!("Worker is running (PID: {})", pid),
        _ => println!("Worker is not running"),
    }

    let repo = open_repo(settings)?;
    let stats = repo.stats()?;

    println!();
    println!("Queue:");
    println!("  pending:    {}", stats.pending_jobs);
    println!("  processing: {}", stats.processing_jobs);
    println!("  completed:  {}", stats.completed_jobs);
    println!("  failed:     {}", stats.failed_jobs);
    println!("  files:      {}", stats.total_files);

    Ok(())
}

fn read_pid(pid_path: &Path) -> Option<i32> {
    let content = std::fs::read_to_string(pid_path).ok()?;
    content.trim().parse().ok()
}

fn pid_is_alive(pid: i32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

/// Handle config subcommands
pub fn config_command(settings: &Settings, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let toml = toml::to_string_pretty(settings)?;
            println!("{}", toml);
        }
        ConfigCommand::Path => {
            let path = Settings::config_path()?;
            println!("{}", path.display());
        }
        ConfigCommand::Init { force } => {
            let path = Settings::config_path()?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Settings::write_default(&path)?;
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Serialize)]
struct DoctorReport {
    engine_script: String,
    devices: Vec<String>,
    checks: Vec<DoctorCheck>,
    notes: Vec<String>,
}

/// Run diagnostic checks to help troubleshoot local setup issues.
pub async fn run_doctor(settings: &Settings, json: bool) -> Result<()> {
    let report = collect_doctor_report(settings);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("scribed doctor");
    println!("engine script: {}", report.engine_script);
    println!("devices: {}", report.devices.join(", "));
    println!();

    for check in &report.checks {
        println!("{:<16} {:<8} {}", check.name, check.status, check.detail);
    }

    if !report.notes.is_empty() {
        println!();
        for note in &report.notes {
            println!("{}", note);
        }
    }

    Ok(())
}

fn collect_doctor_report(settings: &Settings) -> DoctorReport {
    let mut checks = Vec::new();
    let mut notes = Vec::new();

    let script_ok = settings.engine.script.is_file();
    checks.push(DoctorCheck {
        name: "engine-script",
        status: if script_ok { "ok" } else { "missing" },
        detail: settings.engine.script.display().to_string(),
    });
    if !script_ok {
        notes.push(
            "hint: set engine.script in config to the recognizer script path.".to_string(),
        );
    }

    let python_ok = command_exists(&settings.engine.python_command);
    checks.push(DoctorCheck {
        name: "python",
        status: if python_ok { "ok" } else { "missing" },
        detail: format!("{} (runs the recognizer)", settings.engine.python_command),
    });

    let database_ok = SqliteRepository::open(settings).is_ok();
    checks.push(DoctorCheck {
        name: "database",
        status: if database_ok { "ok" } else { "error" },
        detail: settings.database_path().display().to_string(),
    });

    let llm_configured = !settings.llm.api_key.trim().is_empty();
    checks.push(DoctorCheck {
        name: "speaker-naming",
        status: if llm_configured { "ok" } else { "disabled" },
        detail: if llm_configured {
            format!("{} via {}", settings.llm.model, settings.llm.provider)
        } else {
            "set llm.api_key or SCRIBED_GEMINI_API_KEY to enable".to_string()
        },
    });

    if settings.engine.devices.is_empty() {
        notes.push("warning: engine.devices is empty; every job will fail.".to_string());
    }

    DoctorReport {
        engine_script: settings.engine.script.display().to_string(),
        devices: settings.engine.devices.clone(),
        checks,
        notes,
    }
}

// Helper functions

fn command_exists(bin: &str) -> bool {
    Command::new(bin)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn format_timestamp(secs: f64) -> String {
    let total_secs = secs as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

fn speaker_label(segment: &TranscriptSegment) -> Option<String> {
    match (&segment.speaker_name, segment.speaker) {
        (Some(name), Some(id)) => Some(format!("{} (speaker {})", name, id)),
        (Some(name), None) => Some(name.clone()),
        (None, Some(id)) => Some(format!("Speaker {}", id)),
        (None, None) => None,
    }
}

fn export_as_txt(job: &TranscriptionJob, segments: &[TranscriptSegment]) -> String {
    let mut output = String::new();
    output.push_str(&format!("Job: {}\n", job.id));
    output.push_str(&format!(
        "Date: {}\n",
        job.created_at.format("%Y-%m-%d %H:%M")
    ));
    output.push_str(&format!("Status: {}\n", job.status));
    output.push_str(&format!("Diarization: {}\n", job.diarization_status));
    output.push_str("\n---\n\n");

    for segment in segments {
        let timestamp = format_timestamp(segment.start_time);
        match speaker_label(segment) {
            Some(label) => {
                output.push_str(&format!("[{}] {}: {}\n", timestamp, label, segment.text))
            }
            None => output.push_str(&format!("[{}] {}\n", timestamp, segment.text)),
        }
    }

    output
}

fn export_as_json(job: &TranscriptionJob, segments: &[TranscriptSegment]) -> Result<String> {
    #[derive(serde::Serialize)]
    struct ExportData<'a> {
        job: &'a TranscriptionJob,
        segments: &'a [TranscriptSegment],
    }

    let data = ExportData { job, segments };
    Ok(serde_json::to_string_pretty(&data)?)
}

fn export_as_srt(segments: &[TranscriptSegment]) -> String {
    let mut output = String::new();

    for (i, segment) in segments.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(segment.start_time),
            format_srt_timestamp(segment.end_time)
        ));
        output.push_str(&format!("{}\n\n", segment.text));
    }

    output
}

fn format_srt_timestamp(secs: f64) -> String {
    let total_ms = (secs * 1000.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_labels_prefer_inferred_names() {
        let mut segment = TranscriptSegment::new("job".to_string(), 0.0, 1.0, "hi".to_string());
        assert!(speaker_label(&segment).is_none());

        segment.speaker = Some(2);
        assert_eq!(speaker_label(&segment).as_deref(), Some("Speaker 2"));

        segment.speaker_name = Some("Alice".to_string());
        assert_eq!(
            speaker_label(&segment).as_deref(),
            Some("Alice (speaker 2)")
        );
    }

    #[test]
    fn srt_timestamps_use_comma_millis() {
        assert_eq!(format_srt_timestamp(61.5), "00:01:01,500");
    }

    #[test]
    fn doctor_report_flags_missing_devices() {
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.data_dir = tmp.path().to_path_buf();
        settings.engine.devices.clear();

        let report = collect_doctor_report(&settings);
        assert!(report
            .notes
            .iter()
            .any(|note| note.contains("devices is empty")));
    }
}
