//! External recognizer invocation with device fallback
//!
//! Each attempt spawns the recognizer script against one compute device,
//! bounded by a wall-clock timeout that kills the process. Devices are
//! tried in configured order; only when every attempt fails does the job
//! fail.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::engine::sidecar::EngineSidecar;
use crate::ScribedError;

/// Inputs for one engine run
#[derive(Debug)]
pub struct EngineRequest<'a> {
    /// Locally readable audio file
    pub audio_path: &'a Path,

    /// Job-scoped scratch directory the engine writes into
    pub work_dir: &'a Path,

    pub model_size: &'a str,
    pub language: Option<&'a str>,
    pub diarization: bool,
    pub speaker_count_hint: Option<u32>,
}

/// A successful engine run
#[derive(Debug)]
pub struct EngineRun {
    /// Device the successful attempt ran on
    pub device: String,

    /// Raw contents of the engine's output file
    pub raw_output: String,

    /// Metadata sidecar, when the engine wrote one
    pub sidecar: Option<EngineSidecar>,
}

/// Attempt lifecycle notifications, used for progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent<'a> {
    /// First attempt is starting
    Started { device: &'a str },
    /// Previous attempt failed; switching to the next device
    FallingBack { from: &'a str, to: &'a str },
}

/// Spawns the external recognizer
pub struct EngineInvoker {
    python_command: String,
    script: PathBuf,
    devices: Vec<String>,
    attempt_timeout: Duration,
}

impl EngineInvoker {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            python_command: settings.engine.python_command.clone(),
            script: settings.engine.script.clone(),
            devices: settings.engine.devices.clone(),
            attempt_timeout: settings.attempt_timeout(),
        }
    }

    /// Run the engine, falling back through the configured device list.
    /// Returns the first successful run.
    pub async fn transcribe(
        &self,
        request: &EngineRequest<'_>,
        mut on_event: impl FnMut(AttemptEvent<'_>),
    ) -> crate::Result<EngineRun> {
        if self.devices.is_empty() {
            return Err(ScribedError::Engine("no devices configured".to_string()));
        }

        let mut failures = Vec::new();

        for (i, device) in self.devices.iter().enumerate() {
            if i == 0 {
                on_event(AttemptEvent::Started { device });
            } else {
                on_event(AttemptEvent::FallingBack {
                    from: &self.devices[i - 1],
                    to: device,
                });
            }

            info!(
                "Engine attempt on device '{}' for {}",
                device,
                request.audio_path.display()
            );

            match self.attempt(request, device).await {
                Ok(run) => {
                    if i > 0 {
                        info!("Engine succeeded on fallback device '{}'", device);
                    }
                    return Ok(run);
                }
                Err(reason) => {
                    warn!("Engine attempt on '{}' failed: {}", device, reason);
                    failures.push(format!("{}: {}", device, reason));
                }
            }
        }

        Err(ScribedError::Engine(format!(
            "{} ({})",
            failure_summary(self.devices.len()),
            failures.join("; ")
        )))
    }

    /// Single-device invocation. True means the output (and any sidecar)
    /// is on disk; false means the attempt failed with nothing but logs.
    pub async fn invoke(&self, request: &EngineRequest<'_>, device: &str) -> bool {
        match self.attempt(request, device).await {
            Ok(_) => true,
            Err(reason) => {
                warn!("Engine attempt on '{}' failed: {}", device, reason);
                false
            }
        }
    }

    async fn attempt(
        &self,
        request: &EngineRequest<'_>,
        device: &str,
    ) -> Result<EngineRun, String> {
        let output_path = request
            .work_dir
            .join(format!("transcript_{}.json", device));

        let mut cmd = Command::new(&self.python_command);
        cmd.args(self.build_args(request, device, &output_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn engine: {}", e))?;

        // Dropping the wait future on timeout drops the child, and
        // kill_on_drop terminates the process rather than abandoning it.
        let output = match timeout(self.attempt_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("engine process error: {}", e)),
            Err(_) => {
                return Err(format!(
                    "timed out after {}s, process killed",
                    self.attempt_timeout.as_secs()
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("Engine stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("Engine stderr: {}", stderr.trim());
        }

        let sidecar = EngineSidecar::load_for(&output_path);

        if !output.status.success() {
            return Err(format!(
                "engine exited with {}: {}",
                output.status,
                tail(&stderr)
            ));
        }

        if let Some(ref meta) = sidecar {
            if meta.reports_failure() {
                return Err(format!(
                    "engine reported failure: {}",
                    meta.error.as_deref().unwrap_or("no detail")
                ));
            }
        }

        let raw_output = std::fs::read_to_string(&output_path)
            .map_err(|e| format!("engine produced no output file: {}", e))?;

        Ok(EngineRun {
            device: device.to_string(),
            raw_output,
            sidecar,
        })
    }

    fn build_args(
        &self,
        request: &EngineRequest<'_>,
        device: &str,
        output_path: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            self.script.to_string_lossy().to_string(),
            "--audio-file".to_string(),
            request.audio_path.to_string_lossy().to_string(),
            "--model-size".to_string(),
            request.model_size.to_string(),
            "--device".to_string(),
            device.to_string(),
            "--output-file".to_string(),
            output_path.to_string_lossy().to_string(),
        ];

        if let Some(language) = request.language {
            args.push("--language".to_string());
            args.push(language.to_string());
        }

        if !request.diarization {
            args.push("--disable-diarization".to_string());
        }

        if let Some(hint) = request.speaker_count_hint {
            args.push("--num-speakers".to_string());
            args.push(hint.to_string());
        }

        args
    }
}

fn failure_summary(device_count: usize) -> &'static str {
    if device_count == 2 {
        "failed on both devices"
    } else {
        "failed on all devices"
    }
}

/// Last line of captured stderr, bounded for error messages
fn tail(text: &str) -> String {
    let line = text
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no stderr output");
    let line = line.trim();
    if line.len() > 300 {
        format!("...{}", &line[line.len() - 300..])
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn invoker(timeout_secs: u64, script: &Path, devices: Vec<&str>) -> EngineInvoker {
        EngineInvoker {
            python_command: "sh".to_string(),
            script: script.to_path_buf(),
            devices: devices.into_iter().map(String::from).collect(),
            attempt_timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("engine.sh");
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn build_args_follows_engine_contract() {
        let inv = invoker(600, Path::new("/opt/engine/transcribe.py"), vec!["cuda"]);
        let request = EngineRequest {
            audio_path: Path::new("/tmp/a.wav"),
            work_dir: Path::new("/tmp/work"),
            model_size: "small",
            language: Some("sv"),
            diarization: false,
            speaker_count_hint: Some(3),
        };

        let args = inv.build_args(&request, "cuda", Path::new("/tmp/work/out.json"));
        assert_eq!(args[0], "/opt/engine/transcribe.py");
        assert!(args.contains(&"--audio-file".to_string()));
        assert!(args.contains(&"--device".to_string()));
        assert!(args.contains(&"cuda".to_string()));
        assert!(args.contains(&"--language".to_string()));
        assert!(args.contains(&"sv".to_string()));
        assert!(args.contains(&"--disable-diarization".to_string()));
        assert!(args.contains(&"--num-speakers".to_string()));
        assert!(args.contains(&"3".to_string()));
    }

    #[test]
    fn diarization_enabled_omits_disable_flag() {
        let inv = invoker(600, Path::new("/opt/engine/transcribe.py"), vec!["cuda"]);
        let request = EngineRequest {
            audio_path: Path::new("/tmp/a.wav"),
            work_dir: Path::new("/tmp/work"),
            model_size: "base",
            language: None,
            diarization: true,
            speaker_count_hint: None,
        };

        let args = inv.build_args(&request, "cpu", Path::new("/tmp/work/out.json"));
        assert!(!args.contains(&"--disable-diarization".to_string()));
        assert!(!args.contains(&"--language".to_string()));
    }

    #[test]
    fn failure_summary_names_both_devices() {
        assert_eq!(failure_summary(2), "failed on both devices");
        assert_eq!(failure_summary(3), "failed on all devices");
    }

    #[tokio::test]
    async fn attempt_times_out_and_reports_it() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "#!/bin/sh\nsleep 30\n");
        let mut inv = invoker(600, &script, vec!["cpu"]);
        inv.attempt_timeout = Duration::from_millis(200);

        let request = EngineRequest {
            audio_path: tmp.path(),
            work_dir: tmp.path(),
            model_size: "base",
            language: None,
            diarization: true,
            speaker_count_hint: None,
        };

        let err = inv.attempt(&request, "cpu").await.unwrap_err();
        assert!(err.contains("timed out"), "got: {}", err);
    }

    #[tokio::test]
    async fn fallback_succeeds_after_primary_failure() {
        let tmp = tempfile::tempdir().unwrap();
        // Fail on cuda, succeed on cpu
        let script = write_script(
            tmp.path(),
            r#"#!/bin/sh
device=""
output=""
while [ $# -gt 0 ]; do
  case "$1" in
    --device) device="$2"; shift 2 ;;
    --output-file) output="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ "$device" = "cuda" ]; then
  echo "CUDA driver error" >&2
  exit 1
fi
printf '{"segments":[{"start":0.0,"end":2.0,"text":"from cpu"}]}' > "$output"
"#,
        );

        let inv = invoker(30, &script, vec!["cuda", "cpu"]);
        let request = EngineRequest {
            audio_path: tmp.path(),
            work_dir: tmp.path(),
            model_size: "base",
            language: None,
            diarization: true,
            speaker_count_hint: None,
        };

        let mut events = Vec::new();
        let run = inv
            .transcribe(&request, |event| {
                events.push(format!("{:?}", event));
            })
            .await
            .unwrap();

        assert_eq!(run.device, "cpu");
        assert!(run.raw_output.contains("from cpu"));
        assert_eq!(events.len(), 2);
        assert!(events[1].contains("FallingBack"));
    }

    #[tokio::test]
    async fn all_devices_failing_reports_both() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "#!/bin/sh\necho boom >&2\nexit 1\n");

        let inv = invoker(30, &script, vec!["cuda", "cpu"]);
        let request = EngineRequest {
            audio_path: tmp.path(),
            work_dir: tmp.path(),
            model_size: "base",
            language: None,
            diarization: true,
            speaker_count_hint: None,
        };

        let err = inv.transcribe(&request, |_| {}).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("failed on both devices"), "got: {}", message);
        assert!(message.contains("cuda"), "got: {}", message);
        assert!(message.contains("cpu"), "got: {}", message);
    }

    #[tokio::test]
    async fn invoke_returns_plain_success_signal() {
        let tmp = tempfile::tempdir().unwrap();
        let failing = write_script(tmp.path(), "#!/bin/sh\nexit 1\n");

        let inv = invoker(30, &failing, vec!["cpu"]);
        let request = EngineRequest {
            audio_path: tmp.path(),
            work_dir: tmp.path(),
            model_size: "base",
            language: None,
            diarization: true,
            speaker_count_hint: None,
        };

        assert!(!inv.invoke(&request, "cpu").await);
    }

    #[tokio::test]
    async fn engine_reported_failure_fails_the_attempt() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            r#"#!/bin/sh
output=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output-file) output="$2"; shift 2 ;;
    *) shift ;;
  esac
done
status=$(echo "$output" | sed 's/\.json$/_status.json/')
printf '{"status":"failed","error":"model download failed"}' > "$status"
exit 0
"#,
        );

        let inv = invoker(30, &script, vec!["cpu"]);
        let request = EngineRequest {
            audio_path: tmp.path(),
            work_dir: tmp.path(),
            model_size: "base",
            language: None,
            diarization: true,
            speaker_count_hint: None,
        };

        let err = inv.attempt(&request, "cpu").await.unwrap_err();
        assert!(err.contains("model download failed"), "got: {}", err);
    }
}
