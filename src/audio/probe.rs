//! Submit-time audio sanity checks
//!
//! Only WAV files are probed; everything else passes through untouched and
//! the engine handles format conversion itself.

use anyhow::{Context, Result};
use std::path::Path;

/// Basic facts about a WAV file
#[derive(Debug, Clone)]
pub struct AudioProbe {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
}

/// Probe a WAV file header. Returns None for non-WAV files, an error for
/// WAV files that cannot be read.
pub fn probe_wav(path: &Path) -> Result<Option<AudioProbe>> {
    let is_wav = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if !is_wav {
        return Ok(None);
    }

    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to read WAV header: {}", path.display()))?;

    let spec = reader.spec();
    let frames = reader.duration();
    let duration_secs = frames as f64 / spec.sample_rate as f64;

    Ok(Some(AudioProbe {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_secs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, seconds: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(16000 * seconds) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn probes_wav_duration() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("two_seconds.wav");
        write_wav(&path, 2);

        let probe = probe_wav(&path).unwrap().unwrap();
        assert_eq!(probe.sample_rate, 16000);
        assert_eq!(probe.channels, 1);
        assert!((probe.duration_secs - 2.0).abs() < 0.01);
    }

    #[test]
    fn non_wav_passes_through() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("audio.ogg");
        std::fs::write(&path, b"not a wav").unwrap();

        assert!(probe_wav(&path).unwrap().is_none());
    }

    #[test]
    fn corrupt_wav_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.wav");
        std::fs::write(&path, b"definitely not RIFF").unwrap();

        assert!(probe_wav(&path).is_err());
    }
}
