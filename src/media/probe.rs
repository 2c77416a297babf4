//! Media metadata probe: size, modification time and duration.
//!
//! WAV durations come from the header (hound). Other audio and video need
//! the `ffmpeg` feature; without it their duration stays unknown.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::entities::MediaType;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadata {
    pub file_size: u64,
    pub modified: DateTime<Utc>,
    /// Seconds, audio/video only
    pub duration: Option<f64>,
}

pub trait MetadataProbe: Send + Sync {
    fn probe(&self, path: &Path, media_type: MediaType) -> Result<MediaMetadata>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StandardProbe;

impl MetadataProbe for StandardProbe {
    fn probe(&self, path: &Path, media_type: MediaType) -> Result<MediaMetadata> {
        let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
        if !meta.is_file() {
            anyhow::bail!("{} is not a regular file", path.display());
        }
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let duration = if media_type.is_timed() {
            probe_duration(path)?
        } else {
            None
        };

        Ok(MediaMetadata {
            file_size: meta.len(),
            modified,
            duration,
        })
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

fn probe_duration(path: &Path) -> Result<Option<f64>> {
    if is_wav(path) {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("read WAV header of {}", path.display()))?;
        let rate = reader.spec().sample_rate;
        if rate == 0 {
            return Ok(None);
        }
        return Ok(Some(reader.duration() as f64 / rate as f64));
    }
    container_duration(path)
}

#[cfg(feature = "ffmpeg")]
fn container_duration(path: &Path) -> Result<Option<f64>> {
    use playa_ffmpeg as ffmpeg;

    super::ffmpeg_init();
    let ictx = ffmpeg::format::input(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let duration = ictx.duration();
    if duration <= 0 {
        return Ok(None);
    }
    Ok(Some(duration as f64 / ffmpeg::ffi::AV_TIME_BASE as f64))
}

#[cfg(not(feature = "ffmpeg"))]
fn container_duration(path: &Path) -> Result<Option<f64>> {
    log::trace!("No duration probe for {} (built without ffmpeg)", path.display());
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, seconds: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(8000 * seconds) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_duration() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("voice.wav");
        write_wav(&path, 2);

        let meta = StandardProbe.probe(&path, MediaType::Audio).unwrap();
        assert_eq!(meta.duration, Some(2.0));
        assert!(meta.file_size > 32000);
    }

    #[test]
    fn test_image_has_no_duration() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("still.png");
        fs::write(&path, b"not really a png").unwrap();

        let meta = StandardProbe.probe(&path, MediaType::Image).unwrap();
        assert_eq!(meta.file_size, 16);
        assert_eq!(meta.duration, None);
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(StandardProbe.probe(Path::new("/nope/none.wav"), MediaType::Audio).is_err());
    }
}
