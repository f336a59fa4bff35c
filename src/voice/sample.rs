use std::io::{self, Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::AppError;

pub const DEFAULT_VOICE_ID: &str = "user_voice";

const WEBM_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    WebmDetected,
    NotWebm,
}

pub fn sniff(data: &[u8]) -> SniffedFormat {
    if data.starts_with(&WEBM_MAGIC) {
        SniffedFormat::WebmDetected
    } else {
        SniffedFormat::NotWebm
    }
}

/// Re-encode WebM audio as mono 22.05 kHz WAV using the local ffmpeg.
/// Falls back to the raw bytes when ffmpeg is missing or the conversion
/// fails; the sample is then stored unchanged.
pub fn transcode_webm(data: &[u8]) -> Vec<u8> {
    match run_ffmpeg(data) {
        Ok(wav) if !wav.is_empty() => wav,
        Ok(_) => {
            tracing::warn!("ffmpeg produced no output, storing raw bytes");
            data.to_vec()
        }
        Err(e) => {
            tracing::warn!("Audio conversion failed, storing raw bytes: {}", e);
            data.to_vec()
        }
    }
}

fn run_ffmpeg(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut child = Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            "pipe:0",
            "-ac",
            "1",
            "-ar",
            "22050",
            "-f",
            "wav",
            "pipe:1",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Feed stdin from a separate thread so a large transcode cannot
    // deadlock on full pipe buffers.
    let mut stdin = child.stdin.take().expect("stdin was piped");
    let input = data.to_vec();
    let writer = std::thread::spawn(move || {
        let _ = stdin.write_all(&input);
    });

    let output = child.wait_with_output()?;
    let _ = writer.join();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!("ffmpeg failed: {}", stderr.trim())));
    }

    Ok(output.stdout)
}

/// On-disk store for voice samples: one `<voice_id>.wav` per id, no index
/// file. Re-uploads overwrite in place.
pub struct SampleStore {
    dir: PathBuf,
}

impl SampleStore {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn sample_path(&self, voice_id: &str) -> PathBuf {
        self.dir.join(format!("{}.wav", voice_id))
    }

    pub fn save(&self, voice_id: &str, data: &[u8]) -> Result<PathBuf, AppError> {
        let bytes = match sniff(data) {
            SniffedFormat::WebmDetected => transcode_webm(data),
            SniffedFormat::NotWebm => data.to_vec(),
        };

        let path = self.sample_path(voice_id);
        std::fs::write(&path, &bytes)?;

        if let Ok(reader) = hound::WavReader::new(Cursor::new(&bytes[..])) {
            let spec = reader.spec();
            tracing::debug!(
                "Stored sample {}: {} Hz, {} channel(s)",
                voice_id,
                spec.sample_rate,
                spec.channels
            );
        }
        tracing::info!("Voice sample saved: {}", path.display());

        Ok(path)
    }

    pub fn has_samples(&self) -> bool {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| e.path().extension().map(|ext| ext == "wav").unwrap_or(false))
            })
            .unwrap_or(false)
    }
}
