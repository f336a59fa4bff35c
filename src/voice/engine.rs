use std::process::Command;

use crate::error::AppError;

const DEFAULT_RATE_WPM: u32 = 150;
const DEFAULT_AMPLITUDE: u32 = 100;

/// Handle on the local espeak-ng installation. Not safe for concurrent
/// synthesis; `VoiceService` serializes access behind a mutex.
pub struct TtsEngine {
    program: String,
    rate_wpm: u32,
    amplitude: u32,
    voices: Vec<String>,
}

impl TtsEngine {
    /// Probe the local speech engine: enumerate voices and render a short
    /// self-test utterance. Runs once at startup; a failure here leaves the
    /// voice service degraded for the lifetime of the process.
    pub fn probe() -> Result<Self, AppError> {
        Self::probe_program("espeak-ng")
    }

    pub fn probe_program(program: &str) -> Result<Self, AppError> {
        let voices = enumerate_voices(program)?;
        if voices.is_empty() {
            tracing::warn!("No voices reported by {}", program);
        } else {
            tracing::info!("Voice system initialized with {} voices", voices.len());
        }

        let engine = Self {
            program: program.to_string(),
            rate_wpm: DEFAULT_RATE_WPM,
            amplitude: DEFAULT_AMPLITUDE,
            voices,
        };

        // Self-test utterance, output discarded.
        let wav = engine.synthesize("Test", None)?;
        if wav.is_empty() {
            return Err(AppError::TtsFailed(
                "self-test utterance produced no audio".to_string(),
            ));
        }

        Ok(engine)
    }

    pub fn voice_names(&self) -> &[String] {
        &self.voices
    }

    /// Render text to a WAV buffer via `espeak-ng --stdout`.
    pub fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>, AppError> {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "--stdout",
            "-a",
            &self.amplitude.to_string(),
            "-s",
            &self.rate_wpm.to_string(),
        ]);
        if let Some(voice) = voice {
            cmd.args(["-v", voice]);
        }
        cmd.arg(text);

        let output = cmd.output().map_err(|e| {
            AppError::TtsFailed(format!(
                "Failed to run {} (is it installed?): {}",
                self.program, e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::TtsFailed(format!(
                "{} failed: {}",
                self.program, stderr
            )));
        }

        Ok(output.stdout)
    }
}

fn enumerate_voices(program: &str) -> Result<Vec<String>, AppError> {
    let output = Command::new(program)
        .arg("--voices")
        .output()
        .map_err(|e| {
            AppError::TtsFailed(format!(
                "Failed to run {} (is it installed?): {}",
                program, e
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::TtsFailed(format!(
            "{} --voices failed: {}",
            program, stderr
        )));
    }

    Ok(parse_voice_names(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse the VoiceName column out of `espeak-ng --voices` output.
/// Format: `Pty Language Age/Gender VoiceName File Other Languages`.
fn parse_voice_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(3))
        .map(str::to_string)
        .collect()
}
