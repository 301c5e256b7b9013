//! `ffmpeg` subprocess transcoder.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::collaborator::{TargetFormat, TranscodeError, Transcoder};

/// Characters of stderr kept in error messages.
const STDERR_TAIL: usize = 512;

/// Runs the `ffmpeg` binary once per request.
///
/// The child is spawned with `kill_on_drop`, so a caller that times out and
/// drops the future also kills the process.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

fn format_args(format: TargetFormat) -> &'static [&'static str] {
    match format {
        TargetFormat::Wav => &["-ac", "1", "-ar", "16000", "-f", "wav"],
    }
}

fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL);
    text.chars().skip(skip).collect()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: TargetFormat,
    ) -> Result<(), TranscodeError> {
        tracing::debug!(
            binary = %self.binary.display(),
            input = %input.display(),
            output = %output.display(),
            "running ffmpeg"
        );

        let result = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(input)
            .args(format_args(format))
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(TranscodeError::Spawn)?;

        if result.status.success() {
            Ok(())
        } else {
            Err(TranscodeError::Exited {
                status: result.status.to_string(),
                stderr: tail(&result.stderr),
            })
        }
    }
}
