//! Boundaries to the external transcoder, recognizer and synthesizer.

use std::path::Path;

use async_trait::async_trait;

/// Single outcome shape for the speech service's result callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome<T> {
    Completed(T),
    /// The service ran but found nothing to recognize.
    NoMatch,
    /// The service refused or aborted the request.
    Canceled { code: String, detail: String },
    /// Transport or protocol failure before a result was produced.
    Error(String),
}

/// Intermediate format handed to the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// 16 kHz mono PCM WAV.
    Wav,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
        }
    }
}

/// Audio format requested from the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Mp3Mono16k,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp3Mono16k => "audio/mpeg",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to start transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("transcoder exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },
}

/// Converts an audio file on disk into `format`, writing to `output`.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        format: TargetFormat,
    ) -> Result<(), TranscodeError>;
}

/// Turns WAV audio into text.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, audio: Vec<u8>, language: &str) -> SpeechOutcome<String>;
}

/// Turns text into encoded audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        format: OutputFormat,
    ) -> SpeechOutcome<Vec<u8>>;
}
