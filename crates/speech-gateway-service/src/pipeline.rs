//! Speech-to-text and text-to-speech orchestration.
//!
//! Speech-to-text runs upload -> temp input -> transcoder -> temp output ->
//! recognizer, strictly in that order. Both temp resources are released
//! before the call returns on every path. They are also released on drop
//! if the caller's future is cancelled mid-flight. Every collaborator call
//! is bounded by the configured timeout; on expiry the call's future is
//! dropped, which cancels the request or kills the subprocess.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::collaborator::{
    OutputFormat, Recognizer, SpeechOutcome, Synthesizer, TargetFormat, Transcoder,
};
use crate::error::ServiceError;
use crate::temp::{TempResource, TempResourceManager, sanitize_suffix};

/// Longest accepted voice name.
const MAX_VOICE_LEN: usize = 64;

/// Uploaded audio after boundary normalization.
#[derive(Debug, Clone, Default)]
pub struct UploadedAudio {
    /// Client-supplied file name, used only to pick a temp suffix.
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub recognition_language: String,
    pub default_voice: String,
    /// Maximum text length for synthesis, in characters.
    pub text_length_limit: usize,
    /// Budget for each external call.
    pub collaborator_timeout: Duration,
}

/// External collaborators injected into the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub transcoder: Arc<dyn Transcoder>,
    pub recognizer: Arc<dyn Recognizer>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

#[derive(Clone)]
pub struct MediaPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    temp: TempResourceManager,
    collaborators: Collaborators,
    config: PipelineConfig,
}

impl MediaPipeline {
    pub fn new(
        temp: TempResourceManager,
        collaborators: Collaborators,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                temp,
                collaborators,
                config,
            }),
        }
    }

    pub fn temp(&self) -> &TempResourceManager {
        &self.inner.temp
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Transcribes uploaded audio.
    pub async fn speech_to_text(&self, upload: &UploadedAudio) -> Result<String, ServiceError> {
        if upload.bytes.is_empty() {
            return Err(ServiceError::InvalidInput(
                "uploaded file is empty".to_string(),
            ));
        }

        let temp = &self.inner.temp;
        let input = temp.acquire(&sanitize_suffix(upload.file_name.as_deref()));
        let output = temp.acquire(TargetFormat::Wav.extension());

        let started = Instant::now();
        let result = self.recognize_upload(&input, &output, &upload.bytes).await;

        for resource in [&input, &output] {
            if let Err(e) = resource.release() {
                tracing::warn!(
                    path = %resource.path().display(),
                    error = %e,
                    "failed to release temp file"
                );
            }
        }

        tracing::debug!(
            bytes = upload.bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "speech-to-text pipeline finished"
        );
        result
    }

    async fn recognize_upload(
        &self,
        input: &TempResource,
        output: &TempResource,
        bytes: &[u8],
    ) -> Result<String, ServiceError> {
        let Inner {
            collaborators,
            config,
            ..
        } = &*self.inner;
        let budget = config.collaborator_timeout;

        tokio::fs::write(input.path(), bytes)
            .await
            .map_err(|e| ServiceError::Internal(format!("failed to persist upload: {e}")))?;

        let transcoded = tokio::time::timeout(
            budget,
            collaborators
                .transcoder
                .transcode(input.path(), output.path(), TargetFormat::Wav),
        )
        .await;
        match transcoded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ServiceError::TranscodeFailed(e.to_string())),
            Err(_) => {
                return Err(ServiceError::TranscodeFailed(format!(
                    "timed out after {budget:?}"
                )));
            }
        }

        let wav = tokio::fs::read(output.path()).await.map_err(|e| {
            ServiceError::TranscodeFailed(format!("transcoded output unreadable: {e}"))
        })?;
        if wav.is_empty() {
            return Err(ServiceError::TranscodeFailed(
                "transcoder produced no output".to_string(),
            ));
        }

        let recognized = tokio::time::timeout(
            budget,
            collaborators
                .recognizer
                .recognize(wav, &config.recognition_language),
        )
        .await
        .map_err(|_| ServiceError::RecognitionFailed {
            code: "timeout".to_string(),
            detail: format!("no result after {budget:?}"),
        })?;

        match recognized {
            SpeechOutcome::Completed(text) if text.trim().is_empty() => {
                Err(ServiceError::NoSpeechDetected)
            }
            SpeechOutcome::Completed(text) => Ok(text),
            SpeechOutcome::NoMatch => Err(ServiceError::NoSpeechDetected),
            SpeechOutcome::Canceled { code, detail } => {
                Err(ServiceError::RecognitionFailed { code, detail })
            }
            SpeechOutcome::Error(detail) => Err(ServiceError::RecognitionFailed {
                code: "error".to_string(),
                detail,
            }),
        }
    }

    /// Synthesizes `text` with `voice` (or the configured default).
    pub async fn text_to_speech(
        &self,
        text: &str,
        voice: Option<&str>,
    ) -> Result<Vec<u8>, ServiceError> {
        let config = &self.inner.config;

        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::InvalidInput("text is required".to_string()));
        }
        let length = text.chars().count();
        if length > config.text_length_limit {
            return Err(ServiceError::InputTooLarge(format!(
                "text is {length} characters, limit is {}",
                config.text_length_limit
            )));
        }

        let voice = match voice.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) if is_valid_voice(v) => v,
            Some(_) => return Err(ServiceError::InvalidInput("invalid voice name".to_string())),
            None => config.default_voice.as_str(),
        };

        let budget = config.collaborator_timeout;
        let outcome = tokio::time::timeout(
            budget,
            self.inner
                .collaborators
                .synthesizer
                .synthesize(text, voice, OutputFormat::Mp3Mono16k),
        )
        .await
        .map_err(|_| ServiceError::SynthesisFailed(format!("timed out after {budget:?}")))?;

        match outcome {
            SpeechOutcome::Completed(audio) if audio.is_empty() => Err(
                ServiceError::SynthesisFailed("synthesizer returned no audio".to_string()),
            ),
            SpeechOutcome::Completed(audio) => Ok(audio),
            SpeechOutcome::NoMatch => Err(ServiceError::SynthesisFailed(
                "synthesizer produced no result".to_string(),
            )),
            SpeechOutcome::Canceled { code, detail } => Err(ServiceError::SynthesisFailed(
                format!("canceled ({code}): {detail}"),
            )),
            SpeechOutcome::Error(detail) => Err(ServiceError::SynthesisFailed(detail)),
        }
    }
}

/// Voice names look like `zh-CN-XiaoyiNeural`.
fn is_valid_voice(voice: &str) -> bool {
    voice.len() <= MAX_VOICE_LEN
        && voice
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b':')
}
