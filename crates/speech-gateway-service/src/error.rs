//! Service-layer error types.
//!
//! `ServiceError` is transport-agnostic. The HTTP crate maps it to status
//! codes and a `{message, code}` body.

use std::time::Duration;

use crate::admission::RejectReason;

/// Failure taxonomy shared by admission control and the media pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing or malformed request data.
    #[error("{0}")]
    InvalidInput(String),

    /// Allow-list or quota rejection.
    #[error("request rejected: {reason}")]
    Forbidden {
        reason: RejectReason,
        retry_after: Option<Duration>,
    },

    /// Input exceeds a configured size limit.
    #[error("{0}")]
    InputTooLarge(String),

    /// Recognition completed but heard nothing usable.
    #[error("no speech could be recognized")]
    NoSpeechDetected,

    #[error("audio transcoding failed: {0}")]
    TranscodeFailed(String),

    #[error("speech recognition failed ({code}): {detail}")]
    RecognitionFailed { code: String, detail: String },

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Anything unanticipated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid-input",
            Self::Forbidden { reason, .. } => reason.code(),
            Self::InputTooLarge(_) => "input-too-large",
            Self::NoSpeechDetected => "no-speech-detected",
            Self::TranscodeFailed(_) => "transcode-failed",
            Self::RecognitionFailed { .. } => "recognition-failed",
            Self::SynthesisFailed(_) => "synthesis-failed",
            Self::Internal(_) => "internal-error",
        }
    }

    /// Whether the caller is at fault (as opposed to a collaborator or us).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::Forbidden { .. }
                | Self::InputTooLarge(_)
                | Self::NoSpeechDetected
        )
    }
}
