//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /text-to-speech`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TextToSpeechRequest {
    /// Text to synthesize. Trimmed; must be non-empty.
    #[serde(default)]
    pub text: Option<String>,
    /// Voice name (e.g. "en-US-JennyNeural"). Defaults to the server's voice.
    #[serde(default)]
    pub voice: Option<String>,
}

/// Multipart form of `POST /speech-to-text`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct SpeechToTextUpload {
    /// Audio file in any format ffmpeg can decode.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Transcript {
    pub text: String,
}

/// Response of `POST /speech-to-text`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SpeechToTextResponse {
    pub data: Transcript,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Temp files currently held by in-flight requests.
    pub live_temp_resources: usize,
    /// Tracked quota counters.
    pub quota_entries: usize,
}
