//! Speech endpoints: text-to-speech and speech-to-text.

use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use speech_gateway_service::ServiceError;
use speech_gateway_service::admission::Route;
use speech_gateway_service::collaborator::OutputFormat;
use speech_gateway_service::identity::Caller;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{SpeechToTextResponse, TextToSpeechRequest, Transcript};
use crate::upload::first_file;

/// Longest input excerpt written to logs.
const PREVIEW_CHARS: usize = 64;

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().nth(PREVIEW_CHARS).is_some() {
        out.push_str("...");
    }
    out
}

fn log_failure(caller: &Caller, route: Route, input: &str, err: &ServiceError) {
    if err.is_client_fault() {
        tracing::info!(
            identity = %caller.identity,
            route = route.label(),
            input = %input,
            code = err.code(),
            "request failed: {err}"
        );
    } else {
        tracing::error!(
            identity = %caller.identity,
            route = route.label(),
            input = %input,
            code = err.code(),
            "request failed: {err}"
        );
    }
}

/// Synthesize speech from text.
///
/// Returns MP3 audio (16 kHz mono). The voice defaults to the server's
/// configured voice when omitted.
#[utoipa::path(
    post,
    path = "/text-to-speech",
    request_body = TextToSpeechRequest,
    responses(
        (status = 200, description = "Synthesized audio", content_type = "audio/mpeg", body = Vec<u8>),
        (status = 400, description = "Missing or invalid text or voice", body = crate::error::ErrorBody),
        (status = 403, description = "Key not allow-listed", body = crate::error::ErrorBody),
        (status = 413, description = "Text too long", body = crate::error::ErrorBody),
        (status = 429, description = "Quota exceeded", body = crate::error::ErrorBody),
        (status = 502, description = "Synthesis failed", body = crate::error::ErrorBody),
    ),
    tag = "Speech"
)]
pub async fn text_to_speech(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<TextToSpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = synthesize(&state, payload).await;
    state
        .metrics()
        .record_operation(Route::TextToSpeech, result.is_ok(), started.elapsed());

    match result {
        Ok(audio) => Ok((
            [(header::CONTENT_TYPE, OutputFormat::Mp3Mono16k.content_type())],
            audio,
        )
            .into_response()),
        Err((input, err)) => {
            log_failure(&caller, Route::TextToSpeech, &preview(&input), &err);
            Err(err.into())
        }
    }
}

/// Returns the input text alongside any error so the failure can be logged.
async fn synthesize(
    state: &AppState,
    payload: Result<Json<TextToSpeechRequest>, JsonRejection>,
) -> Result<Vec<u8>, (String, ServiceError)> {
    let Json(request) = payload.map_err(|rejection| {
        let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServiceError::InputTooLarge("request body exceeds the size limit".to_string())
        } else {
            ServiceError::InvalidInput(format!("invalid JSON body: {}", rejection.body_text()))
        };
        (String::new(), err)
    })?;
    let text = request.text.unwrap_or_default();
    state
        .pipeline()
        .text_to_speech(&text, request.voice.as_deref())
        .await
        .map_err(|err| (text, err))
}

/// Transcribe an uploaded audio file.
///
/// The upload goes in the multipart field `file`. Any format ffmpeg can
/// decode is accepted; it is normalized to 16 kHz mono WAV before
/// recognition.
#[utoipa::path(
    post,
    path = "/speech-to-text",
    request_body(content = crate::types::SpeechToTextUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Recognized text", body = SpeechToTextResponse),
        (status = 400, description = "Missing or empty file", body = crate::error::ErrorBody),
        (status = 403, description = "Key not allow-listed", body = crate::error::ErrorBody),
        (status = 413, description = "Upload too large", body = crate::error::ErrorBody),
        (status = 422, description = "No speech detected", body = crate::error::ErrorBody),
        (status = 429, description = "Quota exceeded", body = crate::error::ErrorBody),
        (status = 502, description = "Transcoding or recognition failed", body = crate::error::ErrorBody),
    ),
    tag = "Speech"
)]
pub async fn speech_to_text(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SpeechToTextResponse>, ApiError> {
    let started = Instant::now();
    let result = transcribe(&state, multipart).await;
    state
        .metrics()
        .record_operation(Route::SpeechToText, result.is_ok(), started.elapsed());

    match result {
        Ok(text) => Ok(Json(SpeechToTextResponse {
            data: Transcript { text },
        })),
        Err((input, err)) => {
            log_failure(&caller, Route::SpeechToText, &input, &err);
            Err(err.into())
        }
    }
}

/// Returns a description of the upload alongside any error.
async fn transcribe(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, (String, ServiceError)> {
    let multipart = multipart.map_err(|rejection| {
        (
            String::new(),
            ServiceError::InvalidInput(format!("expected multipart form: {}", rejection.body_text())),
        )
    })?;
    let upload = first_file(multipart, "file")
        .await
        .map_err(|err| (String::new(), err))?
        .ok_or_else(|| {
            (
                String::new(),
                ServiceError::InvalidInput("missing file field".to_string()),
            )
        })?;

    let described = format!(
        "{} ({} bytes)",
        preview(upload.file_name.as_deref().unwrap_or("<unnamed>")),
        upload.bytes.len()
    );
    state
        .pipeline()
        .speech_to_text(&upload)
        .await
        .map_err(|err| (described, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_by_chars() {
        assert_eq!(preview("short"), "short");
        let long = "语".repeat(100);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview(&"a".repeat(PREVIEW_CHARS)), "a".repeat(PREVIEW_CHARS));
    }
}
