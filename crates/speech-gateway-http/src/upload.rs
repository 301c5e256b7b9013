//! Multipart extraction for audio uploads.

use axum::extract::Multipart;
use axum::http::StatusCode;
use speech_gateway_service::ServiceError;
use speech_gateway_service::pipeline::UploadedAudio;

fn multipart_error(err: &axum::extract::multipart::MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::InputTooLarge("upload exceeds the size limit".to_string())
    } else {
        ServiceError::InvalidInput(format!("malformed multipart body: {}", err.body_text()))
    }
}

/// Reads the first part named `field` into memory.
///
/// Other parts are skipped. Returns `None` when no such part exists.
pub async fn first_file(
    mut multipart: Multipart,
    field: &str,
) -> Result<Option<UploadedAudio>, ServiceError> {
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        if part.name() != Some(field) {
            continue;
        }
        let file_name = part.file_name().map(str::to_string);
        let bytes = part.bytes().await.map_err(|e| multipart_error(&e))?;
        return Ok(Some(UploadedAudio {
            file_name,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}
