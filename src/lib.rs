//! Speech Gateway: HTTP front end for Azure Speech with per-caller quotas.
//!
//! The core (admission control, temp files, media pipeline) lives in
//! `speech-gateway-service`; the REST transport in `speech-gateway-http`.
//! This crate wires them together from CLI/env configuration.

pub mod config;

use std::sync::Arc;

use speech_gateway_service::ServiceState;
use speech_gateway_service::azure::AzureSpeech;
use speech_gateway_service::ffmpeg::FfmpegTranscoder;
use speech_gateway_service::pipeline::Collaborators;

pub use speech_gateway_http::{AppState, router, serve};

use config::Config;

/// Production collaborators: ffmpeg for transcoding, Azure for speech.
pub fn collaborators(config: &Config) -> Collaborators {
    let azure = Arc::new(AzureSpeech::new(
        config.azure_key.clone(),
        &config.azure_region,
    ));
    Collaborators {
        transcoder: Arc::new(FfmpegTranscoder::new(&config.ffmpeg_path)),
        recognizer: azure.clone(),
        synthesizer: azure,
    }
}

/// Builds the HTTP state. Fails only if the temp directory cannot be
/// created.
pub fn app_state(config: &Config, collaborators: Collaborators) -> std::io::Result<AppState> {
    let service = ServiceState::new(&config.service_config(), collaborators)?;
    Ok(AppState::new(
        service,
        config.cors_origins.clone(),
        config.upload_size_limit,
    ))
}
