//! Speech Gateway HTTP: REST transport adapter for the speech gateway.
//!
//! Provides:
//! - `POST /text-to-speech` and `POST /speech-to-text`, behind admission
//!   control (allow-list, daily and per-route quotas)
//! - `GET /health` and `GET /metrics`, never rate limited
//! - OpenAPI document and Swagger UI
//! - Request-ID propagation and access logging

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod upload;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{get, post};
use speech_gateway_service::admission::Route;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use error::ErrorBody;

pub use state::AppState;

// ---------------------------------------------------------------------------
// OpenAPI
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Speech Gateway API",
        description = "HTTP gateway in front of Azure Speech.\n\nConverts text to MP3 audio and transcribes uploaded audio files. Speech endpoints are subject to per-caller daily and per-minute quotas; callers presenting an allow-listed key bypass the quotas.",
        version = "0.1.0",
        license(name = "Apache-2.0"),
    ),
    paths(
        routes::speech::text_to_speech,
        routes::speech::speech_to_text,
        routes::system::health,
    ),
    components(
        schemas(
            types::TextToSpeechRequest, types::SpeechToTextUpload, types::SpeechToTextResponse,
            types::Transcript, types::HealthResponse, ErrorBody,
        )
    ),
    tags(
        (name = "Speech", description = "Speech synthesis and recognition"),
        (name = "System", description = "System and health endpoints"),
    )
)]
struct ApiDoc;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the HTTP API router.
pub fn router(state: AppState) -> Router {
    let text_body_limit = text_body_limit(state.pipeline().config().text_length_limit);
    let speech = Router::new()
        .route(
            Route::TextToSpeech.path(),
            post(routes::speech::text_to_speech).layer(DefaultBodyLimit::max(text_body_limit)),
        )
        .route(
            Route::SpeechToText.path(),
            post(routes::speech::speech_to_text)
                .layer(DefaultBodyLimit::max(state.upload_limit())),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admission::admission_middleware,
        ));

    let api = Router::new()
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics_endpoint))
        .merge(speech)
        .fallback(routes::system::not_found)
        .layer(cors_layer(&state))
        .with_state(state);

    api.merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(
            middleware::access_log::access_log_middleware,
        ))
}

/// Smallest JSON body cap for synthesis requests.
const MIN_TEXT_BODY_LIMIT: usize = 64 * 1024;

/// Body cap for `/text-to-speech`: room for `text_length_limit` characters
/// even when every one is JSON-escaped as a surrogate pair (12 bytes).
fn text_body_limit(text_length_limit: usize) -> usize {
    text_length_limit
        .saturating_mul(12)
        .max(MIN_TEXT_BODY_LIMIT)
}

/// Serve the HTTP router on the given listener with graceful shutdown.
///
/// Wraps `axum::serve` with `ConnectInfo<SocketAddr>` so callers without
/// a trusted IP header are identified by their peer address.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins = state.cors_origins();

    // No origins configured → no CORS headers (deny cross-origin by default).
    if origins.is_empty() {
        return CorsLayer::new();
    }

    let x_request_id = HeaderName::from_static("x-request-id");
    let mut allow_headers = vec![header::CONTENT_TYPE, x_request_id.clone()];
    if let Ok(key_header) = HeaderName::try_from(state.identity().key_header()) {
        allow_headers.push(key_header);
    }
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(allow_headers)
        .expose_headers([x_request_id, header::RETRY_AFTER]);

    if origins.len() == 1 && origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard origin, all cross-origin requests allowed");
        base.allow_origin(tower_http::cors::Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        base.allow_origin(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use speech_gateway_service::mock::{MockRecognizer, MockSynthesizer, MockTranscoder};
    use speech_gateway_service::pipeline::Collaborators;
    use speech_gateway_service::{ServiceConfig, ServiceState};
    use tower::ServiceExt;

    fn app(dir: &std::path::Path, route_limit: u64, synth: Arc<MockSynthesizer>) -> Router {
        let mut config = ServiceConfig::new(dir);
        config.route_limit_per_minute = route_limit;
        let service = ServiceState::new(
            &config,
            Collaborators {
                transcoder: Arc::new(MockTranscoder::passthrough()),
                recognizer: Arc::new(MockRecognizer::recognizing("hi")),
                synthesizer: synth,
            },
        )
        .unwrap();
        router(AppState::new(service, vec![], 1024))
    }

    fn tts(ip: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/text-to-speech")
            .header("content-type", "application/json")
            .header("x-real-ip", ip)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn synthesizes_mp3() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(MockSynthesizer::producing(b"ID3"));
        let response = app(dir.path(), 5, synth.clone())
            .oneshot(tts("10.0.0.1", r#"{"text":"hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "audio/mpeg");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ID3");
        assert_eq!(synth.calls(), 1);
    }

    #[tokio::test]
    async fn route_quota_is_enforced_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1, Arc::new(MockSynthesizer::producing(b"a")));

        let first = app.clone().oneshot(tts("1.1.1.1", r#"{"text":"a"}"#)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.clone().oneshot(tts("1.1.1.1", r#"{"text":"a"}"#)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));
        let other = app.oneshot(tts("2.2.2.2", r#"{"text":"a"}"#)).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_not_rate_limited() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1, Arc::new(MockSynthesizer::producing(b"a")));
        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(MockSynthesizer::producing(b"a"));
        let response = app(dir.path(), 5, synth.clone())
            .oneshot(tts("10.0.0.1", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(synth.calls(), 0);
    }

    #[tokio::test]
    async fn oversized_json_body_is_rejected_before_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(MockSynthesizer::producing(b"a"));
        let text = "a".repeat(MIN_TEXT_BODY_LIMIT * 2);
        let body = format!(r#"{{"text":"{text}"}}"#);
        let response = app(dir.path(), 5, synth.clone())
            .oneshot(tts("10.0.0.1", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "input-too-large");
        assert_eq!(synth.calls(), 0);
    }

    #[test]
    fn text_body_limit_scales_with_text_limit() {
        assert_eq!(text_body_limit(2000), MIN_TEXT_BODY_LIMIT);
        assert_eq!(text_body_limit(100_000), 1_200_000);
    }

    #[tokio::test]
    async fn unknown_path_is_json_404() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), 5, Arc::new(MockSynthesizer::producing(b"a")))
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "not-found");
    }

    #[test]
    fn openapi_lists_speech_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/text-to-speech"));
        assert!(doc.paths.paths.contains_key("/speech-to-text"));
    }
}
