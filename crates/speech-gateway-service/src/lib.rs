//! Speech Gateway Service: core logic for the speech gateway.
//!
//! This crate contains all transport-agnostic logic: caller identity
//! resolution, quota accounting, admission control, request-scoped temp
//! files, and the speech-to-text / text-to-speech pipeline together with
//! its external collaborators (ffmpeg, Azure Speech).
//!
//! **Zero transport dependencies**: no axum, no HTTP types.

pub mod admission;
pub mod allow_list;
pub mod azure;
pub mod collaborator;
pub mod error;
pub mod ffmpeg;
pub mod identity;
pub mod metrics;
pub mod mock;
pub mod pipeline;
pub mod quota;
pub mod temp;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use admission::AdmissionController;
use allow_list::AllowList;
use identity::IdentityResolver;
use metrics::{Gauges, Metrics};
use pipeline::{Collaborators, MediaPipeline, PipelineConfig};
use temp::TempResourceManager;

pub use error::ServiceError;

/// Slack added to the pipeline budget before a foreign temp file is stale.
const STALE_TEMP_MARGIN: Duration = Duration::from_secs(60);

/// Configuration subset relevant to the service layer.
///
/// Transport-specific config (ports, CORS origins, body limits) stays in
/// the binary crate's `Config` struct.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub ip_header: String,
    pub key_header: String,
    pub allow_list: Vec<String>,
    /// Per-route, per-minute admissions (0 = unlimited).
    pub route_limit_per_minute: u64,
    /// Per-day admissions across all routes (0 = unlimited).
    pub daily_limit: u64,
    pub text_length_limit: usize,
    pub temp_dir: PathBuf,
    pub collaborator_timeout: Duration,
    pub default_voice: String,
    pub recognition_language: String,
}

impl ServiceConfig {
    /// Defaults matching the CLI, rooted at `temp_dir`.
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            ip_header: "x-real-ip".to_string(),
            key_header: "x-api-key".to_string(),
            allow_list: Vec::new(),
            route_limit_per_minute: 5,
            daily_limit: 100,
            text_length_limit: 2000,
            temp_dir: temp_dir.into(),
            collaborator_timeout: Duration::from_secs(30),
            default_voice: "zh-CN-XiaoyiNeural".to_string(),
            recognition_language: "zh-CN".to_string(),
        }
    }
}

/// Shared service state, cloneable across all transport handlers.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<Inner>,
}

struct Inner {
    identity: IdentityResolver,
    admission: AdmissionController,
    pipeline: MediaPipeline,
    metrics: Metrics,
    start_time: Instant,
}

impl ServiceState {
    /// Creates the service state. Fails only if the temp directory cannot
    /// be created.
    pub fn new(config: &ServiceConfig, collaborators: Collaborators) -> std::io::Result<Self> {
        let temp = TempResourceManager::new(&config.temp_dir)?;
        let admission = AdmissionController::with_limits(
            AllowList::new(config.allow_list.iter().cloned()),
            config.route_limit_per_minute,
            config.daily_limit,
        );
        let pipeline = MediaPipeline::new(
            temp,
            collaborators,
            PipelineConfig {
                recognition_language: config.recognition_language.clone(),
                default_voice: config.default_voice.clone(),
                text_length_limit: config.text_length_limit,
                collaborator_timeout: config.collaborator_timeout,
            },
        );

        Ok(Self {
            inner: Arc::new(Inner {
                identity: IdentityResolver::new(&config.ip_header, &config.key_header),
                admission,
                pipeline,
                metrics: Metrics::new(),
                start_time: Instant::now(),
            }),
        })
    }

    // --- Accessors ---

    pub fn identity(&self) -> &IdentityResolver {
        &self.inner.identity
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    pub fn pipeline(&self) -> &MediaPipeline {
        &self.inner.pipeline
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    // --- Maintenance ---

    /// Drop stale quota counters. Returns count removed.
    pub fn sweep_quotas(&self) -> usize {
        self.inner.admission.sweep(Instant::now())
    }

    /// Remove temp files left behind by a previous process.
    ///
    /// Files younger than [`stale_temp_age`](Self::stale_temp_age) may
    /// still belong to a draining process and are kept.
    pub fn purge_stale_temp_files(&self) -> std::io::Result<usize> {
        self.inner.pipeline.temp().purge_stale(self.stale_temp_age())
    }

    /// Age past which a foreign temp file cannot belong to a live request:
    /// a speech-to-text call makes two bounded collaborator calls, so twice
    /// the budget plus a margin.
    pub fn stale_temp_age(&self) -> Duration {
        self.inner.pipeline.config().collaborator_timeout * 2 + STALE_TEMP_MARGIN
    }

    /// Prometheus text for all counters and gauges.
    pub fn render_metrics(&self) -> String {
        self.inner.metrics.render(&Gauges {
            live_temp_resources: self.inner.pipeline.temp().live(),
            quota_entries: self.inner.admission.tracked_entries(),
            uptime_seconds: self.uptime_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::Route;
    use crate::mock::{MockRecognizer, MockSynthesizer, MockTranscoder};

    fn state(config: &ServiceConfig) -> ServiceState {
        ServiceState::new(
            config,
            Collaborators {
                transcoder: Arc::new(MockTranscoder::passthrough()),
                recognizer: Arc::new(MockRecognizer::recognizing("ok")),
                synthesizer: Arc::new(MockSynthesizer::producing(b"mp3")),
            },
        )
        .unwrap()
    }

    #[test]
    fn config_flows_into_components() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::new(dir.path().join("tmp"));
        config.ip_header = "X-Forwarded-For".to_string();
        config.allow_list = vec!["k1".to_string(), String::new()];
        config.text_length_limit = 7;

        let state = state(&config);
        assert!(dir.path().join("tmp").is_dir());
        assert_eq!(state.identity().ip_header(), "x-forwarded-for");
        assert_eq!(state.admission().allow_list().len(), 1);
        assert_eq!(state.pipeline().config().text_length_limit, 7);
    }

    #[test]
    fn metrics_render_reflects_quota_entries() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&ServiceConfig::new(dir.path()));
        state.admission().admit(Route::TextToSpeech, "alice", None);
        let text = state.render_metrics();
        assert!(text.contains("speech_gateway_quota_entries 2"));
        assert_eq!(state.sweep_quotas(), 0);
    }

    #[test]
    fn startup_purge_keeps_files_younger_than_the_pipeline_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::new(dir.path());
        config.collaborator_timeout = Duration::from_secs(10);
        let state = state(&config);
        assert_eq!(state.stale_temp_age(), Duration::from_secs(80));

        let draining = dir
            .path()
            .join(format!("sgw-{}-3.wav", std::process::id() + 1));
        std::fs::write(&draining, b"in flight").unwrap();
        assert_eq!(state.purge_stale_temp_files().unwrap(), 0);
        assert!(draining.exists());
    }
}
