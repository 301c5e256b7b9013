//! In-process collaborators for tests and local runs without credentials.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::collaborator::{
    OutputFormat, Recognizer, SpeechOutcome, Synthesizer, TargetFormat, TranscodeError,
    Transcoder,
};

/// Copies the input to the output, optionally after a delay, or fails.
pub struct MockTranscoder {
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockTranscoder {
    pub fn passthrough() -> Self {
        Self {
            fail: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::passthrough()
        }
    }

    /// Sleeps for `delay` before copying; used to exercise timeouts.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::passthrough()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _format: TargetFormat,
    ) -> Result<(), TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(TranscodeError::Exited {
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        tokio::fs::copy(input, output)
            .await
            .map(|_| ())
            .map_err(TranscodeError::Spawn)
    }
}

/// Returns a fixed outcome, optionally after a delay, and counts calls.
pub struct MockRecognizer {
    outcome: Mutex<SpeechOutcome<String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockRecognizer {
    pub fn new(outcome: SpeechOutcome<String>) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn recognizing(text: &str) -> Self {
        Self::new(SpeechOutcome::Completed(text.to_string()))
    }

    /// Sleeps for `delay` before answering; used to exercise timeouts.
    pub fn slow(text: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::recognizing(text)
        }
    }

    pub fn set_outcome(&self, outcome: SpeechOutcome<String>) {
        *self.outcome.lock() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(&self, _audio: Vec<u8>, _language: &str) -> SpeechOutcome<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.lock().clone()
    }
}

/// Returns a fixed outcome, optionally after a delay, and counts calls.
pub struct MockSynthesizer {
    outcome: Mutex<SpeechOutcome<Vec<u8>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new(outcome: SpeechOutcome<Vec<u8>>) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn producing(audio: &[u8]) -> Self {
        Self::new(SpeechOutcome::Completed(audio.to_vec()))
    }

    pub fn slow(audio: &[u8], delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::producing(audio)
        }
    }

    pub fn set_outcome(&self, outcome: SpeechOutcome<Vec<u8>>) {
        *self.outcome.lock() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: &str,
        _format: OutputFormat,
    ) -> SpeechOutcome<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.lock().clone()
    }
}
