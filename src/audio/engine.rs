//! Audio engine: the arbiter plus the speech collaborators.
//!
//! Speech output resolves when the utterance has finished (push completion);
//! speech input owns its own recognition timeout. Both run only while the
//! engine holds the matching [`ModeLease`], which is released on every path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use super::arbiter::{AudioModeArbiter, AudioModeConflict, ModeLease};
use crate::config::SpeechConfig;
use crate::types::AudioMode;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error(transparent)]
    Busy(#[from] AudioModeConflict),

    #[error("Speech output failed: {0}")]
    Output(String),

    #[error("Speech input failed: {0}")]
    Input(String),
}

/// Text-to-speech collaborator.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, resolving once playback has completed.
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Speech recognition collaborator.
#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// Capture a single utterance. `Ok(None)` when nothing was heard within
    /// `timeout`.
    async fn listen(&self, timeout: Duration) -> Result<Option<String>, SpeechError>;
}

// ============================================================================
// Engine
// ============================================================================

pub struct AudioEngine {
    arbiter: AudioModeArbiter,
    output: Arc<dyn SpeechOutput>,
    input: Arc<dyn SpeechInput>,
}

impl AudioEngine {
    pub fn new(output: Arc<dyn SpeechOutput>, input: Arc<dyn SpeechInput>) -> Self {
        Self {
            arbiter: AudioModeArbiter::new(),
            output,
            input,
        }
    }

    pub fn arbiter(&self) -> &AudioModeArbiter {
        &self.arbiter
    }

    pub fn mode(&self) -> AudioMode {
        self.arbiter.mode()
    }

    /// Claim the speaking mode now, to speak later with [`speak_reserved`].
    ///
    /// [`speak_reserved`]: Self::speak_reserved
    pub fn reserve_speech(&self) -> Result<ModeLease, AudioModeConflict> {
        self.arbiter.request_speak()
    }

    /// Speak under an already-held speaking lease, then release it.
    pub async fn speak_reserved(&self, lease: ModeLease, text: &str) -> Result<(), SpeechError> {
        debug_assert_eq!(lease.mode(), AudioMode::Speaking);
        let result = self.output.speak(text).await;
        drop(lease);
        result
    }

    /// Enter speaking, speak, return to idle.
    pub async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let lease = self.reserve_speech()?;
        self.speak_reserved(lease, text).await
    }

    /// Enter listening, capture one utterance, return to idle.
    pub async fn listen(&self, timeout: Duration) -> Result<Option<String>, SpeechError> {
        let lease = self.arbiter.request_listen()?;
        let result = self.input.listen(timeout).await;
        drop(lease);
        result
    }
}

// ============================================================================
// Built-in collaborators
// ============================================================================

/// Speaks through the log. Resolves after the time the utterance would take
/// at the configured speaking rate, unless pacing is disabled.
pub struct LogSpeaker {
    config: SpeechConfig,
    paced: bool,
}

impl LogSpeaker {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            config,
            paced: true,
        }
    }

    /// Resolve immediately instead of waiting out the estimated duration.
    pub fn instant(config: SpeechConfig) -> Self {
        Self {
            config,
            paced: false,
        }
    }

    pub fn estimated_duration(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as f64;
        Duration::from_secs_f64(words * 60.0 / f64::from(self.config.words_per_minute.max(1)))
    }
}

#[async_trait]
impl SpeechOutput for LogSpeaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        info!(
            voice = %self.config.voice,
            rate = self.config.rate,
            volume = self.config.volume,
            "[Speech] \"{}\"",
            text
        );
        if self.paced {
            tokio::time::sleep(self.estimated_duration(text)).await;
        }
        Ok(())
    }
}

/// Recognizer fed with ready-made transcripts through an `mpsc` channel
/// (stdin, tests). Each `listen` returns the next queued transcript, waiting
/// up to the timeout for one to arrive.
pub struct ChannelListener {
    rx: Mutex<mpsc::Receiver<String>>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { rx: Mutex::new(rx) }, tx)
    }
}

#[async_trait]
impl SpeechInput for ChannelListener {
    async fn listen(&self, timeout: Duration) -> Result<Option<String>, SpeechError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(text)) => Ok(Some(text)),
            Ok(None) => {
                debug!("[Speech] Transcript channel closed");
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}
