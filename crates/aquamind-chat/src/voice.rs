//! Voice capture as a two-phase start/stop operation.
//!
//! Lifecycle:
//! - Idle -> Recording (begin)
//! - Recording -> Transcribing (end, hand audio to the recognizer)
//! - Transcribing -> Idle (recognition finished, success or failure)
//! - Recording -> Idle (cancel)
//!
//! Speech recognition itself lives behind [`SpeechRecognizer`]. The
//! "recording" flag is true only in `Recording` and is released on every
//! exit path, including a recognizer that fails or panics.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use aquamind_core::types::CaptureId;

use crate::error::ChatError;
use crate::input::{InputCapture, NormalizedQuery};

/// Sample rate assumed for pushed audio.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Operational state of a voice capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureState {
    /// No capture in progress.
    Idle,
    /// Microphone open, audio being buffered.
    Recording,
    /// Buffered audio handed to the recognizer.
    Transcribing,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Recording => write!(f, "Recording"),
            CaptureState::Transcribing => write!(f, "Transcribing"),
        }
    }
}

impl CaptureState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &CaptureState) -> bool {
        matches!(
            (self, target),
            (CaptureState::Idle, CaptureState::Recording)
                | (CaptureState::Recording, CaptureState::Transcribing)
                | (CaptureState::Transcribing, CaptureState::Idle)
                // Cancel
                | (CaptureState::Recording, CaptureState::Idle)
        )
    }
}

/// Converts captured audio into text.
///
/// `Ok(None)` means the audio held no recognizable speech.
pub trait SpeechRecognizer: Send + Sync {
    fn recognize(&self, samples: &[f32], sample_rate: u32) -> Result<Option<String>, ChatError>;
}

impl<F> SpeechRecognizer for F
where
    F: Fn(&[f32], u32) -> Result<Option<String>, ChatError> + Send + Sync,
{
    fn recognize(&self, samples: &[f32], sample_rate: u32) -> Result<Option<String>, ChatError> {
        self(samples, sample_rate)
    }
}

/// Recognizer that returns a fixed transcript regardless of the audio.
///
/// Stands in for a real speech-to-text service in demos and tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    transcript: Option<String>,
}

impl ScriptedRecognizer {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: Some(transcript.into()),
        }
    }

    /// A recognizer that never hears anything.
    pub fn silent() -> Self {
        Self { transcript: None }
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn recognize(&self, _samples: &[f32], _sample_rate: u32) -> Result<Option<String>, ChatError> {
        Ok(self.transcript.clone())
    }
}

/// Returned by [`VoiceCapture::begin`]; identifies the capture to end or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureHandle {
    pub id: CaptureId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ActiveCapture {
    id: CaptureId,
    started_at: DateTime<Utc>,
    samples: Vec<f32>,
}

impl ActiveCapture {
    fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }
}

#[derive(Debug)]
struct Inner {
    state: CaptureState,
    active: Option<ActiveCapture>,
}

impl Inner {
    fn transition(&mut self, target: CaptureState) -> Result<(), ChatError> {
        if self.state.can_transition_to(&target) {
            tracing::debug!("Voice capture state: {} -> {}", self.state, target);
            self.state = target;
            Ok(())
        } else if target == CaptureState::Recording {
            Err(ChatError::CaptureAlreadyActive)
        } else {
            Err(ChatError::InvalidCaptureTransition {
                from: self.state,
                to: target,
            })
        }
    }

    /// Detach the active capture if `id` names it.
    fn take_matching(&mut self, id: CaptureId) -> Result<ActiveCapture, ChatError> {
        match self.active.take() {
            Some(capture) if capture.id == id => Ok(capture),
            other => {
                self.active = other;
                Err(ChatError::CaptureNotActive(id))
            }
        }
    }
}

/// Returns the capture to `Idle` when dropped.
struct ReleaseOnDrop<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state = CaptureState::Idle;
        inner.active = None;
    }
}

/// Voice input for one session.
pub struct VoiceCapture {
    inner: Mutex<Inner>,
    recognizer: Arc<dyn SpeechRecognizer>,
    input: InputCapture,
    max_duration: Duration,
}

impl fmt::Debug for VoiceCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceCapture")
            .field("inner", &self.inner)
            .field("input", &self.input)
            .field("max_duration", &self.max_duration)
            .finish()
    }
}

impl VoiceCapture {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        input: InputCapture,
        max_duration: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CaptureState::Idle,
                active: None,
            }),
            recognizer,
            input,
            max_duration,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    /// True exactly while audio is being recorded.
    pub fn is_recording(&self) -> bool {
        self.state() == CaptureState::Recording
    }

    /// Id of the capture currently recording, if any.
    pub fn active_id(&self) -> Option<CaptureId> {
        let inner = self.lock();
        match inner.state {
            CaptureState::Recording => inner.active.as_ref().map(|c| c.id),
            _ => None,
        }
    }

    /// Open the microphone. Fails with `CaptureAlreadyActive` if a capture is
    /// recording or still being transcribed.
    pub fn begin(&self) -> Result<CaptureHandle, ChatError> {
        let mut inner = self.lock();
        inner.transition(CaptureState::Recording)?;

        let capture = ActiveCapture {
            id: CaptureId::new(),
            started_at: Utc::now(),
            samples: Vec::new(),
        };
        let handle = CaptureHandle {
            id: capture.id,
            started_at: capture.started_at,
        };
        inner.active = Some(capture);

        tracing::info!(capture_id = %handle.id, "Voice capture started");
        Ok(handle)
    }

    /// Buffer audio for the recording capture.
    pub fn push_audio(&self, id: CaptureId, samples: &[f32]) -> Result<(), ChatError> {
        let mut inner = self.lock();
        if inner.state != CaptureState::Recording {
            return Err(ChatError::CaptureNotActive(id));
        }
        match inner.active.as_mut() {
            Some(capture) if capture.id == id => {
                capture.samples.extend_from_slice(samples);
                Ok(())
            }
            _ => Err(ChatError::CaptureNotActive(id)),
        }
    }

    /// Stop recording and recognize the buffered audio.
    ///
    /// The recording flag is false when this returns, whatever the outcome.
    /// Fails with `NoSpeechDetected` when the recognizer hears nothing.
    pub fn end(&self, id: CaptureId) -> Result<NormalizedQuery, ChatError> {
        let capture = {
            let mut inner = self.lock();
            if inner.state != CaptureState::Recording {
                return Err(ChatError::CaptureNotActive(id));
            }
            let capture = inner.take_matching(id)?;
            inner.transition(CaptureState::Transcribing)?;
            capture
        };
        let _release = ReleaseOnDrop { inner: &self.inner };

        let elapsed = capture.elapsed();
        if elapsed > self.max_duration {
            tracing::warn!(
                capture_id = %id,
                elapsed_secs = elapsed.as_secs_f32(),
                max_secs = self.max_duration.as_secs(),
                "Voice capture exceeded maximum duration"
            );
        }
        tracing::info!(
            capture_id = %id,
            elapsed_secs = elapsed.as_secs_f32(),
            samples = capture.samples.len(),
            "Recognizing voice capture"
        );

        match self.recognizer.recognize(&capture.samples, DEFAULT_SAMPLE_RATE)? {
            Some(text) => self.input.submit_transcript(&text),
            None => {
                tracing::debug!(capture_id = %id, "No speech detected");
                Err(ChatError::NoSpeechDetected)
            }
        }
    }

    /// Abandon the recording capture, discarding its audio.
    pub fn cancel(&self, id: CaptureId) -> Result<(), ChatError> {
        let mut inner = self.lock();
        if inner.state != CaptureState::Recording {
            return Err(ChatError::CaptureNotActive(id));
        }
        let capture = inner.take_matching(id)?;
        inner.transition(CaptureState::Idle)?;
        tracing::info!(
            capture_id = %capture.id,
            discarded_samples = capture.samples.len(),
            "Voice capture cancelled"
        );
        Ok(())
    }

    /// Cancel a recording that has run past the maximum duration.
    ///
    /// Returns the id of the abandoned capture, if one was cancelled.
    pub fn cancel_if_expired(&self) -> Option<CaptureId> {
        let id = {
            let inner = self.lock();
            match (&inner.state, inner.active.as_ref()) {
                (CaptureState::Recording, Some(c)) if c.elapsed() > self.max_duration => c.id,
                _ => return None,
            }
        };
        match self.cancel(id) {
            Ok(()) => {
                tracing::warn!(capture_id = %id, "Abandoned voice capture expired");
                Some(id)
            }
            Err(_) => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
