//! Speech recognition
//!
//! Captures one spoken utterance, finds its end by energy and trailing
//! silence, and transcribes it through the translation gateway's ASR
//! pipeline. A session yields at most one transcript; after delivering it
//! (or failing) the session stops itself.

use std::sync::Arc;

use crate::gateway::TranslationGateway;
use crate::voice::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to accept (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration marking end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// State of the utterance detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Detected speech, accumulating until trailing silence
    Listening,
}

/// Segments one utterance out of a live sample stream
pub struct UtteranceDetector {
    state: DetectorState,
    speech_buffer: Vec<f32>,
    speech_samples: usize,
    silence_counter: usize,
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            speech_samples: 0,
            silence_counter: 0,
        }
    }

    /// Process audio samples
    ///
    /// Returns true once the utterance is complete: enough speech followed
    /// by enough silence
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            DetectorState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                tracing::trace!(
                    buffer_len = self.speech_buffer.len(),
                    speech = self.speech_samples,
                    silence = self.silence_counter,
                    is_speech,
                    energy,
                    "listening state"
                );

                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_samples > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(
                        samples = self.speech_buffer.len(),
                        "utterance complete"
                    );
                    return true;
                }

                // Too much silence without enough speech: likely a noise
                // blip, start over
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("timeout - resetting");
                    self.reset();
                }
            }
        }

        false
    }

    /// Take the accumulated utterance, clearing it
    pub fn take_utterance(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.speech_buffer)
    }

    /// Reset to idle
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.speech_samples = 0;
        self.silence_counter = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot speech recognition session over the microphone
pub struct Recognizer {
    capture: AudioCapture,
    detector: UtteranceDetector,
    gateway: Arc<dyn TranslationGateway>,
    lang: String,
    active: bool,
}

impl Recognizer {
    /// Create a recognizer transcribing through the given gateway
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device is present
    pub fn new(gateway: Arc<dyn TranslationGateway>) -> Result<Self> {
        Ok(Self {
            capture: AudioCapture::new()?,
            detector: UtteranceDetector::new(),
            gateway,
            lang: String::new(),
            active: false,
        })
    }

    /// Start a recognition session in the given language
    ///
    /// A session already in progress is discarded first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] when no ASR pipeline is configured,
    /// or a microphone error when the stream cannot be opened
    pub fn start(&mut self, lang: &str) -> Result<()> {
        if !self.gateway.is_configured() {
            return Err(Error::Recognition(
                "no ASR pipeline configured".to_string(),
            ));
        }

        self.stop();
        self.capture.start()?;
        self.lang = lang.to_string();
        self.active = true;

        tracing::debug!(lang, "recognition session started");
        Ok(())
    }

    /// Stop the session, discarding any partial utterance
    pub fn stop(&mut self) {
        self.capture.stop();
        self.capture.clear_buffer();
        self.detector.reset();
        self.active = false;
    }

    /// Whether a session is in progress
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Feed freshly captured audio through the detector; once the
    /// utterance completes, transcribe it and end the session
    ///
    /// Call periodically while the session is active. Returns the final
    /// transcript at most once per session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] if transcription fails; the session
    /// is already stopped when that happens
    pub async fn poll(&mut self) -> Result<Option<String>> {
        if !self.active {
            return Ok(None);
        }

        let samples = self.capture.take_buffer();
        if samples.is_empty() || !self.detector.process(&samples) {
            return Ok(None);
        }

        let utterance = self.detector.take_utterance();
        self.stop();

        let wav = samples_to_wav(&utterance, SAMPLE_RATE)?;
        let transcript = self
            .gateway
            .transcribe(&wav, &self.lang)
            .await
            .map_err(|e| Error::Recognition(e.to_string()))?;

        tracing::debug!(chars = transcript.len(), "transcript received");
        Ok(Some(transcript))
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(calculate_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(calculate_energy(&loud) > 0.4);
    }

    #[test]
    fn test_detector_segments_speech_then_silence() {
        let mut detector = UtteranceDetector::new();

        // Quiet input keeps the detector idle
        assert!(!detector.process(&vec![0.0; 1600]));
        assert_eq!(detector.state(), DetectorState::Idle);

        // Half a second of speech
        for _ in 0..5 {
            assert!(!detector.process(&vec![0.2; 1600]));
        }
        assert_eq!(detector.state(), DetectorState::Listening);

        // Silence under the end-of-utterance threshold does not complete
        for _ in 0..5 {
            assert!(!detector.process(&vec![0.0; 1600]));
        }

        // Crossing the threshold completes the utterance
        assert!(detector.process(&vec![0.0; 1600]));
        assert!(detector.take_utterance().len() > MIN_SPEECH_SAMPLES);
    }

    #[test]
    fn test_detector_resets_on_noise_blip() {
        let mut detector = UtteranceDetector::new();

        // A single loud chunk, too short to count as speech
        detector.process(&vec![0.2; 1600]);
        assert_eq!(detector.state(), DetectorState::Listening);

        // A second of silence times the blip out
        for _ in 0..11 {
            detector.process(&vec![0.0; 1600]);
        }
        assert_eq!(detector.state(), DetectorState::Idle);
    }
}
