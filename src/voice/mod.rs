//! Voice processing module
//!
//! Handles microphone capture, utterance recognition, input visualization,
//! and speaker playback. Speech-to-text and text-to-speech are routed
//! through the gateways (see `gateway/`).

mod capture;
mod playback;
mod recognize;
mod visualizer;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::{
    AudioBuffer, AudioOutput, AudioPlayback, PLAYBACK_SAMPLE_RATE, PlaybackHandle, decode_audio,
    decode_pcm16,
};
pub use recognize::{DetectorState, Recognizer, UtteranceDetector};
pub use visualizer::{BIN_COUNT, SpectrumSink, Visualizer};
