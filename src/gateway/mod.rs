//! External gateway boundaries
//!
//! The engine consumes two remote services through narrow traits: a
//! generation gateway (streamed grounded answers plus raw-PCM speech) and a
//! translation gateway (text translation, speech synthesis, and speech
//! recognition). Wire shapes are validated into the explicit contracts below
//! at the gateway boundary; nothing upstream of this module sees raw JSON.

pub mod generation;
pub mod translation;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::Result;

/// A geographic position used to bias location-sensitive answers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Inline image attachment for a generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// MIME type (e.g. "image/jpeg")
    pub mime_type: String,
    /// Raw image bytes
    pub data: Vec<u8>,
}

/// Citation surfaced alongside generated text
///
/// Order-preserving; the engine never deduplicates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingRef {
    /// Human-readable source title, when the gateway provides one
    pub title: Option<String>,
    /// Link target
    pub uri: String,
}

/// One increment of streamed generation output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationChunk {
    /// Text delta to append to the in-flight assistant message
    pub text: String,
    /// Grounding references delivered with this increment
    pub grounding: Vec<GroundingRef>,
}

/// A single generation request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Shaped user prompt (language prefix already applied)
    pub prompt: String,
    /// System instruction
    pub system_instruction: String,
    /// Optional inline image
    pub image: Option<ImageData>,
    /// Optional position for geo-biased retrieval
    pub location: Option<GeoPoint>,
}

/// Boxed stream of generation increments
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk>> + Send>>;

/// Streamed grounded answer generation plus one-shot speech synthesis
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Start a streamed generation call
    ///
    /// Increments must be yielded in arrival order; callers apply them in
    /// receipt order without reordering or deduplication.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GenerationFailed`] if the call cannot be
    /// started; stream items carry per-increment failures.
    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream>;

    /// Synthesize speech, returning raw PCM (signed 16-bit, mono, 24 kHz)
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GenerationFailed`] on API failure,
    /// [`crate::Error::NoAudioContent`] when the response carries no audio
    /// payload.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

/// Text translation, speech synthesis, and speech recognition
#[async_trait]
pub trait TranslationGateway: Send + Sync {
    /// Whether credentials are present and the gateway is switched on
    fn is_configured(&self) -> bool;

    /// Translate text between two language codes
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TranslationUnavailable`] when unconfigured or
    /// on API failure; callers fall back to the untranslated text.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;

    /// Synthesize speech, returning base64-encoded audio in an
    /// upstream-chosen codec
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoAudioContent`] when the backend responds
    /// without audio, [`crate::Error::TranslationUnavailable`] otherwise.
    async fn synthesize(&self, text: &str, lang: &str) -> Result<String>;

    /// Transcribe a single WAV utterance
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TranslationUnavailable`] when unconfigured or
    /// on API failure.
    async fn transcribe(&self, wav: &[u8], lang: &str) -> Result<String>;
}
