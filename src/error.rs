//! Error types for the Mitra engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Mitra engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Translation gateway unconfigured or failing (non-fatal, callers fall
    /// back to the untranslated text)
    #[error("translation unavailable: {0}")]
    TranslationUnavailable(String),

    /// Translation gateway returned no audio content for a TTS request
    #[error("no audio content returned")]
    NoAudioContent,

    /// Generation gateway failed (fatal to the current exchange only)
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Output audio device missing or unusable
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),

    /// Audio payload could not be decoded to playable samples
    #[error("audio decode failed: {0}")]
    DecodeFailed(String),

    /// Microphone access denied by the host
    #[error("microphone access denied: {0}")]
    MicrophoneDenied(String),

    /// Microphone missing or unusable
    #[error("microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    /// Geolocation lookup failed or timed out (callers degrade silently)
    #[error("geolocation unavailable: {0}")]
    GeolocationUnavailable(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
