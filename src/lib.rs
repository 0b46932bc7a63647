//! Mitra Engine - Multilingual citizen-assistance chat
//!
//! This library provides the core functionality for the Mitra assistant:
//! - Conversation orchestration with streamed, grounded answers
//! - Translation round-trips between the pivot language and Indian languages
//! - Voice input (utterance recognition) and spoken replies
//! - Microphone visualization and speaker playback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      CLI (mitra)                     │
//! │   chat loop  │  record toggle  │  device self-tests  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Chat Session                       │
//! │   orchestrator  │  playback selector  │  notices     │
//! └──────┬──────────────────┬──────────────────┬─────────┘
//!        │                  │                  │
//! ┌──────▼──────┐   ┌───────▼───────┐   ┌──────▼──────┐
//! │  Generation  │   │  Translation  │   │    Voice    │
//! │  (Gemini)    │   │  (Bhashini)   │   │ capture/out │
//! └─────────────┘   └───────────────┘   └─────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod geo;
pub mod lang;
pub mod prompt;
pub mod voice;

pub use chat::{ChatSession, Engine, Message, Notice, Role, Severity};
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{
    GenerationChunk, GenerationGateway, GenerationRequest, GenerationStream, GeoPoint,
    GroundingRef, ImageData, TranslationGateway,
};
pub use gateway::{generation::GeminiClient, translation::BhashiniClient};
pub use geo::{IpLocationProvider, LocationProvider};
pub use voice::{
    AudioBuffer, AudioCapture, AudioOutput, AudioPlayback, PlaybackHandle, Recognizer,
    SpectrumSink, Visualizer,
};
