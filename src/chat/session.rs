//! Conversation session
//!
//! Owns the message list and executes one exchange per user action:
//! optional translation into the pivot language, a streamed generation
//! call, and optional translation back into the target language. Exactly
//! one exchange runs at a time; sends during an exchange are ignored.
//! Also selects the text-to-speech path for spoken replies and tracks
//! which message is playing.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use futures::StreamExt;

use crate::chat::{Engine, Message, Notice};
use crate::config::Config;
use crate::gateway::{
    GenerationGateway, GenerationRequest, GeoPoint, ImageData, TranslationGateway,
};
use crate::geo::LocationProvider;
use crate::voice::{AudioOutput, PLAYBACK_SAMPLE_RATE, PlaybackHandle, decode_audio, decode_pcm16};
use crate::{Error, Result, lang, prompt};

/// Voice identities the generation gateway can synthesize with
pub const VOICES: &[&str] = &["Kore", "Puck", "Charon", "Zephyr", "Fenrir"];

/// Shown when an exchange fails outright
pub const CONNECTION_NOTICE: &str =
    "Interaction interrupted. Please check your internet connection.";

/// Shown when speech synthesis or playback fails
pub const PLAYBACK_NOTICE: &str = "Voice playback failed. Please try again.";

/// The message currently sounding from the speakers
struct Playing {
    message_id: String,
    handle: PlaybackHandle,
}

/// One conversation with the assistant
pub struct ChatSession {
    config: Config,
    generation: Arc<dyn GenerationGateway>,
    translation: Arc<dyn TranslationGateway>,
    location: Arc<dyn LocationProvider>,
    output: Box<dyn AudioOutput>,
    messages: Vec<Message>,
    pending_image: Option<ImageData>,
    in_flight: bool,
    playing: Option<Playing>,
    cached_location: Option<GeoPoint>,
    notice: Option<Notice>,
    target_lang: String,
    voice: String,
}

impl ChatSession {
    /// Create a session seeded with the greeting message
    #[must_use]
    pub fn new(
        config: Config,
        generation: Arc<dyn GenerationGateway>,
        translation: Arc<dyn TranslationGateway>,
        location: Arc<dyn LocationProvider>,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        let target_lang = config.language.target.clone();
        let voice = config.language.voice.clone();

        Self {
            config,
            generation,
            translation,
            location,
            output,
            messages: vec![Message::greeting()],
            pending_image: None,
            in_flight: false,
            playing: None,
            cached_location: None,
            notice: None,
            target_lang,
            voice,
        }
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent assistant message
    #[must_use]
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::chat::Role::Assistant)
    }

    /// Whether an exchange is currently running
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Id of the message currently playing, if any
    #[must_use]
    pub fn playing_id(&self) -> Option<&str> {
        self.playing.as_ref().map(|p| p.message_id.as_str())
    }

    /// Take the pending notice, if one was raised
    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Selected target language code
    #[must_use]
    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    /// Switch the target language
    ///
    /// # Errors
    ///
    /// Returns error for a code outside the language catalog
    pub fn set_target_lang(&mut self, code: &str) -> Result<()> {
        if !lang::is_supported(code) {
            return Err(Error::Config(format!("unsupported language code: {code}")));
        }
        self.target_lang = code.to_string();
        tracing::debug!(lang = code, "target language changed");
        Ok(())
    }

    /// Selected voice identity
    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Switch the voice identity
    ///
    /// # Errors
    ///
    /// Returns error for an unknown voice
    pub fn set_voice(&mut self, voice: &str) -> Result<()> {
        let Some(known) = VOICES.iter().find(|v| v.eq_ignore_ascii_case(voice)) else {
            return Err(Error::Config(format!("unknown voice: {voice}")));
        };
        self.voice = (*known).to_string();
        Ok(())
    }

    /// Stage an image attachment for the next send, replacing any prior one
    pub fn stage_attachment(&mut self, image: ImageData) {
        self.pending_image = Some(image);
    }

    /// The attachment staged for the next send
    #[must_use]
    pub fn pending_attachment(&self) -> Option<&ImageData> {
        self.pending_image.as_ref()
    }

    /// Run one exchange
    ///
    /// Silently ignored when there is nothing to send (no content and no
    /// staged attachment) or when an exchange is already in flight. Any
    /// failure surfaces as a notice instead of an error; partial streamed
    /// text is left standing.
    pub async fn send(&mut self, content: &str, force_location: bool) {
        let content = content.trim();

        if content.is_empty() && self.pending_image.is_none() {
            return;
        }
        if self.in_flight {
            tracing::debug!("exchange already in flight, ignoring send");
            return;
        }

        self.notice = None;
        self.output.stop();
        self.playing = None;

        let location = if force_location || prompt::wants_location(content) {
            self.resolve_location().await
        } else {
            None
        };

        let image = self.pending_image.take();
        let display_text = if content.is_empty() {
            crate::chat::SCAN_PLACEHOLDER
        } else {
            content
        };
        self.messages.push(Message::user(display_text, image.clone()));

        self.in_flight = true;
        let result = self.run_exchange(content, image, location).await;
        self.in_flight = false;

        if let Err(e) = result {
            tracing::error!(error = %e, "exchange failed");
            self.notice = Some(Notice::error(CONNECTION_NOTICE));
        }
    }

    /// Steps of an exchange that can fail; `send` guarantees the in-flight
    /// flag clears around this
    async fn run_exchange(
        &mut self,
        content: &str,
        image: Option<ImageData>,
        location: Option<GeoPoint>,
    ) -> Result<()> {
        // Translate into the pivot language first so generation always
        // sees pivot-language text; failure falls back to the original
        let pivot_content = if self.needs_translation() && !content.is_empty() {
            match self
                .translation
                .translate(content, &self.target_lang, lang::PIVOT_LANG)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "pre-translation failed, using original text");
                    content.to_string()
                }
            }
        } else {
            content.to_string()
        };

        let lang_name = lang::display_name(&self.target_lang);
        let query = prompt::format_query(lang_name, &pivot_content);

        // The assistant message exists before any text arrives
        let mut placeholder = Message::assistant();
        placeholder.engine = Some(Engine::Gemini);
        let assistant_id = placeholder.id.clone();
        self.messages.push(placeholder);

        let request = GenerationRequest {
            prompt: query,
            system_instruction: prompt::SYSTEM_PROMPT.to_string(),
            image,
            location,
        };

        let mut stream = self.generation.stream(request).await?;
        let mut full_text = String::new();

        while let Some(event) = stream.next().await {
            let chunk = event?;
            full_text.push_str(&chunk.text);

            if let Some(message) = self.message_mut(&assistant_id) {
                message.text.push_str(&chunk.text);
                message.grounding.extend(chunk.grounding);
            }
        }

        // Translate the finished answer back to the target language;
        // failure leaves the pivot-language text standing
        if self.needs_translation() && !full_text.is_empty() {
            match self
                .translation
                .translate(&full_text, lang::PIVOT_LANG, &self.target_lang)
                .await
            {
                Ok(translated) => {
                    if let Some(message) = self.message_mut(&assistant_id) {
                        message.text = translated;
                        message.engine = Some(Engine::Bhashini);
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "post-translation failed, keeping pivot text");
                }
            }
        }

        Ok(())
    }

    /// Toggle spoken playback of a message
    ///
    /// Invoking on the message already playing stops it; invoking on a
    /// different message takes the speakers over. Failures surface as a
    /// warning notice and leave nothing playing.
    pub async fn toggle_speech(&mut self, message_id: &str) {
        if self
            .playing
            .as_ref()
            .is_some_and(|p| p.message_id == message_id)
        {
            self.output.stop();
            self.playing = None;
            return;
        }

        self.output.stop();
        self.playing = None;

        let Some(text) = self
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.text.clone())
        else {
            return;
        };
        if text.is_empty() {
            tracing::debug!(message_id, "nothing to speak");
            return;
        }

        match self.speak(&text).await {
            Ok(handle) => {
                self.playing = Some(Playing {
                    message_id: message_id.to_string(),
                    handle,
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "speech playback failed");
                self.notice = Some(Notice::warning(PLAYBACK_NOTICE));
            }
        }
    }

    /// Synthesize and start playing one message's text
    async fn speak(&mut self, text: &str) -> Result<PlaybackHandle> {
        let buffer = if self.needs_translation() {
            let encoded = self
                .translation
                .synthesize(text, &self.target_lang)
                .await?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| Error::DecodeFailed(e.to_string()))?;
            decode_audio(&bytes)?
        } else {
            let pcm = self.generation.synthesize(text, &self.voice).await?;
            decode_pcm16(&pcm, PLAYBACK_SAMPLE_RATE)
        };

        self.output.play(buffer)
    }

    /// Resolve when the active playback reaches its end, returning the id
    /// whose now-playing indicator to clear; pending while nothing plays
    pub async fn playback_done(&mut self) -> String {
        if let Some(playing) = self.playing.as_mut() {
            let _ = (&mut playing.handle.finished).await;
        } else {
            std::future::pending::<()>().await;
        }
        self.playing.take().map(|p| p.message_id).unwrap_or_default()
    }

    /// Stop any active playback and clear the indicator
    pub fn stop_playback(&mut self) {
        self.output.stop();
        self.playing = None;
    }

    fn needs_translation(&self) -> bool {
        self.translation.is_configured() && self.target_lang != lang::PIVOT_LANG
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Bounded-time position lookup; failures fall back to the last known
    /// position and never fail the exchange
    async fn resolve_location(&mut self) -> Option<GeoPoint> {
        if !self.config.geolocation.enabled {
            return self.cached_location;
        }

        let timeout = Duration::from_secs(self.config.geolocation.timeout_secs);
        match tokio::time::timeout(timeout, self.location.locate()).await {
            Ok(Ok(point)) => {
                self.cached_location = Some(point);
                Some(point)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "geolocation failed, using cached position");
                self.cached_location
            }
            Err(_) => {
                tracing::warn!("geolocation timed out, using cached position");
                self.cached_location
            }
        }
    }
}
