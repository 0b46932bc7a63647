//! Conversation flow integration tests
//!
//! Exercises exchanges, translation round trips, and playback ownership
//! with mock gateways; no network or audio hardware required.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use mitra_engine::chat::{CONNECTION_NOTICE, GREETING, PLAYBACK_NOTICE, SCAN_PLACEHOLDER};
use mitra_engine::config::GeolocationConfig;
use mitra_engine::voice::{samples_to_wav, AudioBuffer, AudioOutput, PlaybackHandle, SAMPLE_RATE};
use mitra_engine::{
    ChatSession, Config, Engine, Error, GenerationChunk, GenerationGateway, GenerationRequest,
    GenerationStream, GeoPoint, GroundingRef, ImageData, LocationProvider, Result, Role, Severity,
    TranslationGateway,
};

mod common;
use common::generate_sine_samples;

/// Mock generation gateway replaying a fixed chunk script
struct ScriptedGeneration {
    chunks: Vec<GenerationChunk>,
    fail_open: bool,
    fail_mid_stream: bool,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGeneration {
    fn replying(texts: &[&str]) -> Self {
        Self {
            chunks: texts
                .iter()
                .map(|t| GenerationChunk {
                    text: (*t).to_string(),
                    grounding: Vec::new(),
                })
                .collect(),
            fail_open: false,
            fail_mid_stream: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_source(mut self, chunk: usize, title: Option<&str>, uri: &str) -> Self {
        self.chunks[chunk].grounding.push(GroundingRef {
            title: title.map(str::to_string),
            uri: uri.to_string(),
        });
        self
    }

    fn failing_to_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn failing_mid_stream(mut self) -> Self {
        self.fail_mid_stream = true;
        self
    }

    fn recorded_requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGeneration {
    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream> {
        self.requests.lock().unwrap().push(request);
        if self.fail_open {
            return Err(Error::GenerationFailed("connection refused".to_string()));
        }
        let mut items: Vec<Result<GenerationChunk>> = self.chunks.iter().cloned().map(Ok).collect();
        if self.fail_mid_stream {
            items.push(Err(Error::GenerationFailed("stream dropped".to_string())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>> {
        // Two bytes per PCM16 sample, two samples per character
        Ok(vec![0u8; text.len() * 4])
    }
}

/// Mock translation gateway tagging output with the target language code
struct TaggingTranslation {
    active: bool,
    fail: bool,
    translate_calls: Mutex<Vec<(String, String, String)>>,
    synthesize_calls: Mutex<Vec<(String, String)>>,
}

impl TaggingTranslation {
    fn configured() -> Self {
        Self {
            active: true,
            fail: false,
            translate_calls: Mutex::new(Vec::new()),
            synthesize_calls: Mutex::new(Vec::new()),
        }
    }

    fn unconfigured() -> Self {
        Self {
            active: false,
            ..Self::configured()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::configured()
        }
    }

    fn recorded_translations(&self) -> Vec<(String, String, String)> {
        self.translate_calls.lock().unwrap().clone()
    }

    fn recorded_syntheses(&self) -> Vec<(String, String)> {
        self.synthesize_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationGateway for TaggingTranslation {
    fn is_configured(&self) -> bool {
        self.active
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        self.translate_calls.lock().unwrap().push((
            text.to_string(),
            source.to_string(),
            target.to_string(),
        ));
        if self.fail {
            return Err(Error::TranslationUnavailable("api down".to_string()));
        }
        Ok(format!("[{target}] {text}"))
    }

    async fn synthesize(&self, text: &str, lang: &str) -> Result<String> {
        self.synthesize_calls
            .lock()
            .unwrap()
            .push((text.to_string(), lang.to_string()));
        if self.fail {
            return Err(Error::TranslationUnavailable("api down".to_string()));
        }
        let samples = generate_sine_samples(440.0, 0.05, 0.3);
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();
        Ok(base64::engine::general_purpose::STANDARD.encode(wav))
    }

    async fn transcribe(&self, _wav: &[u8], _lang: &str) -> Result<String> {
        Ok("kendra kahan hai".to_string())
    }
}

/// Mock location provider with a fixed position
struct FixedLocation {
    point: Option<GeoPoint>,
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn locate(&self) -> Result<GeoPoint> {
        self.point
            .ok_or_else(|| Error::GeolocationUnavailable("no fix".to_string()))
    }
}

/// What the mock output observed
#[derive(Default)]
struct OutputLog {
    played: Vec<AudioBuffer>,
    stops: usize,
    sender: Option<tokio::sync::oneshot::Sender<()>>,
}

/// Mock audio output recording playback sessions; completion is fired
/// manually through the stored sender
struct RecordingOutput {
    log: Rc<RefCell<OutputLog>>,
    fail: bool,
}

impl AudioOutput for RecordingOutput {
    fn play(&mut self, buffer: AudioBuffer) -> Result<PlaybackHandle> {
        if self.fail {
            return Err(Error::AudioUnavailable("no device".to_string()));
        }
        let (tx, handle) = PlaybackHandle::channel();
        let mut log = self.log.borrow_mut();
        log.sender = Some(tx);
        log.played.push(buffer);
        Ok(handle)
    }

    fn stop(&mut self) {
        let mut log = self.log.borrow_mut();
        log.stops += 1;
        log.sender = None;
    }
}

fn build_session(
    generation: Arc<ScriptedGeneration>,
    translation: Arc<TaggingTranslation>,
    point: Option<GeoPoint>,
) -> (ChatSession, Rc<RefCell<OutputLog>>) {
    let log = Rc::new(RefCell::new(OutputLog::default()));
    let output = RecordingOutput {
        log: Rc::clone(&log),
        fail: false,
    };
    let session = ChatSession::new(
        Config::default(),
        generation,
        translation,
        Arc::new(FixedLocation { point }),
        Box::new(output),
    );
    (session, log)
}

#[tokio::test]
async fn test_session_opens_with_greeting() {
    let generation = Arc::new(ScriptedGeneration::replying(&[]));
    let (session, _log) = build_session(generation, Arc::new(TaggingTranslation::unconfigured()), None);

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Assistant);
    assert_eq!(messages[0].text, GREETING);
    assert_eq!(messages[0].engine, Some(Engine::Gemini));
}

#[tokio::test]
async fn test_streamed_chunks_concatenate_in_order() {
    let generation = Arc::new(ScriptedGeneration::replying(&[
        "The closest center ",
        "is in Sector 9, ",
        "Dwarka.",
    ]));
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("  kendra kahan hai  ", false).await;

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].text, "kendra kahan hai");
    assert_eq!(messages[2].text, "The closest center is in Sector 9, Dwarka.");
    assert_eq!(messages[2].engine, Some(Engine::Gemini));
    assert!(!session.is_in_flight());
}

#[tokio::test]
async fn test_grounding_sources_kept_in_arrival_order() {
    let generation = Arc::new(
        ScriptedGeneration::replying(&["a", "b", "c"])
            .with_source(0, Some("UIDAI"), "https://uidai.gov.in/centers")
            .with_source(1, None, "https://maps.example.com/sector-9")
            .with_source(2, Some("UIDAI"), "https://uidai.gov.in/centers"),
    );
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("list the offices", false).await;

    let reply = session.last_assistant().unwrap();
    let uris: Vec<&str> = reply.grounding.iter().map(|g| g.uri.as_str()).collect();
    // Duplicates survive; arrival order is the display order
    assert_eq!(
        uris,
        [
            "https://uidai.gov.in/centers",
            "https://maps.example.com/sector-9",
            "https://uidai.gov.in/centers",
        ]
    );
}

#[tokio::test]
async fn test_attachment_only_send_uses_placeholder() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Looks like an Aadhaar card."]));
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    let image = ImageData {
        mime_type: "image/jpeg".to_string(),
        data: vec![0xff, 0xd8, 0xff],
    };
    session.stage_attachment(image.clone());
    session.send("", false).await;

    let messages = session.messages();
    assert_eq!(messages[1].text, SCAN_PLACEHOLDER);
    assert_eq!(messages[1].image, Some(image.clone()));
    assert!(session.pending_attachment().is_none());

    let requests = generation.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].image, Some(image));
}

#[tokio::test]
async fn test_round_trip_translation_tags_reply() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Visit the ", "Dwarka office."]));
    let translation = Arc::new(TaggingTranslation::configured());
    let (mut session, _log) =
        build_session(Arc::clone(&generation), Arc::clone(&translation), None);

    // Default target language is Hindi
    session.send("kendra kahan hai", false).await;

    let translations = translation.recorded_translations();
    assert_eq!(translations.len(), 2);
    assert_eq!(
        translations[0],
        ("kendra kahan hai".to_string(), "hi".to_string(), "en".to_string())
    );
    assert_eq!(
        translations[1],
        ("Visit the Dwarka office.".to_string(), "en".to_string(), "hi".to_string())
    );

    let requests = generation.recorded_requests();
    assert_eq!(requests[0].prompt, "[Lang: Hindi] Query: [en] kendra kahan hai");
    assert!(!requests[0].system_instruction.is_empty());

    let reply = session.last_assistant().unwrap();
    assert_eq!(reply.text, "[hi] Visit the Dwarka office.");
    assert_eq!(reply.engine, Some(Engine::Bhashini));
}

#[tokio::test]
async fn test_pivot_language_skips_translation() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Here are the steps."]));
    let translation = Arc::new(TaggingTranslation::configured());
    let (mut session, _log) =
        build_session(Arc::clone(&generation), Arc::clone(&translation), None);

    session.set_target_lang("en").unwrap();
    session.send("how do I update my address", false).await;

    assert!(translation.recorded_translations().is_empty());
    let requests = generation.recorded_requests();
    assert_eq!(
        requests[0].prompt,
        "[Lang: English] Query: how do I update my address"
    );
    assert_eq!(session.last_assistant().unwrap().engine, Some(Engine::Gemini));
}

#[tokio::test]
async fn test_translation_outage_falls_back_to_pivot_text() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Bring your PAN card."]));
    let translation = Arc::new(TaggingTranslation::failing());
    let (mut session, _log) =
        build_session(Arc::clone(&generation), Arc::clone(&translation), None);

    session.send("kendra kahan hai", false).await;

    // Generation saw the untranslated text and the reply keeps the
    // pivot-language answer; the exchange itself still succeeds
    let requests = generation.recorded_requests();
    assert_eq!(requests[0].prompt, "[Lang: Hindi] Query: kendra kahan hai");

    let reply = session.last_assistant().unwrap();
    assert_eq!(reply.text, "Bring your PAN card.");
    assert_eq!(reply.engine, Some(Engine::Gemini));
    assert!(session.take_notice().is_none());
}

#[tokio::test]
async fn test_failed_stream_open_raises_connection_notice() {
    let generation = Arc::new(ScriptedGeneration::replying(&[]).failing_to_open());
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("hello", false).await;

    let notice = session.take_notice().unwrap();
    assert_eq!(notice.message, CONNECTION_NOTICE);
    assert_eq!(notice.severity, Severity::Error);
    assert!(!session.is_in_flight());
    assert_eq!(session.last_assistant().unwrap().text, "");
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_partial_text() {
    let generation =
        Arc::new(ScriptedGeneration::replying(&["The first step is"]).failing_mid_stream());
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("how do I enroll", false).await;

    let notice = session.take_notice().unwrap();
    assert_eq!(notice.message, CONNECTION_NOTICE);
    assert_eq!(notice.severity, Severity::Error);
    // Whatever streamed before the failure stays visible
    assert_eq!(session.last_assistant().unwrap().text, "The first step is");
}

#[tokio::test]
async fn test_location_attached_for_location_queries() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Sector 9 center is closest."]));
    let point = GeoPoint { lat: 28.59, lng: 77.04 };
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        Some(point),
    );

    session.send("Is there a center near Dwarka?", false).await;

    let requests = generation.recorded_requests();
    assert_eq!(requests[0].location, Some(point));
}

#[tokio::test]
async fn test_location_skipped_for_plain_queries() {
    let generation = Arc::new(ScriptedGeneration::replying(&["You need proof of identity."]));
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        Some(GeoPoint { lat: 28.59, lng: 77.04 }),
    );

    session.send("Which documents do I bring?", false).await;

    let requests = generation.recorded_requests();
    assert_eq!(requests[0].location, None);
}

#[tokio::test]
async fn test_forced_location_overrides_cue_detection() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Sector 9."]));
    let point = GeoPoint { lat: 28.59, lng: 77.04 };
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        Some(point),
    );

    session.send("enrollment help", true).await;

    let requests = generation.recorded_requests();
    assert_eq!(requests[0].location, Some(point));
}

#[tokio::test]
async fn test_location_failure_leaves_request_unlocated() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Try the city portal."]));
    let (mut session, _log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("any office near me", false).await;

    let requests = generation.recorded_requests();
    assert_eq!(requests[0].location, None);
    assert!(session.take_notice().is_none());
    assert_eq!(session.last_assistant().unwrap().text, "Try the city portal.");
}

#[tokio::test]
async fn test_disabled_geolocation_never_looks_up() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Sector 9."]));
    let log = Rc::new(RefCell::new(OutputLog::default()));
    let config = Config {
        geolocation: GeolocationConfig {
            enabled: false,
            timeout_secs: 1,
        },
        ..Config::default()
    };
    let mut session = ChatSession::new(
        config,
        Arc::clone(&generation) as Arc<dyn GenerationGateway>,
        Arc::new(TaggingTranslation::unconfigured()),
        Arc::new(FixedLocation {
            point: Some(GeoPoint { lat: 28.59, lng: 77.04 }),
        }),
        Box::new(RecordingOutput {
            log: Rc::clone(&log),
            fail: false,
        }),
    );

    session.send("center near me", false).await;

    let requests = generation.recorded_requests();
    assert_eq!(requests[0].location, None);
}

#[tokio::test]
async fn test_toggle_speech_marks_message_playing() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Namaste."]));
    let (mut session, log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("hello", false).await;
    let id = session.last_assistant().unwrap().id.clone();

    session.toggle_speech(&id).await;
    assert_eq!(session.playing_id(), Some(id.as_str()));
    assert_eq!(log.borrow().played.len(), 1);
    // English path synthesizes through the generation gateway at 24 kHz
    assert_eq!(log.borrow().played[0].sample_rate, 24_000);

    // Toggling the same message stops it
    session.toggle_speech(&id).await;
    assert_eq!(session.playing_id(), None);
    assert!(log.borrow().sender.is_none());
}

#[tokio::test]
async fn test_playback_takeover_between_messages() {
    let generation = Arc::new(ScriptedGeneration::replying(&["One."]));
    let (mut session, log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("first", false).await;
    let first = session.last_assistant().unwrap().id.clone();
    session.send("second", false).await;
    let second = session.last_assistant().unwrap().id.clone();
    assert_ne!(first, second);

    session.toggle_speech(&first).await;
    session.toggle_speech(&second).await;

    // The second request took the speakers over
    assert_eq!(session.playing_id(), Some(second.as_str()));
    assert_eq!(log.borrow().played.len(), 2);
}

#[tokio::test]
async fn test_regional_language_speaks_through_translation_gateway() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Visit Sector 9."]));
    let translation = Arc::new(TaggingTranslation::configured());
    let (mut session, log) =
        build_session(Arc::clone(&generation), Arc::clone(&translation), None);

    session.send("kendra kahan hai", false).await;
    let id = session.last_assistant().unwrap().id.clone();
    session.toggle_speech(&id).await;

    let syntheses = translation.recorded_syntheses();
    assert_eq!(syntheses.len(), 1);
    assert_eq!(syntheses[0].0, "[hi] Visit Sector 9.");
    assert_eq!(syntheses[0].1, "hi");
    // The decoded WAV keeps its own sample rate
    assert_eq!(log.borrow().played[0].sample_rate, SAMPLE_RATE);
}

#[tokio::test]
async fn test_playback_failure_raises_warning_notice() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Namaste."]));
    let log = Rc::new(RefCell::new(OutputLog::default()));
    let mut session = ChatSession::new(
        Config::default(),
        Arc::clone(&generation) as Arc<dyn GenerationGateway>,
        Arc::new(TaggingTranslation::unconfigured()),
        Arc::new(FixedLocation { point: None }),
        Box::new(RecordingOutput {
            log: Rc::clone(&log),
            fail: true,
        }),
    );

    session.send("hello", false).await;
    let id = session.last_assistant().unwrap().id.clone();
    session.toggle_speech(&id).await;

    assert_eq!(session.playing_id(), None);
    let notice = session.take_notice().unwrap();
    assert_eq!(notice.message, PLAYBACK_NOTICE);
    assert_eq!(notice.severity, Severity::Warning);
}

#[tokio::test]
async fn test_playback_done_reports_finished_message() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Namaste."]));
    let (mut session, log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("hello", false).await;
    let id = session.last_assistant().unwrap().id.clone();
    session.toggle_speech(&id).await;

    // Samples run out: the output fires the completion signal
    let tx = log.borrow_mut().sender.take().unwrap();
    tx.send(()).unwrap();

    let finished = session.playback_done().await;
    assert_eq!(finished, id);
    assert_eq!(session.playing_id(), None);
}

#[tokio::test]
async fn test_new_send_stops_active_playback() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Namaste."]));
    let (mut session, log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.send("hello", false).await;
    let id = session.last_assistant().unwrap().id.clone();
    session.toggle_speech(&id).await;
    assert!(session.playing_id().is_some());

    session.send("one more question", false).await;

    assert_eq!(session.playing_id(), None);
    assert!(log.borrow().sender.is_none());
}

#[tokio::test]
async fn test_speaking_unknown_message_is_ignored() {
    let generation = Arc::new(ScriptedGeneration::replying(&["Namaste."]));
    let (mut session, log) = build_session(
        Arc::clone(&generation),
        Arc::new(TaggingTranslation::unconfigured()),
        None,
    );

    session.toggle_speech("no-such-id").await;

    assert_eq!(session.playing_id(), None);
    assert!(log.borrow().played.is_empty());
    assert!(session.take_notice().is_none());
}
