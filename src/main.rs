use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use mitra_engine::chat::{load_attachment, ChatSession, Severity};
use mitra_engine::voice::{decode_audio, decode_pcm16, PLAYBACK_SAMPLE_RATE};
use mitra_engine::{
    lang, AudioBuffer, AudioCapture, AudioOutput, AudioPlayback, BhashiniClient, Config, Error,
    GeminiClient, GenerationGateway, IpLocationProvider, LocationProvider, PlaybackHandle,
    Recognizer, SpectrumSink, TranslationGateway, Visualizer,
};

/// Query sent by the nearest-center shortcut
const NEAREST_CENTER_QUERY: &str = "Where is the nearest Aadhaar enrollment center?";

/// Mitra - multilingual citizen-assistance chat with voice in and out
#[derive(Parser)]
#[command(name = "mitra", version, about)]
struct Cli {
    /// Reply language code (e.g. "hi", "ta"); overrides the config file
    #[arg(short, long)]
    lang: Option<String>,

    /// Voice for spoken English replies (Kore, Puck, Charon, Zephyr, Fenrir)
    #[arg(long)]
    voice: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Namaste! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,mitra_engine=info",
        1 => "info,mitra_engine=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestTts { text }) => test_tts(&text).await,
        None => chat(cli).await,
    }
}

/// Stand-in output for hosts without a usable audio device. Text chat
/// keeps working; playback attempts raise the usual playback notice.
struct MutedOutput;

impl AudioOutput for MutedOutput {
    fn play(&mut self, _buffer: AudioBuffer) -> mitra_engine::Result<PlaybackHandle> {
        Err(Error::AudioUnavailable("no output device".to_string()))
    }

    fn stop(&mut self) {}
}

/// Renders frequency bins as a single-line level meter while recording
struct TerminalMeter;

impl SpectrumSink for TerminalMeter {
    fn draw(&mut self, bins: &[f32]) {
        let meter: String = bins
            .iter()
            .map(|&level| match level {
                l if l > 0.5 => '█',
                l if l > 0.25 => '▓',
                l if l > 0.1 => '▒',
                l if l > 0.02 => '░',
                _ => ' ',
            })
            .collect();
        print!("\rlistening [{meter}] ");
        let _ = std::io::stdout().flush();
    }
}

#[allow(clippy::future_not_send)]
#[allow(clippy::too_many_lines)]
async fn chat(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load();

    let generation: Arc<dyn GenerationGateway> = Arc::new(GeminiClient::new(&config.gemini)?);
    let translation: Arc<dyn TranslationGateway> = Arc::new(BhashiniClient::new(&config.bhashini));
    let location: Arc<dyn LocationProvider> = Arc::new(IpLocationProvider::new());
    let output: Box<dyn AudioOutput> = match AudioPlayback::new() {
        Ok(playback) => Box::new(playback),
        Err(e) => {
            warn!(error = %e, "audio output unavailable, continuing without playback");
            Box::new(MutedOutput)
        }
    };

    let mut session =
        ChatSession::new(config, generation, Arc::clone(&translation), location, output);
    if let Some(code) = cli.lang {
        session.set_target_lang(&code)?;
    }
    if let Some(voice) = cli.voice {
        session.set_voice(&voice)?;
    }

    let mut recognizer: Option<Recognizer> = None;
    let mut visualizer: Option<Visualizer> = None;

    println!("Aadhaar Mitra ({})", lang::display_name(session.target_lang()));
    println!("Type a question, or /help for commands.");
    println!();
    if let Some(greeting) = session.messages().first() {
        println!("mitra: {}", greeting.text);
    }
    prompt();

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut poll = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim().to_string();
                if input.is_empty() {
                    prompt();
                    continue;
                }
                if let Some(command) = input.strip_prefix('/') {
                    let (name, rest) = command
                        .split_once(char::is_whitespace)
                        .map_or((command, ""), |(n, r)| (n, r.trim()));
                    match name {
                        "quit" | "exit" => break,
                        "help" => print_help(),
                        "lang" => match session.set_target_lang(rest) {
                            Ok(()) => println!(
                                "replies in {} from now on",
                                lang::display_name(session.target_lang())
                            ),
                            Err(e) => {
                                eprintln!("error: {e}");
                                let codes: Vec<&str> =
                                    lang::LANGUAGES.iter().map(|l| l.code).collect();
                                println!("supported: {}", codes.join(", "));
                            }
                        },
                        "voice" => match session.set_voice(rest) {
                            Ok(()) => println!("voice set to {}", session.voice()),
                            Err(e) => eprintln!("error: {e}"),
                        },
                        "image" => match load_attachment(Path::new(rest)) {
                            Ok(image) => {
                                session.stage_attachment(image);
                                println!("attached {rest}; it goes out with your next message");
                            }
                            Err(e) => eprintln!("error: {e}"),
                        },
                        "speak" => {
                            if let Some(id) = session.last_assistant().map(|m| m.id.clone()) {
                                session.toggle_speech(&id).await;
                                if session.playing_id().is_some() {
                                    println!("speaking...");
                                } else {
                                    println!("stopped");
                                }
                                print_notice(&mut session);
                            } else {
                                eprintln!("error: nothing to read aloud yet");
                            }
                        }
                        "record" => {
                            toggle_recording(
                                &session,
                                &translation,
                                &mut recognizer,
                                &mut visualizer,
                            );
                        }
                        "find" => submit(&mut session, NEAREST_CENTER_QUERY, true).await,
                        other => eprintln!("error: unknown command /{other}"),
                    }
                } else {
                    submit(&mut session, &input, false).await;
                }
                prompt();
            }
            finished = session.playback_done() => {
                debug!(message_id = %finished, "playback finished");
            }
            _ = poll.tick() => {
                let Some(rec) = recognizer.as_mut() else { continue };
                if !rec.is_active() {
                    continue;
                }
                match rec.poll().await {
                    Ok(Some(transcript)) => {
                        if let Some(viz) = visualizer.as_mut() {
                            viz.stop();
                        }
                        println!("\rheard: {transcript}");
                        submit(&mut session, &transcript, false).await;
                        prompt();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if let Some(viz) = visualizer.as_mut() {
                            viz.stop();
                        }
                        eprintln!("\rerror: voice recognition failed: {e}");
                        prompt();
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    if let Some(viz) = visualizer.as_mut() {
        viz.stop();
    }
    if let Some(rec) = recognizer.as_mut() {
        rec.stop();
    }
    session.stop_playback();
    Ok(())
}

/// Start voice input, or cancel it when already listening
fn toggle_recording(
    session: &ChatSession,
    translation: &Arc<dyn TranslationGateway>,
    recognizer: &mut Option<Recognizer>,
    visualizer: &mut Option<Visualizer>,
) {
    if recognizer.as_ref().is_some_and(Recognizer::is_active) {
        if let Some(rec) = recognizer.as_mut() {
            rec.stop();
        }
        if let Some(viz) = visualizer.as_mut() {
            viz.stop();
        }
        println!("recording cancelled");
        return;
    }

    if recognizer.is_none() {
        match Recognizer::new(Arc::clone(translation)) {
            Ok(rec) => *recognizer = Some(rec),
            Err(e) => {
                eprintln!("error: microphone unavailable: {e}");
                return;
            }
        }
    }
    if visualizer.is_none() {
        match Visualizer::new(Box::new(TerminalMeter)) {
            Ok(viz) => *visualizer = Some(viz),
            Err(e) => warn!(error = %e, "input visualizer unavailable"),
        }
    }

    let Some(rec) = recognizer.as_mut() else { return };
    match rec.start(session.target_lang()) {
        Ok(()) => {
            if let Some(viz) = visualizer.as_mut() {
                if let Err(e) = viz.start() {
                    warn!(error = %e, "input visualizer failed to start");
                }
            }
            println!("listening... speak now, /record to cancel");
        }
        Err(e) => eprintln!("error: voice input not available: {e}"),
    }
}

/// Send a message and print the reply, its sources, and any notice
async fn submit(session: &mut ChatSession, content: &str, force_location: bool) {
    session.send(content, force_location).await;
    if let Some(reply) = session.last_assistant() {
        if !reply.text.is_empty() {
            println!("mitra: {}", reply.text);
            for source in &reply.grounding {
                println!(
                    "  source: {} <{}>",
                    source.title.as_deref().unwrap_or("web"),
                    source.uri
                );
            }
        }
    }
    print_notice(session);
}

fn print_notice(session: &mut ChatSession) {
    if let Some(notice) = session.take_notice() {
        match notice.severity {
            Severity::Error => eprintln!("error: {}", notice.message),
            Severity::Warning => eprintln!("warning: {}", notice.message),
        }
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_help() {
    println!("  /lang <code>   switch reply language (hi, ta, bn, ...)");
    println!("  /voice <name>  pick the voice for English replies");
    println!("  /image <path>  attach a document scan to the next message");
    println!("  /speak         read the last reply aloud, again to stop");
    println!("  /record        speak instead of typing, again to cancel");
    println!("  /find          locate the nearest enrollment center");
    println!("  /quit          leave");
}

async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone. The level meter should react.");
    println!();

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    for second in 1..=duration {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let samples = capture.peek_buffer();
        let rms = calculate_rms(&samples);
        let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 500.0).min(50.0) as usize;
        let meter = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
        println!("  {second:2}s [{meter}] rms={rms:.4} peak={peak:.4}");
        capture.clear_buffer();
    }

    capture.stop();
    println!();
    println!("If the meter stayed flat:");
    println!("  - check the default input:  pactl info | grep 'Default Source'");
    println!("  - list capture devices:     arecord -l");
    println!("  - check levels in pavucontrol (Input Devices tab)");
    Ok(())
}

fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_square.sqrt()
}

async fn test_speaker() -> anyhow::Result<()> {
    println!("Playing a 440 Hz tone for 2 seconds...");

    let mut playback = AudioPlayback::new()?;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE * 2)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.3
        })
        .collect();

    let handle = playback.play(AudioBuffer {
        samples,
        sample_rate: PLAYBACK_SAMPLE_RATE,
    })?;
    handle.wait().await;

    println!();
    println!("If you heard nothing:");
    println!("  - check the default output: pactl info | grep 'Default Sink'");
    println!("  - list sinks:               pactl list sinks short");
    println!("  - check volume in pavucontrol (Output Devices tab)");
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn test_tts(text: &str) -> anyhow::Result<()> {
    let config = Config::load();

    println!("Synthesizing: \"{text}\"");

    let translation = BhashiniClient::new(&config.bhashini);
    let buffer = if translation.is_configured() && config.language.target != lang::PIVOT_LANG {
        let translated = translation
            .translate(text, lang::PIVOT_LANG, &config.language.target)
            .await?;
        println!("Translated: {translated}");
        let encoded = translation
            .synthesize(&translated, &config.language.target)
            .await?;
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        println!("Got {} bytes of encoded audio", bytes.len());
        decode_audio(&bytes)?
    } else {
        let client = GeminiClient::new(&config.gemini)?;
        let pcm = client.synthesize(text, &config.language.voice).await?;
        println!("Got {} bytes of PCM audio", pcm.len());
        decode_pcm16(&pcm, PLAYBACK_SAMPLE_RATE)
    };

    println!("Playing...");
    let mut playback = AudioPlayback::new()?;
    let handle = playback.play(buffer)?;
    handle.wait().await;
    println!("Done");
    Ok(())
}
