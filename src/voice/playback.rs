//! Audio playback to speakers
//!
//! One playback session at a time: starting a new one silences whatever
//! was playing. `play` returns immediately with a handle that resolves
//! when the audio runs to its natural end, so callers can clear their
//! now-playing indicator without blocking the chat loop.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::oneshot;

use crate::{Error, Result};

/// Sample rate for playback (matches the generation TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Decoded mono audio ready to play
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Handle to an in-flight playback session
///
/// The receiver resolves `Ok` when the samples ran out on their own and
/// `Err` when the session was stopped or superseded first.
pub struct PlaybackHandle {
    pub(crate) finished: oneshot::Receiver<()>,
}

impl PlaybackHandle {
    /// Create a handle together with the sender that resolves it
    #[must_use]
    pub fn channel() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { finished: rx })
    }

    /// Wait for the natural end of playback
    ///
    /// Returns `false` if the session was stopped or superseded instead.
    pub async fn wait(self) -> bool {
        self.finished.await.is_ok()
    }
}

/// Sink for decoded audio
///
/// Not `Send`: host audio streams are tied to the thread that built them,
/// so the owner drives playback from the main task.
pub trait AudioOutput {
    /// Start playing a buffer, superseding any prior session
    ///
    /// # Errors
    ///
    /// Returns error if the output device refuses the stream
    fn play(&mut self, buffer: AudioBuffer) -> Result<PlaybackHandle>;

    /// Stop the current session; no-op when idle
    fn stop(&mut self);
}

/// Position within the samples being played, shared with the device
/// callback
struct PlayCursor {
    samples: Vec<f32>,
    position: usize,
    done: Option<oneshot::Sender<()>>,
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device offers the playback rate
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioUnavailable("no output device".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::AudioUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| {
                Error::AudioUnavailable("no suitable output config found".to_string())
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

impl AudioOutput for AudioPlayback {
    fn play(&mut self, buffer: AudioBuffer) -> Result<PlaybackHandle> {
        self.stop();

        let (tx, handle) = PlaybackHandle::channel();

        if buffer.samples.is_empty() {
            let _ = tx.send(());
            return Ok(handle);
        }

        let samples = if buffer.sample_rate == PLAYBACK_SAMPLE_RATE {
            buffer.samples
        } else {
            resample(&buffer.samples, buffer.sample_rate, PLAYBACK_SAMPLE_RATE)?
        };

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioUnavailable("no output device".to_string()))?;

        let config = self.config.clone();
        let channels = config.channels as usize;
        let total = samples.len();

        let cursor = Arc::new(Mutex::new(PlayCursor {
            samples,
            position: 0,
            done: Some(tx),
        }));

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut cursor) = cursor.lock() else {
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = if cursor.position < cursor.samples.len() {
                            let s = cursor.samples[cursor.position];
                            cursor.position += 1;
                            s
                        } else {
                            // Natural end, signal exactly once
                            if let Some(done) = cursor.done.take() {
                                let _ = done.send(());
                            }
                            0.0
                        };

                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::AudioUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::AudioUnavailable(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(samples = total, "playback started");
        Ok(handle)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Dropping the stream drops the cursor and with it the unsent
            // completion signal
            drop(stream);
            tracing::debug!("playback stopped");
        }
    }
}

/// Decode raw little-endian 16-bit PCM into a playable buffer
#[must_use]
pub fn decode_pcm16(data: &[u8], sample_rate: u32) -> AudioBuffer {
    let samples = data
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    AudioBuffer {
        samples,
        sample_rate,
    }
}

/// Decode an audio payload of unknown container
///
/// Sniffs the RIFF magic for WAV, otherwise tries MP3.
///
/// # Errors
///
/// Returns [`Error::DecodeFailed`] if neither decoder produces samples
pub fn decode_audio(data: &[u8]) -> Result<AudioBuffer> {
    if data.starts_with(b"RIFF") {
        return decode_wav(data);
    }
    decode_mp3(data)
}

/// Decode WAV bytes to a mono buffer
fn decode_wav(data: &[u8]) -> Result<AudioBuffer> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::DecodeFailed(e.to_string()))?;
    let spec = reader.spec();

    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::DecodeFailed(e.to_string()))?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::DecodeFailed(e.to_string()))?,
    };

    let samples = if spec.channels == 2 {
        // Stereo: average channels
        raw.chunks(2)
            .map(|pair| f32::midpoint(pair[0], *pair.get(1).unwrap_or(&pair[0])))
            .collect()
    } else {
        raw
    };

    Ok(AudioBuffer {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to a mono buffer
fn decode_mp3(data: &[u8]) -> Result<AudioBuffer> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = PLAYBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                {
                    sample_rate = frame.sample_rate as u32;
                }

                // Convert i16 samples to f32 and handle stereo to mono
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    // Stereo: average channels
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        })
                        .collect()
                } else {
                    // Mono
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::DecodeFailed(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(Error::DecodeFailed("no decodable audio frames".to_string()));
    }

    Ok(AudioBuffer {
        samples,
        sample_rate,
    })
}

/// Resample audio using rubato
///
/// The FFT resampler consumes fixed-size chunks and reports its latency as
/// leading output frames. The final partial chunk is zero-padded, the
/// latency drained, and the output trimmed so the whole clip survives.
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::AudioUnavailable(format!("resampler init failed: {e}")))?;

    let expected = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let delay = resampler.output_delay();

    // Convert to f64
    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();

    let mut output: Vec<f64> = Vec::with_capacity(expected + delay);

    for chunk in input.chunks(chunk_size) {
        let result = if chunk.len() == chunk_size {
            resampler.process(&[chunk.to_vec()], None)
        } else {
            resampler.process_partial(Some(&[chunk.to_vec()]), None)
        }
        .map_err(|e| Error::AudioUnavailable(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // Feed zeros until the tail has made it through the latency window
    while output.len() < expected + delay {
        let result = resampler
            .process_partial::<Vec<f64>>(None, None)
            .map_err(|e| Error::AudioUnavailable(format!("resample failed: {e}")))?;
        if result[0].is_empty() {
            break;
        }
        output.extend_from_slice(&result[0]);
    }

    // Convert back to f32, dropping the latency frames
    Ok(output
        .iter()
        .skip(delay)
        .take(expected)
        .map(|&s| s as f32)
        .collect())
}
