//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use mitra_engine::voice::{
    decode_audio, decode_pcm16, samples_to_wav, DetectorState, UtteranceDetector,
    PLAYBACK_SAMPLE_RATE, SAMPLE_RATE,
};
use mitra_engine::Error;

mod common;
use common::{generate_silence, generate_sine_samples};

#[test]
fn test_detector_initial_state() {
    let mut detector = UtteranceDetector::new();

    assert_eq!(detector.state(), DetectorState::Idle);
    assert!(detector.take_utterance().is_empty());
}

#[test]
fn test_silence_keeps_detector_idle() {
    let mut detector = UtteranceDetector::new();

    let silence = generate_silence(0.5);
    assert!(!detector.process(&silence));
    assert_eq!(detector.state(), DetectorState::Idle);
    assert!(detector.take_utterance().is_empty());
}

#[test]
fn test_speech_starts_listening() {
    let mut detector = UtteranceDetector::new();

    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    detector.process(&speech);
    assert_eq!(detector.state(), DetectorState::Listening);
}

#[test]
fn test_speech_buffer_accumulation() {
    let mut detector = UtteranceDetector::new();

    let chunk1 = generate_sine_samples(440.0, 0.1, 0.3);
    detector.process(&chunk1);

    let chunk2 = generate_sine_samples(440.0, 0.1, 0.3);
    detector.process(&chunk2);

    // Buffer should contain both chunks
    let buffer = detector.take_utterance();
    assert_eq!(buffer.len(), chunk1.len() + chunk2.len());
}

#[test]
fn test_take_utterance_drains_buffer() {
    let mut detector = UtteranceDetector::new();

    let speech = generate_sine_samples(440.0, 0.1, 0.3);
    detector.process(&speech);

    let taken = detector.take_utterance();
    assert_eq!(taken.len(), speech.len());

    // Buffer should be empty after take
    assert!(detector.take_utterance().is_empty());
}

#[test]
fn test_utterance_completes_after_trailing_silence() {
    let mut detector = UtteranceDetector::new();

    // Half a second of speech, then more
    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    detector.process(&speech);
    let more_speech = generate_sine_samples(440.0, 0.3, 0.3);
    detector.process(&more_speech);

    // Not complete without trailing silence
    let short_silence = generate_silence(0.2);
    assert!(!detector.process(&short_silence));

    // Enough silence ends the utterance
    let silence = generate_silence(0.6);
    assert!(detector.process(&silence));

    let utterance = detector.take_utterance();
    assert_eq!(
        utterance.len(),
        speech.len() + more_speech.len() + short_silence.len() + silence.len()
    );
}

#[test]
fn test_noise_blip_times_out() {
    let mut detector = UtteranceDetector::new();

    // Too short to count as speech
    let blip = generate_sine_samples(440.0, 0.1, 0.3);
    detector.process(&blip);
    assert_eq!(detector.state(), DetectorState::Listening);

    // A long stretch of silence resets instead of completing
    let silence = generate_silence(1.2);
    assert!(!detector.process(&silence));
    assert_eq!(detector.state(), DetectorState::Idle);
    assert!(detector.take_utterance().is_empty());
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV should have reasonable size
    assert!(wav_data.len() > 44); // WAV header is 44 bytes
}

#[test]
fn test_wav_roundtrip() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    // Read WAV back
    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), original_samples.len());
}

#[test]
fn test_decode_pcm16_scales_samples() {
    let values: [i16; 4] = [0, 16384, -16384, 32767];
    let mut bytes = Vec::new();
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }

    let buffer = decode_pcm16(&bytes, PLAYBACK_SAMPLE_RATE);

    assert_eq!(buffer.sample_rate, PLAYBACK_SAMPLE_RATE);
    assert_eq!(buffer.samples.len(), 4);
    assert!(buffer.samples[0].abs() < f32::EPSILON);
    assert!((buffer.samples[1] - 0.5).abs() < 0.001);
    assert!((buffer.samples[2] + 0.5).abs() < 0.001);
    assert!((buffer.samples[3] - 1.0).abs() < 0.001);
}

#[test]
fn test_decode_pcm16_ignores_trailing_byte() {
    let bytes = [0u8, 0, 0, 64, 7];
    let buffer = decode_pcm16(&bytes, PLAYBACK_SAMPLE_RATE);

    // Two complete samples; the dangling byte is dropped
    assert_eq!(buffer.samples.len(), 2);
}

#[test]
fn test_decode_audio_reads_wav() {
    let original = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&original, SAMPLE_RATE).unwrap();

    let buffer = decode_audio(&wav_data).unwrap();

    assert_eq!(buffer.sample_rate, SAMPLE_RATE);
    assert_eq!(buffer.samples.len(), original.len());
    // Values survive within i16 quantization error
    for (decoded, expected) in buffer.samples.iter().zip(&original) {
        assert!((decoded - expected).abs() < 0.001);
    }
}

#[test]
fn test_decode_audio_downmixes_stereo_wav() {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut data = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut data, spec).unwrap();
        for (left, right) in [(16384i16, -16384i16), (8192, 24576)] {
            writer.write_sample(left).unwrap();
            writer.write_sample(right).unwrap();
        }
        writer.finalize().unwrap();
    }

    let buffer = decode_audio(data.get_ref()).unwrap();

    // Each stereo frame averages down to one mono sample
    assert_eq!(buffer.samples.len(), 2);
    assert!(buffer.samples[0].abs() < 0.001);
    assert!((buffer.samples[1] - 0.5).abs() < 0.001);
}

#[test]
fn test_decode_audio_rejects_garbage() {
    let result = decode_audio(b"definitely not an audio payload");
    assert!(matches!(result, Err(Error::DecodeFailed(_))));
}
