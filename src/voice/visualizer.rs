//! Input level visualization
//!
//! Renders frequency magnitudes of the live microphone input while a
//! recording session is active. The render loop is an explicit task that
//! rechecks a liveness flag on every frame, so stopping the session ends
//! the loop even when a frame was already scheduled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::Result;
use crate::voice::AudioCapture;

/// Analysis FFT size; yields half as many displayable bins
const FFT_SIZE: usize = 64;

/// Number of magnitude bins handed to the sink per frame
pub const BIN_COUNT: usize = FFT_SIZE / 2;

/// Render cadence, roughly display refresh rate
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Receives rendered magnitude bins
pub trait SpectrumSink: Send {
    /// Draw one frame of [`BIN_COUNT`] magnitudes, each in `[0.0, 1.0]`
    fn draw(&mut self, bins: &[f32]);
}

/// Live microphone visualizer
pub struct Visualizer {
    capture: AudioCapture,
    sink: Arc<Mutex<Box<dyn SpectrumSink>>>,
    live: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Visualizer {
    /// Create a visualizer drawing into the given sink
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device is present
    pub fn new(sink: Box<dyn SpectrumSink>) -> Result<Self> {
        Ok(Self {
            capture: AudioCapture::new()?,
            sink: Arc::new(Mutex::new(sink)),
            live: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }

    /// Start capturing and rendering
    ///
    /// Tears down any leaked prior session first, so start is safe to call
    /// in any state.
    ///
    /// # Errors
    ///
    /// Returns error if the microphone stream cannot be opened; the
    /// visualizer is back in the idle state when that happens
    pub fn start(&mut self) -> Result<()> {
        self.stop();

        self.capture.start()?;
        self.live.store(true, Ordering::Release);

        let live = Arc::clone(&self.live);
        let buffer = self.capture.buffer_handle();
        let sink = Arc::clone(&self.sink);
        self.task = Some(tokio::spawn(render_loop(live, buffer, sink)));

        tracing::debug!("visualizer started");
        Ok(())
    }

    /// Stop capturing and rendering
    ///
    /// Clears the liveness flag before anything else, so a frame that raced
    /// the cancellation exits without drawing, then releases the microphone
    /// and drops the buffered window.
    pub fn stop(&mut self) {
        self.live.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.capture.stop();
        self.capture.clear_buffer();
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain fresh samples each frame, keep the newest analysis window, and
/// draw its magnitudes until the liveness flag clears
async fn render_loop(
    live: Arc<AtomicBool>,
    buffer: Arc<Mutex<Vec<f32>>>,
    sink: Arc<Mutex<Box<dyn SpectrumSink>>>,
) {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);
    let mut window: Vec<f32> = Vec::with_capacity(FFT_SIZE);
    let mut interval = tokio::time::interval(FRAME_INTERVAL);

    loop {
        interval.tick().await;
        if !live.load(Ordering::Acquire) {
            break;
        }

        let fresh = buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();
        window.extend(fresh);
        if window.len() > FFT_SIZE {
            window.drain(..window.len() - FFT_SIZE);
        }

        let bins = compute_bins(&window, fft.as_ref());
        if let Ok(mut sink) = sink.lock() {
            sink.draw(&bins);
        }
    }
}

/// Magnitude bins of the newest [`FFT_SIZE`] samples, zero-padded when
/// fewer are available
fn compute_bins(window: &[f32], fft: &dyn Fft<f32>) -> [f32; BIN_COUNT] {
    let start = window.len().saturating_sub(FFT_SIZE);
    let mut buf: Vec<Complex<f32>> = window[start..]
        .iter()
        .map(|&s| Complex { re: s, im: 0.0 })
        .collect();
    buf.resize(FFT_SIZE, Complex { re: 0.0, im: 0.0 });

    fft.process(&mut buf);

    #[allow(clippy::cast_precision_loss)]
    let scale = FFT_SIZE as f32;
    let mut bins = [0.0f32; BIN_COUNT];
    for (bin, value) in bins.iter_mut().zip(buf.iter().take(BIN_COUNT)) {
        *bin = (value.norm() / scale).min(1.0);
    }
    bins
}
