use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::pcm::{BlockAssembler, BLOCK_SAMPLES};

/// Fixed capture constraints for the recognition pipeline.
///
/// The processing flags (echo cancellation, noise suppression, automatic
/// gain control) are carried as part of the capture contract for sources
/// that can honor them; cpal exposes no such controls, so the microphone
/// source records them without acting on them.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Samples per emitted block
    pub block_samples: usize,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // what the recognition endpoint expects
            channels: 1,        // mono
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            block_samples: BLOCK_SAMPLES,
        }
    }
}

/// Capture acquisition failures, distinguished so the session can tell the
/// user whether to fix permissions or plug in a microphone.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No usable audio input device: {0}")]
    DeviceUnavailable(String),
}

/// Audio capture source trait
///
/// Implementations:
/// - `MicrophoneSource`: cpal microphone input (all platforms)
/// - test sources feeding synthetic sample blocks
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Start capturing audio.
    ///
    /// Returns a channel receiver yielding fixed-size blocks of f32 samples
    /// in [-1, 1], mono at the constraint sample rate.
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, CaptureError>;

    /// Stop capturing and release the device. Idempotent: safe to call on a
    /// never-started or already-stopped source.
    async fn stop(&mut self) -> Result<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Microphone capture via cpal.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread for the
/// whole capture; the thread polls a shared stop flag and drops the stream
/// (releasing the device) when it clears.
pub struct MicrophoneSource {
    constraints: CaptureConstraints,
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    pub fn new(constraints: CaptureConstraints) -> Self {
        Self {
            constraints,
            device_name: None,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Capture from a specific input device instead of the default one.
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }
}

#[async_trait]
impl CaptureSource for MicrophoneSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, CaptureError> {
        if self.is_capturing() {
            warn!("Capture already running");
            return Err(CaptureError::DeviceUnavailable(
                "capture already running".to_string(),
            ));
        }

        let (block_tx, block_rx) = mpsc::channel::<Vec<f32>>(32);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), CaptureError>>();

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let constraints = self.constraints.clone();
        let device_name = self.device_name.clone();

        let handle = std::thread::spawn(move || {
            run_capture_thread(constraints, device_name, running, block_tx, ready_tx);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.thread = Some(handle);
                info!("Microphone capture started");
                Ok(block_rx)
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Thread died before reporting; treat as a missing device.
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(CaptureError::DeviceUnavailable(
                    "capture thread exited during setup".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread.take() {
            // The thread notices the flag within one poll interval.
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
            info!("Microphone capture stopped");
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Owns the cpal stream for the lifetime of one capture.
fn run_capture_thread(
    constraints: CaptureConstraints,
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    block_tx: mpsc::Sender<Vec<f32>>,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
) {
    let host = cpal::default_host();

    let device = match find_input_device(&host, device_name.as_deref()) {
        Ok(device) => device,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(config) => config,
        Err(e) => {
            let _ = ready_tx.send(Err(classify_device_error(&e.to_string())));
            return;
        }
    };

    let source_rate = supported.sample_rate().0;
    let source_channels = supported.channels();
    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();

    debug!(
        "Input device config: {} Hz, {} ch, {:?}",
        source_rate, source_channels, sample_format
    );

    if let Err(e) = validate_source_rate(source_rate, constraints.sample_rate) {
        let _ = ready_tx.send(Err(e));
        return;
    }

    // Shared with the stream callback so the trailing partial block can be
    // drained after capture stops.
    let normalizer = Arc::new(Mutex::new(FrameNormalizer::new(
        source_rate,
        source_channels,
        constraints.sample_rate,
        constraints.block_samples,
    )));

    let callback_normalizer = Arc::clone(&normalizer);
    let tx = block_tx.clone();
    let on_error = |e: cpal::StreamError| {
        warn!("Input stream error: {}", e);
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| callback_normalizer.lock().unwrap().consume(data, &tx),
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| {
                let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                callback_normalizer.lock().unwrap().consume(&floats, &tx);
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _| {
                let floats: Vec<f32> = data
                    .iter()
                    .map(|&s| (s as f32 - 32768.0) / 32768.0)
                    .collect();
                callback_normalizer.lock().unwrap().consume(&floats, &tx);
            },
            on_error,
            None,
        ),
        other => {
            let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(format!(
                "unsupported sample format: {other:?}"
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(classify_device_error(&e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(classify_device_error(&e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    // Dropping the stream stops the hardware tracks.
    drop(stream);

    // Hand the trailing partial block to the consumer, if one is still
    // listening.
    if let Ok(mut normalizer) = normalizer.lock() {
        normalizer.drain(&block_tx);
    };
}

/// A device below the target rate cannot be decimated up; streaming it as
/// if it were at the target rate would time-stretch the audio, so such
/// devices are refused.
fn validate_source_rate(source_rate: u32, target_rate: u32) -> Result<(), CaptureError> {
    if source_rate < target_rate {
        return Err(CaptureError::DeviceUnavailable(format!(
            "input device rate {source_rate} Hz is below the required {target_rate} Hz"
        )));
    }
    Ok(())
}

fn find_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    if let Some(wanted) = name {
        let devices = host
            .input_devices()
            .map_err(|e| classify_device_error(&e.to_string()))?;
        for device in devices {
            if device.name().map(|n| n == wanted).unwrap_or(false) {
                return Ok(device);
            }
        }
        return Err(CaptureError::DeviceUnavailable(format!(
            "input device '{wanted}' not found"
        )));
    }

    host.default_input_device().ok_or_else(|| {
        CaptureError::DeviceUnavailable("no default input device".to_string())
    })
}

/// cpal surfaces permission problems as backend-specific strings, so the
/// best we can do is sniff the message.
fn classify_device_error(message: &str) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        CaptureError::PermissionDenied(message.to_string())
    } else {
        CaptureError::DeviceUnavailable(message.to_string())
    }
}

/// Folds interleaved device frames down to mono at the target rate and
/// re-blocks them for the encoder.
struct FrameNormalizer {
    source_channels: usize,
    decimation: usize,
    assembler: BlockAssembler,
    /// Position within the decimation cycle, carried across callbacks
    phase: usize,
}

impl FrameNormalizer {
    fn new(source_rate: u32, source_channels: u16, target_rate: u32, block_samples: usize) -> Self {
        // Integer decimation, same technique as elsewhere in the pipeline:
        // a 48 kHz device becomes 16 kHz by keeping every 3rd frame. Rates
        // that do not divide evenly land close enough for speech.
        let decimation = if source_rate > target_rate {
            (source_rate / target_rate).max(1) as usize
        } else {
            1
        };

        Self {
            source_channels: source_channels.max(1) as usize,
            decimation,
            assembler: BlockAssembler::new(block_samples),
            phase: 0,
        }
    }

    fn consume(&mut self, interleaved: &[f32], tx: &mpsc::Sender<Vec<f32>>) {
        let mut mono = Vec::with_capacity(interleaved.len() / self.source_channels + 1);

        for frame in interleaved.chunks_exact(self.source_channels) {
            if self.phase == 0 {
                let sum: f32 = frame.iter().sum();
                mono.push(sum / self.source_channels as f32);
            }
            self.phase = (self.phase + 1) % self.decimation;
        }

        for block in self.assembler.push(&mono) {
            // The pipeline has no backpressure: drop blocks when the
            // consumer lags.
            if tx.try_send(block).is_err() {
                debug!("Dropping capture block, consumer not keeping up");
            }
        }
    }

    /// Forward the trailing partial block once capture has stopped, so the
    /// last fraction of a second of speech is not discarded.
    fn drain(&mut self, tx: &mpsc::Sender<Vec<f32>>) {
        if let Some(tail) = self.assembler.flush() {
            if tx.try_send(tail).is_err() {
                debug!("Dropping capture tail, consumer gone");
            }
        }
    }
}
