use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::state::RecordingState;
use crate::audio::{encode_block, CaptureSource};
use crate::channel::{
    ChannelConfig, ChannelEvent, ChannelHandle, TranscriptionConnector, NORMAL_CLOSURE,
};
use crate::config::Credential;
use crate::transcript::{export_transcript, TranscriptAggregator, TranscriptSegment};

/// Coordinates one recording session at a time: capture source, PCM
/// encoding, the transcription channel, transcript aggregation, and the
/// duration tick.
///
/// The capture source and connector are trait objects so the whole session
/// can run against synthetic input in tests.
pub struct SessionController {
    credential: Option<Credential>,
    config: ChannelConfig,
    /// Shared with the event task so a session-terminal channel failure can
    /// release the microphone without waiting for an explicit `stop`
    capture: Arc<AsyncMutex<Box<dyn CaptureSource>>>,
    connector: Box<dyn TranscriptionConnector>,

    is_recording: Arc<AtomicBool>,
    duration_secs: Arc<AtomicU64>,
    error: Arc<Mutex<Option<String>>>,
    aggregator: Arc<Mutex<TranscriptAggregator>>,

    /// Optional best-effort tap receiving every applied segment
    segment_tap: Option<mpsc::Sender<TranscriptSegment>>,

    channel: Option<ChannelHandle>,
    pump_task: Option<JoinHandle<()>>,
    event_task: Option<JoinHandle<()>>,
    ticker_task: Option<JoinHandle<()>>,
}

impl SessionController {
    pub fn new(
        credential: Option<Credential>,
        config: ChannelConfig,
        capture: Box<dyn CaptureSource>,
        connector: Box<dyn TranscriptionConnector>,
    ) -> Self {
        Self {
            credential,
            config,
            capture: Arc::new(AsyncMutex::new(capture)),
            connector,
            is_recording: Arc::new(AtomicBool::new(false)),
            duration_secs: Arc::new(AtomicU64::new(0)),
            error: Arc::new(Mutex::new(None)),
            aggregator: Arc::new(Mutex::new(TranscriptAggregator::new())),
            segment_tap: None,
            channel: None,
            pump_task: None,
            event_task: None,
            ticker_task: None,
        }
    }

    /// Register a receiver for live segments, for display. Must be called
    /// before `start`; delivery is best-effort (a slow consumer loses
    /// segments, the aggregator does not).
    pub fn segment_stream(&mut self) -> mpsc::Receiver<TranscriptSegment> {
        let (tx, rx) = mpsc::channel(64);
        self.segment_tap = Some(tx);
        rx
    }

    /// Start recording.
    ///
    /// Fails fast with `MissingCredential` before any I/O when no credential
    /// is configured. Acquires the capture source, connects the channel, and
    /// on ready wires capture → encoder → channel and starts the 1 Hz
    /// duration tick. Any failure is recorded in session state and aborts
    /// without leaving resources behind.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.is_recording.load(Ordering::SeqCst) {
            warn!("Recording already started");
            return Ok(());
        }

        // A session that ended in a channel error leaves its tasks behind;
        // a retry must not inherit them.
        self.reap();

        // New attempt: previous error and duration do not carry over.
        *self.error.lock().unwrap() = None;
        self.duration_secs.store(0, Ordering::SeqCst);

        let credential = match &self.credential {
            Some(credential) => credential.clone(),
            None => return Err(self.fail(SessionError::MissingCredential)),
        };

        info!("Starting recording session");

        {
            // A prior session's teardown may have been cut short; the
            // source is idempotent to stop, so release it before
            // re-acquiring.
            let mut capture = self.capture.lock().await;
            let _ = capture.stop().await;
        }

        let mut frames = match self.capture.lock().await.start().await {
            Ok(rx) => rx,
            Err(e) => return Err(self.fail(e.into())),
        };

        let (handle, mut events) = match self.connector.connect(&self.config, &credential).await {
            Ok(pair) => pair,
            Err(e) => {
                // Capture is already live; release it before surfacing.
                let _ = self.capture.lock().await.stop().await;
                return Err(self.fail(e.into()));
            }
        };

        // Handshake complete: the session is live from here.
        self.is_recording.store(true, Ordering::SeqCst);

        // Duration tick at 1 Hz, reset on every start.
        let duration = Arc::clone(&self.duration_secs);
        let recording = Arc::clone(&self.is_recording);
        self.ticker_task = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately; duration stays 0 until a
            // full second has passed.
            tick.tick().await;
            loop {
                tick.tick().await;
                if !recording.load(Ordering::SeqCst) {
                    break;
                }
                duration.fetch_add(1, Ordering::SeqCst);
            }
        }));

        // Pump: capture blocks → PCM16 → channel. Frames arriving while the
        // channel is not open are dropped inside `send`.
        let channel = handle.clone();
        self.pump_task = Some(tokio::spawn(async move {
            while let Some(block) = frames.recv().await {
                channel.send(encode_block(&block));
            }
            debug!("Capture stream ended");
        }));

        // Events: segments into the aggregator, failures into session state.
        let aggregator = Arc::clone(&self.aggregator);
        let error_slot = Arc::clone(&self.error);
        let recording = Arc::clone(&self.is_recording);
        let capture = Arc::clone(&self.capture);
        let tap = self.segment_tap.clone();
        self.event_task = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ChannelEvent::Segment(segment) => {
                        aggregator.lock().unwrap().apply(segment.clone());
                        if let Some(tap) = &tap {
                            let _ = tap.try_send(segment);
                        }
                    }
                    ChannelEvent::Error(message) => {
                        warn!("Transcription channel error: {}", message);
                        *error_slot.lock().unwrap() =
                            Some(SessionError::Connection(message).to_string());
                        recording.store(false, Ordering::SeqCst);
                        break;
                    }
                    ChannelEvent::Closed { code, reason } => {
                        if code != NORMAL_CLOSURE && recording.load(Ordering::SeqCst) {
                            let error = SessionError::AbnormalClose { code, reason };
                            warn!("{}", error);
                            *error_slot.lock().unwrap() = Some(error.to_string());
                        }
                        recording.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }

            // The channel is gone, whether by error, abnormal close, or a
            // server-side goodbye. The microphone must not stay hot until
            // the user retries.
            if let Err(e) = capture.lock().await.stop().await {
                warn!("Failed to release capture source: {:#}", e);
            }

            debug!("Channel event stream ended");
        }));

        self.channel = Some(handle);

        info!("Recording session started");

        Ok(())
    }

    /// Stop recording.
    ///
    /// Teardown order: audio pump, capture source, channel (normal close),
    /// timers. Every step is best-effort and independently no-ops when its
    /// resource is already released, so `stop` is idempotent and safe to
    /// call at any point, including while a channel error is in flight.
    pub async fn stop(&mut self) {
        self.is_recording.store(false, Ordering::SeqCst);

        if let Some(task) = self.pump_task.take() {
            task.abort();
        }

        if let Err(e) = self.capture.lock().await.stop().await {
            warn!("Failed to release capture source: {:#}", e);
        }

        if let Some(channel) = self.channel.take() {
            channel.close();
        }

        if let Some(task) = self.ticker_task.take() {
            task.abort();
        }

        if let Some(task) = self.event_task.take() {
            task.abort();
        }

        info!("Recording session stopped");
    }

    /// Empty the transcript. Does not affect recording state.
    pub fn clear(&self) {
        self.aggregator.lock().unwrap().clear();
    }

    /// Export the finalized transcript to `<dir>/transcript-YYYY-MM-DD.txt`.
    /// Returns `Ok(None)` when there is nothing finalized to export; interim
    /// text is never exported.
    pub fn export(&self, dir: &Path) -> Result<Option<PathBuf>> {
        export_transcript(&self.final_text(), dir)
    }

    /// Current session status snapshot.
    pub fn state(&self) -> RecordingState {
        RecordingState {
            is_recording: self.is_recording.load(Ordering::SeqCst),
            is_paused: false,
            duration_secs: self.duration_secs.load(Ordering::SeqCst),
            error: self.error.lock().unwrap().clone(),
        }
    }

    /// All finalized text, single spaces between segments.
    pub fn final_text(&self) -> String {
        self.aggregator.lock().unwrap().final_text()
    }

    /// The current interim guess, empty when none.
    pub fn interim_text(&self) -> String {
        self.aggregator.lock().unwrap().interim_text()
    }

    /// Displayable transcript snapshot: finalized segments plus any trailing
    /// interim one.
    pub fn segments(&self) -> Vec<TranscriptSegment> {
        self.aggregator.lock().unwrap().segments()
    }

    /// Number of finalized segments so far.
    pub fn finalized_count(&self) -> usize {
        self.aggregator.lock().unwrap().finalized_count()
    }

    /// Abort any tasks left over from a previous session and drop its
    /// channel. Safe when there is nothing to clean up.
    fn reap(&mut self) {
        for task in [
            self.pump_task.take(),
            self.ticker_task.take(),
            self.event_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }

        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    /// Record a start failure in session state and hand it back.
    fn fail(&self, error: SessionError) -> SessionError {
        *self.error.lock().unwrap() = Some(error.to_string());
        self.is_recording.store(false, Ordering::SeqCst);
        error
    }
}
