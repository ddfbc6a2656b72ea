// Integration tests for the session controller, run entirely against
// synthetic capture and connector implementations: no microphone, no
// network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use livescribe::{
    CaptureError, CaptureSource, ChannelConfig, ChannelError, ChannelEvent, ChannelHandle,
    ChannelState, Credential, Outbound, SessionController, SessionError, TranscriptSegment,
    TranscriptionConnector,
};
use tokio::sync::mpsc;

/// Test-side view of a `ScriptedCapture`: acquisition counters, the live
/// flag, and the sender for pushing frames into a running session.
#[derive(Clone)]
struct CaptureRemote {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    capturing: Arc<AtomicBool>,
    frames_tx: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
}

impl CaptureRemote {
    fn frames_sender(&self) -> mpsc::Sender<Vec<f32>> {
        self.frames_tx
            .lock()
            .unwrap()
            .clone()
            .expect("capture started")
    }
}

/// Capture source driven by the test. Mirrors the real microphone source's
/// contract: a second acquisition while the device is held fails, and
/// `stop` is idempotent.
struct ScriptedCapture {
    fail_with: Option<CaptureError>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    capturing: Arc<AtomicBool>,
    frames_tx: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
}

impl ScriptedCapture {
    fn new() -> (Self, CaptureRemote) {
        let remote = CaptureRemote {
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            capturing: Arc::new(AtomicBool::new(false)),
            frames_tx: Arc::new(Mutex::new(None)),
        };
        let capture = Self {
            fail_with: None,
            starts: Arc::clone(&remote.starts),
            stops: Arc::clone(&remote.stops),
            capturing: Arc::clone(&remote.capturing),
            frames_tx: Arc::clone(&remote.frames_tx),
        };
        (capture, remote)
    }

    fn failing(error: CaptureError) -> (Self, CaptureRemote) {
        let (mut capture, remote) = Self::new();
        capture.fail_with = Some(error);
        (capture, remote)
    }
}

#[async_trait]
impl CaptureSource for ScriptedCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_with.clone() {
            return Err(error);
        }
        if self.capturing.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable(
                "capture already running".to_string(),
            ));
        }
        let (tx, rx) = mpsc::channel(16);
        *self.frames_tx.lock().unwrap() = Some(tx);
        self.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.frames_tx.lock().unwrap() = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Connector that hands out an open channel backed by test-held endpoints:
/// the test injects events and observes outbound frames.
struct MockConnector {
    connects: Arc<AtomicUsize>,
    events_tx: Arc<Mutex<Option<mpsc::Sender<ChannelEvent>>>>,
    outbound_rx: Arc<Mutex<Option<mpsc::Receiver<Outbound>>>>,
}

/// Test-side view of a `MockConnector`.
#[derive(Clone)]
struct ConnectorRemote {
    connects: Arc<AtomicUsize>,
    events_tx: Arc<Mutex<Option<mpsc::Sender<ChannelEvent>>>>,
    outbound_rx: Arc<Mutex<Option<mpsc::Receiver<Outbound>>>>,
}

impl ConnectorRemote {
    fn events_sender(&self) -> mpsc::Sender<ChannelEvent> {
        self.events_tx
            .lock()
            .unwrap()
            .clone()
            .expect("channel connected")
    }

    fn take_outbound(&self) -> mpsc::Receiver<Outbound> {
        self.outbound_rx
            .lock()
            .unwrap()
            .take()
            .expect("channel connected")
    }
}

impl MockConnector {
    fn new() -> (Self, ConnectorRemote) {
        let remote = ConnectorRemote {
            connects: Arc::new(AtomicUsize::new(0)),
            events_tx: Arc::new(Mutex::new(None)),
            outbound_rx: Arc::new(Mutex::new(None)),
        };
        let connector = Self {
            connects: Arc::clone(&remote.connects),
            events_tx: Arc::clone(&remote.events_tx),
            outbound_rx: Arc::clone(&remote.outbound_rx),
        };
        (connector, remote)
    }
}

#[async_trait]
impl TranscriptionConnector for MockConnector {
    async fn connect(
        &self,
        _config: &ChannelConfig,
        _credential: &Credential,
    ) -> Result<(ChannelHandle, mpsc::Receiver<ChannelEvent>), ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let state = Arc::new(Mutex::new(ChannelState::Open));
        let (out_tx, out_rx) = mpsc::channel(64);
        let (ev_tx, ev_rx) = mpsc::channel(64);

        *self.events_tx.lock().unwrap() = Some(ev_tx);
        *self.outbound_rx.lock().unwrap() = Some(out_rx);

        Ok((ChannelHandle::from_parts(state, out_tx), ev_rx))
    }
}

fn credential() -> Option<Credential> {
    Some(Credential::new("test-key"))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_start_without_credential_never_connects() {
    let (capture, capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        None,
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    let result = controller.start().await;
    assert!(matches!(result, Err(SessionError::MissingCredential)));

    // Fails fast: no capture acquisition, no connection attempt.
    assert_eq!(capture_remote.starts.load(Ordering::SeqCst), 0);
    assert_eq!(connector_remote.connects.load(Ordering::SeqCst), 0);

    let state = controller.state();
    assert!(!state.is_recording);
    let error = state.error.expect("error message recorded");
    assert!(error.contains("credential"), "unexpected message: {error}");
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (capture, _capture_remote) = ScriptedCapture::new();
    let (connector, _connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    // Never started: stop must not error.
    controller.stop().await;
    controller.stop().await;

    assert!(!controller.state().is_recording);
    assert!(controller.state().error.is_none());
}

#[tokio::test]
async fn test_capture_failure_aborts_before_connecting() {
    let (capture, _capture_remote) = ScriptedCapture::failing(CaptureError::PermissionDenied(
        "user said no".to_string(),
    ));
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    let result = controller.start().await;
    assert!(matches!(result, Err(SessionError::PermissionDenied(_))));
    assert_eq!(connector_remote.connects.load(Ordering::SeqCst), 0);

    let state = controller.state();
    assert!(!state.is_recording);
    assert!(state
        .error
        .expect("error recorded")
        .contains("permission denied"));
}

#[tokio::test]
async fn test_interims_then_final_scenario() {
    let (capture, _capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");
    assert!(controller.state().is_recording);

    let tx = connector_remote.events_sender();
    for (text, confidence) in [("tes", 0.3f32), ("testing", 0.5), ("testing one", 0.7)] {
        tx.send(ChannelEvent::Segment(TranscriptSegment::new(
            text, confidence, false,
        )))
        .await
        .unwrap();
    }
    tx.send(ChannelEvent::Segment(TranscriptSegment::new(
        "testing one two",
        0.95,
        true,
    )))
    .await
    .unwrap();
    settle().await;

    assert_eq!(controller.final_text(), "testing one two");
    assert_eq!(controller.interim_text(), "");
    assert_eq!(controller.finalized_count(), 1);

    controller.stop().await;
    assert!(!controller.state().is_recording);
}

#[tokio::test]
async fn test_abnormal_close_surfaces_error_and_stops() {
    let (capture, capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");

    let tx = connector_remote.events_sender();
    tx.send(ChannelEvent::Closed {
        code: 1006,
        reason: "connection dropped".to_string(),
    })
    .await
    .unwrap();
    settle().await;

    let state = controller.state();
    assert!(!state.is_recording);
    let error = state.error.expect("abnormal close recorded");
    assert!(!error.is_empty());
    assert!(error.contains("1006"), "unexpected message: {error}");

    // The microphone is released along with the session.
    assert!(!capture_remote.capturing.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_normal_close_sets_no_error() {
    let (capture, _capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");

    let tx = connector_remote.events_sender();
    tx.send(ChannelEvent::Closed {
        code: 1000,
        reason: String::new(),
    })
    .await
    .unwrap();
    settle().await;

    let state = controller.state();
    assert!(!state.is_recording);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_channel_error_releases_capture_for_retry() {
    // A transport error is session-terminal with no automatic reconnect;
    // the capture source must be released so an explicit retry can
    // re-acquire the device.
    let (capture, capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");
    assert!(capture_remote.capturing.load(Ordering::SeqCst));

    let tx = connector_remote.events_sender();
    tx.send(ChannelEvent::Error("transport failed".to_string()))
        .await
        .unwrap();
    settle().await;

    assert!(!controller.state().is_recording);
    assert!(
        !capture_remote.capturing.load(Ordering::SeqCst),
        "capture source still held after terminal channel error"
    );
    assert!(capture_remote.stops.load(Ordering::SeqCst) >= 1);

    // The mock rejects start-while-capturing, so this only succeeds if the
    // device was actually released.
    controller.start().await.expect("retry re-acquires the device");
    assert!(controller.state().is_recording);
    assert!(capture_remote.capturing.load(Ordering::SeqCst));
    assert_eq!(connector_remote.connects.load(Ordering::SeqCst), 2);

    controller.stop().await;
}

#[tokio::test]
async fn test_audio_frames_are_encoded_and_sent() {
    let (capture, capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");

    let tx = capture_remote.frames_sender();
    tx.send(vec![0.0f32; 4096]).await.unwrap();
    settle().await;

    let mut rx = connector_remote.take_outbound();
    match rx.try_recv() {
        Ok(Outbound::Audio(frame)) => assert_eq!(frame.len(), 4096 * 2),
        other => panic!("expected encoded audio frame, got {other:?}"),
    }

    controller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_duration_ticks_and_resets_on_restart() {
    let (capture, _capture_remote) = ScriptedCapture::new();
    let (connector, _connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");
    // Let the ticker task register its timer before moving the clock.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(controller.state().duration_secs, 0);

    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
    }
    assert_eq!(controller.state().duration_secs, 5);

    controller.stop().await;
    assert_eq!(controller.state().duration_secs, 5);

    controller.start().await.expect("restart succeeds");
    assert_eq!(controller.state().duration_secs, 0);

    controller.stop().await;
}

#[tokio::test]
async fn test_restart_after_error_clears_it() {
    let (capture, _capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");
    let tx = connector_remote.events_sender();
    tx.send(ChannelEvent::Error("transport failed".to_string()))
        .await
        .unwrap();
    settle().await;

    assert!(controller.state().error.is_some());
    assert!(!controller.state().is_recording);

    // Explicit retry: a new attempt starts clean.
    controller.start().await.expect("retry succeeds");
    assert!(controller.state().error.is_none());
    assert!(controller.state().is_recording);
    assert_eq!(connector_remote.connects.load(Ordering::SeqCst), 2);

    controller.stop().await;
}

#[tokio::test]
async fn test_clear_empties_transcript_without_touching_state() {
    let (capture, _capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");
    let tx = connector_remote.events_sender();
    tx.send(ChannelEvent::Segment(TranscriptSegment::new(
        "hello", 0.9, true,
    )))
    .await
    .unwrap();
    settle().await;

    assert_eq!(controller.final_text(), "hello");

    controller.clear();
    assert_eq!(controller.final_text(), "");
    assert!(controller.state().is_recording);

    controller.stop().await;
}

#[tokio::test]
async fn test_export_with_only_interim_produces_no_artifact() {
    let (capture, _capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");
    let tx = connector_remote.events_sender();
    tx.send(ChannelEvent::Segment(TranscriptSegment::new(
        "still guessing",
        0.4,
        false,
    )))
    .await
    .unwrap();
    settle().await;

    let dir = tempfile::tempdir().unwrap();
    let exported = controller.export(dir.path()).unwrap();
    assert!(exported.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    controller.stop().await;
}

#[tokio::test]
async fn test_export_writes_finalized_text_only() {
    let (capture, _capture_remote) = ScriptedCapture::new();
    let (connector, connector_remote) = MockConnector::new();

    let mut controller = SessionController::new(
        credential(),
        ChannelConfig::default(),
        Box::new(capture),
        Box::new(connector),
    );

    controller.start().await.expect("start succeeds");
    let tx = connector_remote.events_sender();
    for text in ["hello", "world"] {
        tx.send(ChannelEvent::Segment(TranscriptSegment::new(
            text, 0.9, true,
        )))
        .await
        .unwrap();
    }
    tx.send(ChannelEvent::Segment(TranscriptSegment::new(
        "not yet final",
        0.3,
        false,
    )))
    .await
    .unwrap();
    settle().await;

    let dir = tempfile::tempdir().unwrap();
    let path = controller
        .export(dir.path())
        .unwrap()
        .expect("artifact written");

    let name = path.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("transcript-"), "bad filename: {name}");
    assert!(name.ends_with(".txt"), "bad filename: {name}");

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "hello world");

    controller.stop().await;
}
